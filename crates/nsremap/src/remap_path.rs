//! Remap path resolution
//!
//! A remap path is the ordered list of namespaces an archive has to be
//! rewritten into to get from a source namespace to a destination namespace.
//! Edges of the namespace graph are walked in both directions: a hop may go
//! from a namespace to one of its dependencies or to one of its dependents.

use std::{collections::VecDeque, sync::Arc};

use log::{debug, trace};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    error::RemapError,
    namespace::{NamespaceGraph, NamespaceId},
};

/// A request to move symbols from `src` to `dst`.
///
/// The fallbacks are the nearest namespaces with complete coverage; they may
/// equal their primary namespace. A fallback that differs from its primary
/// must be adjacent to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemapRequest {
    pub src: NamespaceId,
    pub src_fallback: NamespaceId,
    pub dst_fallback: NamespaceId,
    pub dst: NamespaceId,
}

impl RemapRequest {
    pub fn new(
        src: NamespaceId,
        src_fallback: NamespaceId,
        dst_fallback: NamespaceId,
        dst: NamespaceId,
    ) -> Self {
        Self {
            src,
            src_fallback,
            dst_fallback,
            dst,
        }
    }

    /// A request without fallbacks
    pub fn direct(src: NamespaceId, dst: NamespaceId) -> Self {
        Self::new(src, src, dst, dst)
    }

    /// Resolve a request from namespace names
    pub fn from_names(
        graph: &NamespaceGraph,
        src: &str,
        src_fallback: &str,
        dst_fallback: &str,
        dst: &str,
    ) -> Result<Self, RemapError> {
        Ok(Self::new(
            graph.require(src)?,
            graph.require(src_fallback)?,
            graph.require(dst_fallback)?,
            graph.require(dst)?,
        ))
    }
}

impl NamespaceGraph {
    /// Compute the namespaces to hop through for `request`.
    ///
    /// The result excludes `src` and ends with `dst`; it is empty when no
    /// remapping is needed. Breadth-first search runs from the source
    /// fallback to the destination fallback over [`NamespaceGraph::neighbors`],
    /// so among equally short paths the one through earlier-registered
    /// namespaces wins.
    pub fn remap_path(&self, request: &RemapRequest) -> Result<Vec<NamespaceId>, RemapError> {
        let RemapRequest {
            src,
            src_fallback,
            dst_fallback,
            dst,
        } = *request;

        if let Some(foreign) = [src, src_fallback, dst_fallback, dst]
            .into_iter()
            .find(|&id| self.get(id).is_none())
        {
            return Err(RemapError::UnknownNamespace {
                name: format!("#{}", foreign.as_u32()),
            });
        }
        if dst != dst_fallback && !self.is_adjacent(dst_fallback, dst) {
            return Err(self.no_path(
                request,
                format!(
                    "destination fallback `{}` is not adjacent to `{}`",
                    self.name(dst_fallback),
                    self.name(dst)
                ),
            ));
        }
        if src != src_fallback && !self.is_adjacent(src, src_fallback) {
            return Err(self.no_path(
                request,
                format!(
                    "source fallback `{}` is not adjacent to `{}`",
                    self.name(src_fallback),
                    self.name(src)
                ),
            ));
        }

        let Some(mut path) = self.shortest_path(src_fallback, dst_fallback) else {
            return Err(self.no_path(request, "no namespace chain connects them".to_owned()));
        };
        if dst != dst_fallback {
            path.push(dst);
        }
        if src != src_fallback {
            path.insert(0, src);
        }
        trace!("Raw remap path: {}", self.render(&path));

        let len = path.len();
        let trimmed = if len > 2 && path[0] == path[2] {
            // bounced through a fallback and straight back
            path[3..].to_vec()
        } else if len > 2 && path[len - 1] == path[len - 3] {
            // doubled back onto the destination at the end
            path[1..len - 2].to_vec()
        } else {
            path[1..].to_vec()
        };
        debug!(
            "Remap path {} -> {}: [{}]",
            self.name(src),
            self.name(dst),
            self.render(&trimmed)
        );
        Ok(trimmed)
    }

    /// Breadth-first search including both endpoints
    fn shortest_path(&self, from: NamespaceId, to: NamespaceId) -> Option<Vec<NamespaceId>> {
        let mut queue: VecDeque<Vec<NamespaceId>> = VecDeque::from([vec![from]]);
        let mut visited: FxHashSet<NamespaceId> = FxHashSet::from_iter([from]);

        while let Some(path) = queue.pop_front() {
            let last = *path.last()?;
            if last == to {
                return Some(path);
            }
            for &next in self.neighbors(last) {
                if visited.insert(next) {
                    let mut extended = path.clone();
                    extended.push(next);
                    queue.push_back(extended);
                }
            }
        }
        None
    }

    fn render(&self, path: &[NamespaceId]) -> String {
        path.iter()
            .map(|&id| self.name(id))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn no_path(&self, request: &RemapRequest, reason: String) -> RemapError {
        RemapError::NoPath {
            src: self.name(request.src).to_owned(),
            dst: self.name(request.dst).to_owned(),
            reason,
            adjacency: self.adjacency_listing(),
        }
    }
}

/// Memoized remap paths, one per distinct request.
///
/// Entries stay valid for as long as the graph they were computed from; call
/// [`RemapPathCache::invalidate`] when the graph is replaced.
#[derive(Debug, Default)]
pub struct RemapPathCache {
    paths: RwLock<FxHashMap<RemapRequest, Arc<[NamespaceId]>>>,
}

impl RemapPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(
        &self,
        graph: &NamespaceGraph,
        request: &RemapRequest,
    ) -> Result<Arc<[NamespaceId]>, RemapError> {
        if let Some(path) = self.paths.read().get(request) {
            return Ok(Arc::clone(path));
        }
        let path: Arc<[NamespaceId]> = graph.remap_path(request)?.into();
        self.paths.write().insert(*request, Arc::clone(&path));
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.paths.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.read().is_empty()
    }

    pub fn invalidate(&self) {
        self.paths.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `name[*][:dep,dep]`, where `*` marks a named namespace
    fn graph(declarations: &[&str]) -> NamespaceGraph {
        let mut builder = NamespaceGraph::builder();
        for declaration in declarations {
            let (head, deps) = declaration.split_once(':').unwrap_or((*declaration, ""));
            let (name, named) = match head.strip_suffix('*') {
                Some(name) => (name, true),
                None => (head, false),
            };
            let deps: Vec<&str> = deps.split(',').filter(|dep| !dep.is_empty()).collect();
            builder.add(name, named, &deps);
        }
        builder.build().expect("valid graph")
    }

    fn path(graph: &NamespaceGraph, src: &str, src_fb: &str, dst_fb: &str, dst: &str) -> Vec<String> {
        let request = RemapRequest::from_names(graph, src, src_fb, dst_fb, dst).unwrap();
        graph
            .remap_path(&request)
            .unwrap()
            .into_iter()
            .map(|id| graph.name(id).to_owned())
            .collect()
    }

    #[test]
    fn test_identity_request_is_empty() {
        let graph = graph(&[
            "official",
            "intermediary:official",
            "named*:intermediary",
        ]);
        for namespace in ["official", "intermediary", "named"] {
            assert!(path(&graph, namespace, namespace, namespace, namespace).is_empty());
        }
    }

    #[test]
    fn test_foreign_ids_are_rejected() {
        let graph = graph(&["official", "intermediary:official"]);
        let foreign = RemapRequest::direct(graph.root(), NamespaceId::new(7));
        match graph.remap_path(&foreign) {
            Err(RemapError::UnknownNamespace { name }) => assert_eq!(name, "#7"),
            other => panic!("expected an unknown namespace, got {other:?}"),
        }
    }

    #[test]
    fn test_direct_dependency_is_single_hop() {
        let graph = graph(&[
            "official",
            "intermediary:official",
            "named*:intermediary",
        ]);
        assert_eq!(
            path(&graph, "intermediary", "intermediary", "named", "named"),
            vec!["named"]
        );
        assert_eq!(
            path(&graph, "named", "named", "intermediary", "intermediary"),
            vec!["intermediary"]
        );
    }

    #[test]
    fn test_searge_to_mojmap_through_fallbacks() {
        let graph = graph(&[
            "official",
            "searge:official",
            "mojmap*:official,searge",
        ]);
        assert_eq!(
            path(&graph, "searge", "official", "searge", "mojmap"),
            vec!["mojmap"]
        );
    }

    #[test]
    fn test_searge_to_yarn_crosses_root() {
        let graph = graph(&[
            "official",
            "searge:official",
            "intermediary:official",
            "yarn*:intermediary",
        ]);
        assert_eq!(
            path(&graph, "searge", "official", "intermediary", "yarn"),
            vec!["official", "intermediary", "yarn"]
        );
    }

    #[test]
    fn test_siblings_route_through_common_ancestor() {
        let graph = graph(&[
            "official",
            "z:official",
            "x:official",
            "y*:z",
        ]);
        assert_eq!(
            path(&graph, "x", "official", "z", "y"),
            vec!["official", "z", "y"]
        );
    }

    #[test]
    fn test_siblings_route_through_shared_dependency_directly() {
        let graph = graph(&[
            "official",
            "z:official",
            "x:official,z",
            "y*:z",
        ]);
        assert_eq!(path(&graph, "x", "z", "z", "y"), vec!["z", "y"]);
    }

    #[test]
    fn test_bounce_back_is_trimmed() {
        let graph = graph(&[
            "official",
            "searge:official",
            "mojmap*:official,searge",
        ]);
        assert!(path(&graph, "searge", "official", "official", "searge").is_empty());
    }

    #[test]
    fn test_disconnected_namespace_has_no_path() {
        let graph = graph(&[
            "official",
            "named*:official",
            "island",
        ]);
        let request =
            RemapRequest::from_names(&graph, "named", "official", "island", "island").unwrap();
        let err = graph.remap_path(&request).unwrap_err();
        match &err {
            RemapError::NoPath {
                src,
                dst,
                adjacency,
                ..
            } => {
                assert_eq!(src, "named");
                assert_eq!(dst, "island");
                assert!(adjacency.contains("island -> (none)"));
            }
            other => panic!("expected NoPath, got {other:?}"),
        }
        assert!(err.to_string().contains("official -> named"));
    }

    #[test]
    fn test_non_adjacent_fallback_is_rejected() {
        let graph = graph(&[
            "official",
            "intermediary:official",
            "named*:intermediary",
        ]);
        let request =
            RemapRequest::from_names(&graph, "official", "official", "official", "named").unwrap();
        assert!(matches!(
            graph.remap_path(&request),
            Err(RemapError::NoPath { .. })
        ));
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        let ab = graph(&[
            "official",
            "a:official",
            "b:official",
            "target*:a,b",
        ]);
        assert_eq!(
            path(&ab, "official", "official", "target", "target"),
            vec!["a", "target"]
        );

        let ba = graph(&[
            "official",
            "b:official",
            "a:official",
            "target*:a,b",
        ]);
        assert_eq!(
            path(&ba, "official", "official", "target", "target"),
            vec!["b", "target"]
        );
    }

    #[test]
    fn test_cache_memoizes_and_invalidates() {
        let graph = graph(&[
            "official",
            "named*:official",
        ]);
        let cache = RemapPathCache::new();
        let request = RemapRequest::direct(graph.root(), graph.require("named").unwrap());

        let first = cache.get_or_compute(&graph, &request).unwrap();
        let second = cache.get_or_compute(&graph, &request).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache.invalidate();
        assert!(cache.is_empty());
    }
}
