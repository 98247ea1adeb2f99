//! Namespace graph
//!
//! A namespace is a naming coordinate system (obfuscated baseline,
//! intermediate, human-curated). Each namespace declares the namespaces its
//! names are derived from; together they form a directed acyclic graph with
//! edges pointing from a namespace to each of its dependencies.
//!
//! Registration order is significant: it breaks ties wherever the graph has
//! to choose between equally good neighbours, so the builder keeps
//! declarations in insertion order and ids are assigned sequentially.

use std::fmt::Write as _;

use cow_utils::CowUtils;
use log::{debug, warn};
use petgraph::{
    Direction,
    algo::toposort,
    graph::{DiGraph, NodeIndex},
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::RemapError;

/// Unique identifier for a namespace, equal to its registration index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(u32);

impl NamespaceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying registration index
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A registered namespace. Immutable once the graph is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    id: NamespaceId,
    name: String,
    named: bool,
    dependencies: Vec<NamespaceId>,
}

impl Namespace {
    pub fn id(&self) -> NamespaceId {
        self.id
    }

    /// Lowercased namespace name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the namespace assigns stable, human-meaningful names
    pub fn is_named(&self) -> bool {
        self.named
    }

    /// Namespaces this one is derived from, in declaration order
    pub fn dependencies(&self) -> &[NamespaceId] {
        &self.dependencies
    }

    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Declaration {
    name: String,
    named: bool,
    dependencies: Vec<String>,
}

/// Collects namespace declarations and validates them into a [`NamespaceGraph`].
///
/// Dependencies may name namespaces declared later; they are only resolved
/// by [`NamespaceGraphBuilder::build`].
#[derive(Debug, Default)]
pub struct NamespaceGraphBuilder {
    declarations: Vec<Declaration>,
}

impl NamespaceGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a namespace
    pub fn add(&mut self, name: &str, named: bool, dependencies: &[&str]) -> &mut Self {
        self.declarations.push(Declaration {
            name: normalize(name),
            named,
            dependencies: dependencies.iter().map(|dep| normalize(dep)).collect(),
        });
        self
    }

    pub fn build(&self) -> Result<NamespaceGraph, RemapError> {
        let mut index: FxHashMap<String, NamespaceId> = FxHashMap::default();
        for (position, declaration) in self.declarations.iter().enumerate() {
            let id = NamespaceId::new(position as u32);
            if index.insert(declaration.name.clone(), id).is_some() {
                return Err(RemapError::DuplicateNamespace {
                    name: declaration.name.clone(),
                });
            }
        }

        let mut graph: DiGraph<NamespaceId, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.declarations.len())
            .map(|position| graph.add_node(NamespaceId::new(position as u32)))
            .collect();

        let mut namespaces = Vec::with_capacity(self.declarations.len());
        for (position, declaration) in self.declarations.iter().enumerate() {
            let id = NamespaceId::new(position as u32);
            let mut dependencies: Vec<NamespaceId> = Vec::new();
            for dependency in &declaration.dependencies {
                let Some(&dep_id) = index.get(dependency) else {
                    return Err(RemapError::UnknownDependency {
                        namespace: declaration.name.clone(),
                        dependency: dependency.clone(),
                    });
                };
                if !dependencies.contains(&dep_id) {
                    dependencies.push(dep_id);
                    graph.add_edge(nodes[id.index()], nodes[dep_id.index()], ());
                }
            }
            namespaces.push(Namespace {
                id,
                name: declaration.name.clone(),
                named: declaration.named,
                dependencies,
            });
        }

        if let Err(cycle) = toposort(&graph, None) {
            let id = graph[cycle.node_id()];
            return Err(RemapError::CyclicDependency {
                namespace: namespaces[id.index()].name.clone(),
            });
        }

        let root = namespaces
            .iter()
            .find(|namespace| namespace.is_root())
            .map(Namespace::id)
            .ok_or(RemapError::MissingRoot)?;

        let neighbors = nodes
            .iter()
            .map(|&node| {
                let mut adjacent: Vec<NamespaceId> = graph
                    .neighbors_directed(node, Direction::Outgoing)
                    .chain(graph.neighbors_directed(node, Direction::Incoming))
                    .map(|neighbor| graph[neighbor])
                    .collect();
                adjacent.sort_unstable();
                adjacent.dedup();
                adjacent
            })
            .collect();

        let namespace_graph = NamespaceGraph {
            namespaces,
            index,
            graph,
            neighbors,
            root,
        };
        namespace_graph.warn_disconnected();
        debug!(
            "Built namespace graph with {} namespaces, root `{}`",
            namespace_graph.len(),
            namespace_graph.namespace(root).name()
        );
        Ok(namespace_graph)
    }
}

/// Validated, immutable namespace graph
#[derive(Debug, Clone)]
pub struct NamespaceGraph {
    namespaces: Vec<Namespace>,
    index: FxHashMap<String, NamespaceId>,
    /// Edges point from a namespace to each of its dependencies
    graph: DiGraph<NamespaceId, ()>,
    /// Dependencies and dependents of each namespace, in registration order
    neighbors: Vec<Vec<NamespaceId>>,
    root: NamespaceId,
}

impl NamespaceGraph {
    pub fn builder() -> NamespaceGraphBuilder {
        NamespaceGraphBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Look up a namespace id by (case-insensitive) name
    pub fn id(&self, name: &str) -> Option<NamespaceId> {
        self.index.get(name.cow_to_lowercase().as_ref()).copied()
    }

    /// Like [`NamespaceGraph::id`] but fails with [`RemapError::UnknownNamespace`]
    pub fn require(&self, name: &str) -> Result<NamespaceId, RemapError> {
        self.id(name).ok_or_else(|| RemapError::UnknownNamespace {
            name: name.to_owned(),
        })
    }

    /// The namespace behind `id`, or `None` for an id this graph never issued
    pub fn get(&self, id: NamespaceId) -> Option<&Namespace> {
        self.namespaces.get(id.index())
    }

    /// Like [`NamespaceGraph::get`] for ids obtained from this graph.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different, larger graph.
    pub fn namespace(&self, id: NamespaceId) -> &Namespace {
        &self.namespaces[id.index()]
    }

    /// Name of `id`; same precondition as [`NamespaceGraph::namespace`]
    pub fn name(&self, id: NamespaceId) -> &str {
        self.namespace(id).name()
    }

    /// The first registered namespace without dependencies
    pub fn root(&self) -> NamespaceId {
        self.root
    }

    /// All namespaces in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.iter()
    }

    pub fn dependencies(&self, id: NamespaceId) -> &[NamespaceId] {
        self.namespace(id).dependencies()
    }

    /// Namespaces that list `id` as a dependency, in registration order
    pub fn dependents(&self, id: NamespaceId) -> Vec<NamespaceId> {
        let mut dependents: Vec<NamespaceId> = self
            .graph
            .neighbors_directed(NodeIndex::new(id.index()), Direction::Incoming)
            .map(|node| self.graph[node])
            .collect();
        dependents.sort_unstable();
        dependents.dedup();
        dependents
    }

    /// Namespaces one remap hop away from `id`, in registration order
    pub fn neighbors(&self, id: NamespaceId) -> &[NamespaceId] {
        &self.neighbors[id.index()]
    }

    pub fn is_adjacent(&self, a: NamespaceId, b: NamespaceId) -> bool {
        self.neighbors(a).contains(&b)
    }

    /// The namespace followed by its first declared dependency, repeated up
    /// to a namespace without dependencies.
    ///
    /// Symbols a namespace does not name are looked up along this chain.
    pub fn fallback_chain(&self, id: NamespaceId) -> Vec<NamespaceId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(&parent) = self.dependencies(current).first() {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Render every namespace with its neighbours, one per line
    pub fn adjacency_listing(&self) -> String {
        let mut listing = String::new();
        for namespace in &self.namespaces {
            let neighbors = self.neighbors(namespace.id());
            let rendered = if neighbors.is_empty() {
                "(none)".to_owned()
            } else {
                neighbors
                    .iter()
                    .map(|&neighbor| self.name(neighbor))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let marker = if namespace.is_named() { " [named]" } else { "" };
            let _ = writeln!(listing, "{}{marker} -> {rendered}", namespace.name());
        }
        listing
    }

    fn warn_disconnected(&self) {
        let mut seen: FxHashSet<NamespaceId> = FxHashSet::default();
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            if seen.insert(current) {
                stack.extend(self.neighbors(current).iter().copied());
            }
        }
        for namespace in &self.namespaces {
            if !seen.contains(&namespace.id()) {
                warn!(
                    "Namespace `{}` is not connected to root `{}`; remap requests involving it will fail",
                    namespace.name(),
                    self.name(self.root)
                );
            }
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().cow_to_lowercase().into_owned()
}
