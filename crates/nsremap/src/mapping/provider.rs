//! Lazily built, cached mapping tables per namespace pair.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{debug, trace};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{
    descriptor::remap_descriptor,
    error::RemapError,
    mapping::{MappingTable, MappingTree},
    namespace::{NamespaceGraph, NamespaceId},
};

/// Owns the mapping data and hands out immutable [`MappingTable`]s.
///
/// A namespace without a name for some symbol borrows the name from its
/// fallback chain (see [`NamespaceGraph::fallback_chain`]), so a table can be
/// produced for any pair of namespaces connected to the mapping data.
#[derive(Debug)]
pub struct MappingTableProvider {
    graph: Arc<NamespaceGraph>,
    tree: Arc<MappingTree>,
    fingerprint: String,
    tables: RwLock<FxHashMap<(NamespaceId, NamespaceId), Arc<MappingTable>>>,
}

impl MappingTableProvider {
    pub fn new(graph: Arc<NamespaceGraph>, tree: MappingTree) -> Self {
        let fingerprint = tree.fingerprint();
        Self {
            graph,
            tree: Arc::new(tree),
            fingerprint,
            tables: RwLock::new(FxHashMap::default()),
        }
    }

    /// Read and merge Tiny v2 files in order
    pub fn from_files(graph: Arc<NamespaceGraph>, paths: &[PathBuf]) -> Result<Self> {
        let mut tree = MappingTree::default();
        for path in paths {
            let next = MappingTree::read(path)?;
            tree.merge(next)
                .with_context(|| format!("Failed to merge mappings from {}", path.display()))?;
        }
        Ok(Self::new(graph, tree))
    }

    pub fn graph(&self) -> &Arc<NamespaceGraph> {
        &self.graph
    }

    pub fn tree(&self) -> &MappingTree {
        &self.tree
    }

    /// Content identity of the underlying mapping data
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn cached_tables(&self) -> usize {
        self.tables.read().len()
    }

    /// Drop every cached table
    pub fn invalidate(&self) {
        self.tables.write().clear();
    }

    pub fn table(&self, from: NamespaceId, to: NamespaceId) -> Result<Arc<MappingTable>, RemapError> {
        if let Some(table) = self.tables.read().get(&(from, to)) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(self.build_table(from, to)?);
        debug!(
            "Built mapping table {} -> {} with {} classes",
            self.graph.name(from),
            self.graph.name(to),
            table.len()
        );
        Ok(Arc::clone(
            self.tables.write().entry((from, to)).or_insert(table),
        ))
    }

    /// Tree columns to consult for `namespace`, most specific first
    fn columns(&self, namespace: NamespaceId) -> Result<Vec<usize>, RemapError> {
        let columns: Vec<usize> = self
            .graph
            .fallback_chain(namespace)
            .into_iter()
            .filter_map(|id| self.tree.column(self.graph.name(id)))
            .collect();
        if columns.is_empty() {
            return Err(RemapError::UnmappedNamespace {
                name: self.graph.name(namespace).to_owned(),
            });
        }
        Ok(columns)
    }

    fn build_table(&self, from: NamespaceId, to: NamespaceId) -> Result<MappingTable, RemapError> {
        let from_columns = self.columns(from)?;
        let to_columns = self.columns(to)?;
        trace!("Columns for {:?}: {from_columns:?}, {:?}: {to_columns:?}", from, to);

        let mut table = MappingTable::new(self.graph.name(from), self.graph.name(to));

        // first-namespace class name -> source-namespace class name, for descriptors
        let mut root_to_source: FxHashMap<&str, &str> = FxHashMap::default();
        for class in self.tree.classes() {
            if let Some(source) = pick(&class.names, &from_columns) {
                root_to_source.insert(class.root_name(), source);
            }
        }

        for class in self.tree.classes() {
            let (Some(source), Some(target)) = (
                pick(&class.names, &from_columns),
                pick(&class.names, &to_columns),
            ) else {
                continue;
            };
            table.insert_class(source, target);

            for field in &class.fields {
                if let (Some(name), Some(mapped)) = (
                    pick(&field.names, &from_columns),
                    pick(&field.names, &to_columns),
                ) {
                    let desc = remap_descriptor(&field.desc, |c| root_to_source.get(c).copied());
                    table.insert_field(source, name, &desc, mapped);
                }
            }
            for method in &class.methods {
                if let (Some(name), Some(mapped)) = (
                    pick(&method.names, &from_columns),
                    pick(&method.names, &to_columns),
                ) {
                    let desc = remap_descriptor(&method.desc, |c| root_to_source.get(c).copied());
                    table.insert_method(source, name, &desc, mapped);
                }
            }
        }
        Ok(table)
    }
}

/// First name present along the column chain
fn pick<'a>(names: &'a [Option<String>], columns: &[usize]) -> Option<&'a str> {
    columns
        .iter()
        .find_map(|&column| names.get(column).and_then(Option::as_deref))
}
