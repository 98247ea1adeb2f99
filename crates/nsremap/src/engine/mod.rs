//! Bytecode rewrite engine interface.
//!
//! The pipeline drives an engine through a fixed sequence: open a session
//! for a mapping table, attach extensions and resource remappers, read the
//! classpath and the inputs, apply into an output archive, finish. Anything
//! that implements [`RewriteEngine`] can stand in for [`ModelEngine`].
//!
//! Extensions see each hop in phases. `analyze` and `pre_apply` run once per
//! input class and may run concurrently; `process_state` runs exactly once in
//! between, after every class has been analyzed.

mod model;

use std::{fmt, path::Path, sync::Arc};

use rustc_hash::FxHashMap;

pub use model::ModelEngine;

use crate::{
    classfile::{Archive, ClassNode},
    error::EngineError,
    mapping::{MappingTable, MemberRef, SymbolResolver},
};

pub trait RewriteEngine: Send + Sync + fmt::Debug {
    /// Start a rewrite with `table`
    fn open(&self, table: Arc<MappingTable>) -> Box<dyn RewriteSession + '_>;
}

/// One rewrite of a set of inputs with one mapping table
pub trait RewriteSession: fmt::Debug {
    fn attach_extension(&mut self, extension: Arc<dyn ClassExtension>);

    fn attach_resource_remapper(&mut self, remapper: Box<dyn ResourceRemapper>);

    /// Classes available for resolution but not rewritten
    fn read_classpath(&mut self, path: &Path) -> Result<(), EngineError>;

    fn read_input(&mut self, path: &Path) -> Result<(), EngineError>;

    /// Rewrite every input into a single archive at `output`
    fn apply(&mut self, output: &Path) -> Result<(), EngineError>;

    /// Release the session's resources
    fn finish(self: Box<Self>);
}

/// Hooks into the class traversal of a session
pub trait ClassExtension: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Inspect the raw inputs before any class is visited
    fn read_inputs(&self, _inputs: &[Archive]) -> Result<(), EngineError> {
        Ok(())
    }

    /// Collect per-class state; no resolution happens here
    fn analyze(&self, _class: &ClassNode) {}

    /// Synchronization point after all classes were analyzed
    fn process_state(&self, _resolver: &SymbolResolver<'_>, _renames: &mut MemberRenames) {}

    /// Per-class work that needs the complete analysis
    fn pre_apply(&self, _class: &ClassNode, _resolver: &SymbolResolver<'_>) {}

    /// Add entries to the output archive
    fn insert_extra(&self, _output: &mut Archive) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Rewrites auxiliary text files with the session's mappings
pub trait ResourceRemapper: Send + Sync + fmt::Debug {
    fn can_transform(&self, path: &str) -> bool;

    fn transform(
        &self,
        path: &str,
        text: &str,
        resolver: &SymbolResolver<'_>,
    ) -> Result<String, EngineError>;
}

/// Explicit member renames that take precedence over the mapping table.
///
/// Keys are members in the source namespace; values are final names.
#[derive(Debug, Clone, Default)]
pub struct MemberRenames {
    fields: FxHashMap<MemberRef, String>,
    methods: FxHashMap<MemberRef, String>,
}

impl MemberRenames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename_field(&mut self, member: MemberRef, name: String) {
        self.fields.insert(member, name);
    }

    pub fn rename_method(&mut self, member: MemberRef, name: String) {
        self.methods.insert(member, name);
    }

    pub fn field(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.fields
            .get(&MemberRef::new(owner, name, desc))
            .map(String::as_str)
    }

    pub fn method(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.methods
            .get(&MemberRef::new(owner, name, desc))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.methods.is_empty()
    }
}
