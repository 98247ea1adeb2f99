//! Mapping data and symbol resolution.
//!
//! A [`MappingTree`] holds names for every namespace side by side. The
//! [`MappingTableProvider`] projects it into immutable per-pair
//! [`MappingTable`]s, and a [`SymbolResolver`] combines a table with a
//! [`ClassHierarchy`] to resolve and rename symbols the way the rewrite
//! engine and the annotation engine need.

pub mod hierarchy;
pub mod provider;
pub mod resolver;
pub mod table;
pub mod tree;

pub use hierarchy::{ClassHierarchy, ClassInfo, MemberRef, Resolution, ResolveFlags, ResolveMode};
pub use provider::MappingTableProvider;
pub use resolver::SymbolResolver;
pub use table::{ClassMapping, MappingTable, MemberMapping};
pub use tree::MappingTree;
