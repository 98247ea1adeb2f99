//! Symbol resolution and renaming for one hop.

use crate::mapping::{
    ClassHierarchy, ClassInfo, MappingTable, MemberRef, Resolution, ResolveFlags,
};

/// Resolution against a hierarchy combined with renaming through a table.
///
/// The hierarchy is in the table's source namespace; everything this returns
/// from `map_*` is in the target namespace.
#[derive(Debug, Clone, Copy)]
pub struct SymbolResolver<'a> {
    table: &'a MappingTable,
    hierarchy: &'a ClassHierarchy,
}

impl<'a> SymbolResolver<'a> {
    pub fn new(table: &'a MappingTable, hierarchy: &'a ClassHierarchy) -> Self {
        Self { table, hierarchy }
    }

    pub fn table(&self) -> &'a MappingTable {
        self.table
    }

    pub fn hierarchy(&self) -> &'a ClassHierarchy {
        self.hierarchy
    }

    pub fn resolve_class(&self, name: &str) -> Option<&'a ClassInfo> {
        self.hierarchy.resolve_class(name)
    }

    pub fn resolve_field(
        &self,
        owner: &str,
        name: &str,
        desc: Option<&str>,
        flags: ResolveFlags,
    ) -> Resolution<MemberRef> {
        self.hierarchy.resolve_field(owner, name, desc, flags)
    }

    pub fn resolve_method(
        &self,
        owner: &str,
        name: &str,
        desc: Option<&str>,
        flags: ResolveFlags,
    ) -> Resolution<MemberRef> {
        self.hierarchy.resolve_method(owner, name, desc, flags)
    }

    pub fn map_class(&self, name: &str) -> String {
        self.table.map_class(name).unwrap_or(name).to_owned()
    }

    pub fn map_desc(&self, desc: &str) -> String {
        self.table.map_desc(desc)
    }

    /// Renamed field, inheriting the mapping of a supertype's declaration
    /// when the owner itself has none
    pub fn map_field_name(&self, owner: &str, name: &str, desc: &str) -> String {
        self.inherited(owner, |class| self.table.map_field(class, name, desc))
            .unwrap_or(name)
            .to_owned()
    }

    /// Renamed method, inheriting the mapping of an overridden declaration.
    /// Constructors and static initializers keep their names.
    pub fn map_method_name(&self, owner: &str, name: &str, desc: &str) -> String {
        if name.starts_with('<') {
            return name.to_owned();
        }
        self.inherited(owner, |class| self.table.map_method(class, name, desc))
            .unwrap_or(name)
            .to_owned()
    }

    pub fn map_member_name(&self, member: &MemberRef, is_method: bool) -> String {
        if is_method {
            self.map_method_name(&member.owner, &member.name, &member.desc)
        } else {
            self.map_field_name(&member.owner, &member.name, &member.desc)
        }
    }

    fn inherited(&self, owner: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> Option<&'a str> {
        if let Some(mapped) = lookup(owner) {
            return Some(mapped);
        }
        self.hierarchy
            .ancestors(owner)
            .into_iter()
            .skip(1)
            .find_map(lookup)
    }
}
