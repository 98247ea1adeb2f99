//! Per-pair mapping tables.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::descriptor::remap_descriptor;

/// A renamed field or method; `desc` is in the table's source namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMapping {
    pub name: String,
    pub desc: String,
    pub mapped: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    pub name: String,
    pub mapped: String,
    pub fields: Vec<MemberMapping>,
    pub methods: Vec<MemberMapping>,
}

impl ClassMapping {
    fn identity(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            mapped: name.to_owned(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }
}

/// Symbol renames from one namespace to another.
///
/// Keys are names in the `from` namespace. Descriptors are never stored in
/// the target namespace; they are derived from the class renames on demand.
/// Tables are populated once by the provider and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    from: String,
    to: String,
    classes: FxHashMap<String, ClassMapping>,
}

impl MappingTable {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            classes: FxHashMap::default(),
        }
    }

    pub fn from_namespace(&self) -> &str {
        &self.from
    }

    pub fn to_namespace(&self) -> &str {
        &self.to
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassMapping> {
        self.classes.values()
    }

    pub fn insert_class(&mut self, name: &str, mapped: &str) {
        self.classes
            .entry(name.to_owned())
            .or_insert_with(|| ClassMapping::identity(name))
            .mapped = mapped.to_owned();
    }

    pub fn insert_field(&mut self, owner: &str, name: &str, desc: &str, mapped: &str) {
        self.class_entry(owner).fields.push(MemberMapping {
            name: name.to_owned(),
            desc: desc.to_owned(),
            mapped: mapped.to_owned(),
        });
    }

    pub fn insert_method(&mut self, owner: &str, name: &str, desc: &str, mapped: &str) {
        self.class_entry(owner).methods.push(MemberMapping {
            name: name.to_owned(),
            desc: desc.to_owned(),
            mapped: mapped.to_owned(),
        });
    }

    fn class_entry(&mut self, owner: &str) -> &mut ClassMapping {
        self.classes
            .entry(owner.to_owned())
            .or_insert_with(|| ClassMapping::identity(owner))
    }

    pub fn class(&self, name: &str) -> Option<&ClassMapping> {
        self.classes.get(name)
    }

    /// Renamed class, `None` when the table does not know the class
    pub fn map_class(&self, name: &str) -> Option<&str> {
        self.classes.get(name).map(|class| class.mapped.as_str())
    }

    pub fn map_field(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.classes
            .get(owner)?
            .fields
            .iter()
            .find(|field| field.name == name && field.desc == desc)
            .map(|field| field.mapped.as_str())
    }

    /// First field of `owner` named `name`, whatever its type
    pub fn map_field_by_name(&self, owner: &str, name: &str) -> Option<&str> {
        self.classes
            .get(owner)?
            .fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.mapped.as_str())
    }

    pub fn map_method(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.classes
            .get(owner)?
            .methods
            .iter()
            .find(|method| method.name == name && method.desc == desc)
            .map(|method| method.mapped.as_str())
    }

    /// Rewrite the class names inside a field or method descriptor
    pub fn map_desc(&self, desc: &str) -> String {
        remap_descriptor(desc, |class| self.map_class(class))
    }

    /// The table mapping back from `to` to `from`
    pub fn reverse(&self) -> Self {
        let mut reversed = Self::new(self.to.clone(), self.from.clone());
        for class in self.classes.values() {
            reversed.insert_class(&class.mapped, &class.name);
            for field in &class.fields {
                reversed.insert_field(&class.mapped, &field.mapped, &self.map_desc(&field.desc), &field.name);
            }
            for method in &class.methods {
                reversed.insert_method(
                    &class.mapped,
                    &method.mapped,
                    &self.map_desc(&method.desc),
                    &method.name,
                );
            }
        }
        reversed
    }

    /// Chain this table with `next`, whose source namespace is this table's
    /// target. Symbols `next` does not know keep their intermediate names.
    pub fn compose(&self, next: &Self) -> Self {
        let mut composed = Self::new(self.from.clone(), next.to.clone());
        for class in self.classes.values() {
            let middle = class.mapped.as_str();
            composed.insert_class(&class.name, next.map_class(middle).unwrap_or(middle));
            for field in &class.fields {
                let desc = self.map_desc(&field.desc);
                let mapped = next
                    .map_field(middle, &field.mapped, &desc)
                    .unwrap_or(&field.mapped);
                composed.insert_field(&class.name, &field.name, &field.desc, mapped);
            }
            for method in &class.methods {
                let desc = self.map_desc(&method.desc);
                let mapped = next
                    .map_method(middle, &method.mapped, &desc)
                    .unwrap_or(&method.mapped);
                composed.insert_method(&class.name, &method.name, &method.desc, mapped);
            }
        }
        composed
    }

    /// Render as two-namespace Tiny v2, classes sorted by source name
    pub fn to_tiny(&self) -> String {
        let mut out = format!("tiny\t2\t0\t{}\t{}\n", self.from, self.to);
        let mut classes: Vec<&ClassMapping> = self.classes.values().collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        for class in classes {
            let _ = writeln!(out, "c\t{}\t{}", class.name, class.mapped);
            for field in &class.fields {
                let _ = writeln!(out, "\tf\t{}\t{}\t{}", field.desc, field.name, field.mapped);
            }
            for method in &class.methods {
                let _ = writeln!(out, "\tm\t{}\t{}\t{}", method.desc, method.name, method.mapped);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn table() -> MappingTable {
        let mut table = MappingTable::new("official", "named");
        table.insert_class("a", "net/minecraft/world/Level");
        table.insert_class("b", "net/minecraft/world/Entity");
        table.insert_field("a", "c", "Lb;", "player");
        table.insert_method("a", "d", "(Lb;I)La;", "spawn");
        table.insert_method("b", "e", "()V", "tick");
        table
    }

    #[test]
    fn test_lookups() {
        let table = table();
        assert_eq!(table.map_class("a"), Some("net/minecraft/world/Level"));
        assert_eq!(table.map_class("zz"), None);
        assert_eq!(table.map_field("a", "c", "Lb;"), Some("player"));
        assert_eq!(table.map_field("a", "c", "I"), None);
        assert_eq!(table.map_field_by_name("a", "c"), Some("player"));
        assert_eq!(table.map_method("a", "d", "(Lb;I)La;"), Some("spawn"));
        assert_eq!(
            table.map_desc("(Lb;I)La;"),
            "(Lnet/minecraft/world/Entity;I)Lnet/minecraft/world/Level;"
        );
    }

    #[test]
    fn test_reverse_keys_members_by_target_descriptor() {
        let reversed = table().reverse();
        assert_eq!(reversed.from_namespace(), "named");
        assert_eq!(reversed.map_class("net/minecraft/world/Level"), Some("a"));
        assert_eq!(
            reversed.map_method(
                "net/minecraft/world/Level",
                "spawn",
                "(Lnet/minecraft/world/Entity;I)Lnet/minecraft/world/Level;"
            ),
            Some("d")
        );
    }

    #[test]
    fn test_round_trip_composes_to_identity() {
        let table = table();
        let identity = table.compose(&table.reverse());
        for class in identity.classes() {
            assert_eq!(class.name, class.mapped);
            for member in class.fields.iter().chain(&class.methods) {
                assert_eq!(member.name, member.mapped);
            }
        }
        assert_eq!(identity.len(), table.len());
    }

    #[test]
    fn test_to_tiny_is_sorted() {
        let mut table = MappingTable::new("official", "named");
        table.insert_class("b", "Second");
        table.insert_class("a", "First");
        table.insert_method("a", "x", "()V", "run");
        insta::assert_snapshot!(table.to_tiny(), @r"
        tiny	2	0	official	named
        c	a	First
        	m	()V	x	run
        c	b	Second
        ");
    }
}
