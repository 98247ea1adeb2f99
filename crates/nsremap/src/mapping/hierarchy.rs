//! Class hierarchy and member resolution.
//!
//! Resolution answers "which declaration does `owner.name` refer to", looking
//! at the named owner and, for recursive lookups, its supertypes and
//! interfaces breadth-first. All names are in the namespace of the classes
//! the hierarchy was built from.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::classfile::ClassNode;

/// Lookup policy when more than one declaration matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// More than one distinct candidate is an ambiguity
    Unique,
    /// The nearest candidate wins
    First,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveFlags {
    /// Search supertypes and interfaces as well as the owner
    pub recursive: bool,
    pub mode: ResolveMode,
}

impl ResolveFlags {
    pub const UNIQUE_RECURSIVE: Self = Self {
        recursive: true,
        mode: ResolveMode::Unique,
    };
    pub const FIRST_RECURSIVE: Self = Self {
        recursive: true,
        mode: ResolveMode::First,
    };
}

/// Outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Found(T),
    Ambiguous(Vec<T>),
    NotFound,
}

impl<T> Resolution<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// A resolved member: the declaring class plus the declared signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl MemberRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }
}

impl std::fmt::Display for MemberRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{};{}{}", self.owner, self.name, self.desc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDecl {
    pub name: String,
    pub desc: String,
}

/// Declarations of one class relevant to resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberDecl>,
    pub methods: Vec<MemberDecl>,
}

impl From<&ClassNode> for ClassInfo {
    fn from(class: &ClassNode) -> Self {
        Self {
            name: class.name.clone(),
            super_name: class.super_name.clone(),
            interfaces: class.interfaces.clone(),
            fields: class
                .fields
                .iter()
                .map(|field| MemberDecl {
                    name: field.name.clone(),
                    desc: field.desc.clone(),
                })
                .collect(),
            methods: class
                .methods
                .iter()
                .map(|method| MemberDecl {
                    name: method.name.clone(),
                    desc: method.desc.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MemberKind {
    Field,
    Method,
}

/// Every known class, inputs and classpath alike
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: FxHashMap<String, ClassInfo>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_classes<'a>(classes: impl IntoIterator<Item = &'a ClassNode>) -> Self {
        let mut hierarchy = Self::new();
        for class in classes {
            hierarchy.insert(class.into());
        }
        hierarchy
    }

    /// Add a class; the first declaration of a name wins
    pub fn insert(&mut self, class: ClassInfo) {
        self.classes.entry(class.name.clone()).or_insert(class);
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn resolve_class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// `name` followed by its known supertypes and interfaces, breadth-first
    pub fn ancestors(&self, name: &str) -> Vec<&str> {
        let Some((root, _)) = self.classes.get_key_value(name) else {
            return Vec::new();
        };
        let mut order: Vec<&str> = Vec::new();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut queue: VecDeque<&str> = VecDeque::from([root.as_str()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            let Some(info) = self.classes.get(current) else {
                continue;
            };
            for parent in info.super_name.iter().chain(&info.interfaces) {
                if let Some((key, _)) = self.classes.get_key_value(parent.as_str()) {
                    queue.push_back(key.as_str());
                }
            }
        }
        order
    }

    pub fn resolve_field(
        &self,
        owner: &str,
        name: &str,
        desc: Option<&str>,
        flags: ResolveFlags,
    ) -> Resolution<MemberRef> {
        self.resolve_member(MemberKind::Field, owner, name, desc, flags)
    }

    pub fn resolve_method(
        &self,
        owner: &str,
        name: &str,
        desc: Option<&str>,
        flags: ResolveFlags,
    ) -> Resolution<MemberRef> {
        self.resolve_member(MemberKind::Method, owner, name, desc, flags)
    }

    fn resolve_member(
        &self,
        kind: MemberKind,
        owner: &str,
        name: &str,
        desc: Option<&str>,
        flags: ResolveFlags,
    ) -> Resolution<MemberRef> {
        let search = if flags.recursive {
            self.ancestors(owner)
        } else if self.classes.contains_key(owner) {
            vec![owner]
        } else {
            Vec::new()
        };

        let mut candidates: Vec<MemberRef> = Vec::new();
        for class_name in search {
            let Some(class) = self.classes.get(class_name) else {
                continue;
            };
            let members = match kind {
                MemberKind::Field => &class.fields,
                MemberKind::Method => &class.methods,
            };
            for member in members {
                if member.name != name || desc.is_some_and(|desc| desc != member.desc) {
                    continue;
                }
                if flags.mode == ResolveMode::First {
                    return Resolution::Found(MemberRef::new(class_name, &member.name, &member.desc));
                }
                // an override of an already found signature is the same candidate
                if !candidates
                    .iter()
                    .any(|known| known.name == member.name && known.desc == member.desc)
                {
                    candidates.push(MemberRef::new(class_name, &member.name, &member.desc));
                }
            }
        }

        match candidates.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Found(candidates.remove(0)),
            _ => Resolution::Ambiguous(candidates),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{FieldNode, MethodNode};

    fn class(name: &str, super_name: Option<&str>, interfaces: &[&str]) -> ClassNode {
        ClassNode {
            name: name.to_owned(),
            super_name: super_name.map(str::to_owned),
            interfaces: interfaces.iter().map(|i| (*i).to_owned()).collect(),
            ..ClassNode::default()
        }
    }

    fn method(name: &str, desc: &str) -> MethodNode {
        MethodNode {
            name: name.to_owned(),
            desc: desc.to_owned(),
            ..MethodNode::default()
        }
    }

    fn hierarchy() -> ClassHierarchy {
        let mut entity = class("Entity", Some("java/lang/Object"), &["Nameable"]);
        entity.methods.push(method("tick", "()V"));
        entity.methods.push(method("move", "(D)V"));
        entity.methods.push(method("move", "(DD)V"));
        entity.fields.push(FieldNode {
            name: "level".to_owned(),
            desc: "LLevel;".to_owned(),
            ..FieldNode::default()
        });

        let mut player = class("Player", Some("Entity"), &[]);
        player.methods.push(method("tick", "()V"));

        let mut nameable = class("Nameable", None, &[]);
        nameable.methods.push(method("getName", "()Ljava/lang/String;"));

        ClassHierarchy::from_classes([&entity, &player, &nameable])
    }

    #[test]
    fn test_ancestors_are_breadth_first() {
        let hierarchy = hierarchy();
        assert_eq!(hierarchy.ancestors("Player"), vec!["Player", "Entity", "Nameable"]);
        assert!(hierarchy.ancestors("Unknown").is_empty());
    }

    #[test]
    fn test_recursive_lookup_finds_inherited_members() {
        let hierarchy = hierarchy();
        assert_eq!(
            hierarchy
                .resolve_field("Player", "level", None, ResolveFlags::UNIQUE_RECURSIVE)
                .found(),
            Some(MemberRef::new("Entity", "level", "LLevel;"))
        );
        assert_eq!(
            hierarchy
                .resolve_method("Player", "getName", None, ResolveFlags::UNIQUE_RECURSIVE)
                .found(),
            Some(MemberRef::new("Nameable", "getName", "()Ljava/lang/String;"))
        );

        let shallow = ResolveFlags {
            recursive: false,
            mode: ResolveMode::Unique,
        };
        assert_eq!(
            hierarchy.resolve_field("Player", "level", None, shallow),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_override_is_not_ambiguous() {
        let hierarchy = hierarchy();
        assert_eq!(
            hierarchy
                .resolve_method("Player", "tick", None, ResolveFlags::UNIQUE_RECURSIVE)
                .found(),
            Some(MemberRef::new("Player", "tick", "()V"))
        );
    }

    #[test]
    fn test_overloads_are_ambiguous_unless_first_match() {
        let hierarchy = hierarchy();
        match hierarchy.resolve_method("Player", "move", None, ResolveFlags::UNIQUE_RECURSIVE) {
            Resolution::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
        assert_eq!(
            hierarchy
                .resolve_method("Player", "move", None, ResolveFlags::FIRST_RECURSIVE)
                .found(),
            Some(MemberRef::new("Entity", "move", "(D)V"))
        );
        assert!(
            hierarchy
                .resolve_method("Player", "move", Some("(DD)V"), ResolveFlags::UNIQUE_RECURSIVE)
                .is_found()
        );
    }
}
