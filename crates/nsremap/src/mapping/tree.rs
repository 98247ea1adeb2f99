//! Multi-namespace mapping data in the Tiny v2 layout.
//!
//! ```text
//! tiny	2	0	official	intermediary	named
//! c	a	net/minecraft/class_1	net/minecraft/world/Level
//! 	f	I	b	field_2	time
//! 	m	(La;)V	c	method_3	tick
//! ```
//!
//! Member descriptors are written in the first namespace. An empty column
//! means the namespace has no name of its own for that symbol.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use log::debug;
use sha2::{Digest, Sha256};

use crate::error::RemapError;

/// Names of a field or method, one column per namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    /// Descriptor in the first namespace
    pub desc: String,
    pub names: Vec<Option<String>>,
}

impl MemberEntry {
    pub fn root_name(&self) -> &str {
        self.names.first().and_then(Option::as_deref).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    pub names: Vec<Option<String>>,
    pub fields: Vec<MemberEntry>,
    pub methods: Vec<MemberEntry>,
}

impl ClassEntry {
    pub fn root_name(&self) -> &str {
        self.names.first().and_then(Option::as_deref).unwrap_or_default()
    }
}

/// All mapping data, keyed by first-namespace class name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTree {
    namespaces: Vec<String>,
    classes: IndexMap<String, ClassEntry>,
}

impl MappingTree {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mappings from {}", path.display()))?;
        let tree = Self::parse(&text, path)?;
        debug!(
            "Loaded {} classes in namespaces [{}] from {}",
            tree.classes.len(),
            tree.namespaces.join(", "),
            path.display()
        );
        Ok(tree)
    }

    /// Parse Tiny v2 text; `origin` only labels errors
    pub fn parse(text: &str, origin: &Path) -> Result<Self, RemapError> {
        let error = |line: usize, message: String| RemapError::MappingFormat {
            path: PathBuf::from(origin),
            line,
            message,
        };

        let mut lines = text.lines().enumerate();
        let Some((_, header)) = lines.next() else {
            return Err(error(1, "empty mapping file".to_owned()));
        };
        let columns: Vec<&str> = header.split('\t').collect();
        if columns.len() < 4 || columns[0] != "tiny" || columns[1] != "2" {
            return Err(error(1, format!("expected a tiny v2 header, found `{header}`")));
        }
        let namespaces: Vec<String> = columns[3..].iter().map(|ns| (*ns).to_owned()).collect();
        let width = namespaces.len();

        let mut tree = Self {
            namespaces,
            classes: IndexMap::new(),
        };
        let mut escaped = false;
        let mut current: Option<String> = None;

        for (index, line) in lines {
            let number = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            let depth = line.len() - line.trim_start_matches('\t').len();
            let parts: Vec<&str> = line[depth..].split('\t').collect();
            let names = |offset: usize| -> Result<Vec<Option<String>>, RemapError> {
                let raw = &parts[offset.min(parts.len())..];
                if raw.len() > width {
                    return Err(error(number, format!("expected {width} names, found {}", raw.len())));
                }
                let mut names: Vec<Option<String>> = raw
                    .iter()
                    .map(|name| (!name.is_empty()).then(|| unescape(name, escaped)))
                    .collect();
                names.resize(width, None);
                if names[0].is_none() {
                    return Err(error(number, "missing name in the first namespace".to_owned()));
                }
                Ok(names)
            };

            match (depth, parts[0]) {
                (0, "c") => {
                    let names = names(1)?;
                    let key = names[0].clone().unwrap_or_default();
                    tree.classes.insert(
                        key.clone(),
                        ClassEntry {
                            names,
                            fields: Vec::new(),
                            methods: Vec::new(),
                        },
                    );
                    current = Some(key);
                }
                (1, "escaped-names") if current.is_none() => escaped = true,
                (1, _) if current.is_none() => {}
                (1, kind @ ("f" | "m")) => {
                    let Some(desc) = parts.get(1) else {
                        return Err(error(number, "member without descriptor".to_owned()));
                    };
                    let entry = MemberEntry {
                        desc: unescape(desc, escaped),
                        names: names(2)?,
                    };
                    let Some(class) = current.as_ref().and_then(|key| tree.classes.get_mut(key))
                    else {
                        return Err(error(number, "member outside of a class".to_owned()));
                    };
                    if kind == "f" {
                        class.fields.push(entry);
                    } else {
                        class.methods.push(entry);
                    }
                }
                // comments, parameters and local variables
                (1, "c") | (2.., _) => {}
                (_, other) => {
                    return Err(error(number, format!("unexpected `{other}` entry")));
                }
            }
        }
        Ok(tree)
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Column index of a namespace
    pub fn column(&self, namespace: &str) -> Option<usize> {
        self.namespaces.iter().position(|ns| ns == namespace)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.values()
    }

    /// Class entry by first-namespace name
    pub fn class(&self, root_name: &str) -> Option<&ClassEntry> {
        self.classes.get(root_name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Fold `other` into this tree.
    ///
    /// Both trees must start with the same namespace; symbols are matched on
    /// their first-namespace names. Namespaces unknown to this tree become new
    /// columns, and names already present are kept.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        if self.namespaces.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.namespaces.first() != other.namespaces.first() {
            bail!(
                "cannot merge mappings rooted at `{}` into mappings rooted at `{}`",
                other.namespaces.first().map_or("", String::as_str),
                self.namespaces[0]
            );
        }

        let columns: Vec<usize> = other
            .namespaces
            .iter()
            .map(|namespace| {
                self.column(namespace).unwrap_or_else(|| {
                    self.namespaces.push(namespace.clone());
                    self.namespaces.len() - 1
                })
            })
            .collect();
        let width = self.namespaces.len();
        for class in self.classes.values_mut() {
            class.names.resize(width, None);
            for member in class.fields.iter_mut().chain(class.methods.iter_mut()) {
                member.names.resize(width, None);
            }
        }

        for (key, incoming) in other.classes {
            let class = self.classes.entry(key).or_insert_with(|| ClassEntry {
                names: vec![None; width],
                fields: Vec::new(),
                methods: Vec::new(),
            });
            fill(&mut class.names, &incoming.names, &columns);
            merge_members(&mut class.fields, incoming.fields, &columns, width);
            merge_members(&mut class.methods, incoming.methods, &columns, width);
        }
        Ok(())
    }

    /// Content identity of the mapping data
    pub fn fingerprint(&self) -> String {
        let mut digest = Sha256::new();
        let mut feed = |names: &[Option<String>]| {
            for name in names {
                digest.update(name.as_deref().unwrap_or_default().as_bytes());
                digest.update([0]);
            }
            digest.update([1]);
        };
        let header: Vec<Option<String>> = self.namespaces.iter().cloned().map(Some).collect();
        feed(&header);
        for class in self.classes.values() {
            feed(&class.names);
            for member in class.fields.iter().chain(&class.methods) {
                feed(std::slice::from_ref(&Some(member.desc.clone())));
                feed(&member.names);
            }
        }
        let bytes = digest.finalize();
        bytes.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

fn fill(target: &mut [Option<String>], incoming: &[Option<String>], columns: &[usize]) {
    for (name, &column) in incoming.iter().zip(columns) {
        if target[column].is_none() {
            target[column].clone_from(name);
        }
    }
}

fn merge_members(
    existing: &mut Vec<MemberEntry>,
    incoming: Vec<MemberEntry>,
    columns: &[usize],
    width: usize,
) {
    for member in incoming {
        let position = existing
            .iter()
            .position(|known| known.desc == member.desc && known.root_name() == member.root_name());
        let target = if let Some(position) = position {
            &mut existing[position]
        } else {
            existing.push(MemberEntry {
                desc: member.desc.clone(),
                names: vec![None; width],
            });
            let last = existing.len() - 1;
            &mut existing[last]
        };
        fill(&mut target.names, &member.names, columns);
    }
}

fn unescape(raw: &str, escaped: bool) -> String {
    if !escaped || !raw.contains('\\') {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const YARN: &str = "tiny\t2\t0\tofficial\tintermediary\tnamed
c\ta\tnet/minecraft/class_1\tnet/minecraft/world/Level
\tc\tA level.
\tf\tI\tb\tfield_2\ttime
\tm\t(La;)V\tc\tmethod_3\ttick
\t\tp\t1\t\t\tlevel
c\td\tnet/minecraft/class_4\t
";

    fn parse(text: &str) -> MappingTree {
        MappingTree::parse(text, Path::new("test.tiny")).expect("valid mappings")
    }

    #[test]
    fn test_parse_tiny_v2() {
        let tree = parse(YARN);
        assert_eq!(tree.namespaces(), ["official", "intermediary", "named"]);
        assert_eq!(tree.len(), 2);

        let level = tree.class("a").unwrap();
        assert_eq!(
            level.names,
            vec![
                Some("a".to_owned()),
                Some("net/minecraft/class_1".to_owned()),
                Some("net/minecraft/world/Level".to_owned()),
            ]
        );
        assert_eq!(level.fields.len(), 1);
        assert_eq!(level.methods[0].desc, "(La;)V");
        assert_eq!(level.methods[0].names[2].as_deref(), Some("tick"));

        // empty trailing column means no named name
        assert_eq!(tree.class("d").unwrap().names[2], None);
    }

    #[test]
    fn test_rejects_bad_header() {
        let err = MappingTree::parse("v1\tofficial\tnamed\n", Path::new("bad.tiny")).unwrap_err();
        assert!(matches!(err, RemapError::MappingFormat { line: 1, .. }));
    }

    #[test]
    fn test_rejects_unknown_entry() {
        let err = MappingTree::parse(
            "tiny\t2\t0\tofficial\tnamed\nc\ta\tb\n\t\tp\t0\tx\n\tx\ty\n",
            Path::new("bad.tiny"),
        )
        .unwrap_err();
        assert!(matches!(err, RemapError::MappingFormat { line: 4, .. }));
    }

    #[test]
    fn test_merge_adds_columns_and_keeps_existing_names() {
        let mut tree = parse(YARN);
        let searge = parse(
            "tiny\t2\t0\tofficial\tsearge
c\ta\tnet/minecraft/src/C_1_
\tf\tI\tb\tf_2_
c\te\tnet/minecraft/src/C_5_
",
        );
        tree.merge(searge).unwrap();

        assert_eq!(tree.namespaces(), ["official", "intermediary", "named", "searge"]);
        let level = tree.class("a").unwrap();
        assert_eq!(level.names[3].as_deref(), Some("net/minecraft/src/C_1_"));
        assert_eq!(level.fields[0].names[3].as_deref(), Some("f_2_"));
        assert_eq!(level.methods[0].names.len(), 4);
        assert_eq!(tree.class("e").unwrap().names[1], None);
    }

    #[test]
    fn test_merge_requires_shared_root() {
        let mut tree = parse(YARN);
        let other = parse("tiny\t2\t0\tintermediary\tnamed\nc\tx\ty\n");
        assert!(tree.merge(other).is_err());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let tree = parse(YARN);
        assert_eq!(tree.fingerprint(), parse(YARN).fingerprint());
        assert_eq!(tree.fingerprint().len(), 64);

        let changed = parse(&YARN.replace("tick", "update"));
        assert_ne!(tree.fingerprint(), changed.fingerprint());
    }
}
