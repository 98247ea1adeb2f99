//! Class-structure model and archives.
//!
//! This is the representation the reference rewrite engine operates on: the
//! declarations of a class (names, supertypes, members, annotations) without
//! code. Archives are ordered maps from entry path to entry and are stored as
//! JSON on disk.

use std::{fs, path::Path};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Value of an annotation element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationValue {
    Bool(bool),
    Int(i64),
    String(String),
    /// A class literal, as a descriptor (`Lpkg/Cls;`)
    Type(String),
    Enum { desc: String, value: String },
    Array(Vec<AnnotationValue>),
    Annotation(Annotation),
}

impl AnnotationValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Scalars are treated as one-element arrays, matching how the JVM lets
    /// annotation arrays be written without braces.
    pub fn elements(&self) -> &[Self] {
        match self {
            Self::Array(values) => values,
            other => std::slice::from_ref(other),
        }
    }
}

/// An annotation occurrence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Annotation {
    /// Descriptor of the annotation type
    pub desc: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub values: IndexMap<String, AnnotationValue>,
}

impl Annotation {
    pub fn new(desc: impl Into<String>) -> Self {
        Self {
            desc: desc.into(),
            values: IndexMap::new(),
        }
    }

    /// Builder-style element setter
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.values.get(name)
    }

    /// All string values of an element, flattening arrays
    pub fn strings(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|value| {
                value
                    .elements()
                    .iter()
                    .filter_map(AnnotationValue::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nested annotations of an element, flattening arrays
    pub fn annotations(&self, name: &str) -> Vec<&Self> {
        self.get(name)
            .map(|value| {
                value
                    .elements()
                    .iter()
                    .filter_map(|element| match element {
                        AnnotationValue::Annotation(annotation) => Some(annotation),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The `remap` element, defaulting to `inherited` when absent
    pub fn remap(&self, inherited: bool) -> bool {
        self.get("remap")
            .and_then(AnnotationValue::as_bool)
            .unwrap_or(inherited)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldNode {
    #[serde(default)]
    pub access: u16,
    pub name: String,
    pub desc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodNode {
    #[serde(default)]
    pub access: u16,
    pub name: String,
    pub desc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

/// Declarations of one class
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassNode {
    /// Internal name
    pub name: String,
    #[serde(default)]
    pub access: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodNode>,
}

impl ClassNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn annotation(&self, desc: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|annotation| annotation.desc == desc)
    }

    /// Archive path of this class
    pub fn entry_path(&self) -> String {
        format!("{}.class", self.name)
    }
}

/// One archive entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    Class(ClassNode),
    Text(String),
    Binary(Vec<u8>),
}

/// An ordered collection of entries keyed by path
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Archive {
    pub entries: IndexMap<String, Entry>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(path: &Path) -> Result<Self, EngineError> {
        let bytes = fs::read(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| EngineError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| EngineError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, bytes).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn insert_class(&mut self, class: ClassNode) {
        self.entries.insert(class.entry_path(), Entry::Class(class));
    }

    pub fn insert_text(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(path.into(), Entry::Text(text.into()));
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassNode> {
        self.entries.values().filter_map(|entry| match entry {
            Entry::Class(class) => Some(class),
            _ => None,
        })
    }

    pub fn class(&self, name: &str) -> Option<&ClassNode> {
        match self.entries.get(&format!("{name}.class")) {
            Some(Entry::Class(class)) => Some(class),
            _ => None,
        }
    }

    pub fn text(&self, path: &str) -> Option<&str> {
        match self.entries.get(path) {
            Some(Entry::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Text entries whose file name satisfies `predicate`
    pub fn texts_matching<'a>(
        &'a self,
        predicate: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.entries.iter().filter_map(move |(path, entry)| match entry {
            Entry::Text(text) if predicate(file_name(path)) => Some((path.as_str(), text.as_str())),
            _ => None,
        })
    }
}

/// Last path segment of an archive entry path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_archive_round_trips_through_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mod.jar.json");

        let mut archive = Archive::new();
        let mut class = ClassNode::new("com/example/Mixin");
        class.annotations.push(
            Annotation::new("Lorg/spongepowered/asm/mixin/Mixin;")
                .with("value", AnnotationValue::Array(vec![AnnotationValue::Type("La;".into())])),
        );
        archive.insert_class(class);
        archive.insert_text("mod.mixins.json", "{}");
        archive.write(&path).unwrap();

        let read = Archive::read(&path).unwrap();
        assert_eq!(read, archive);
        assert!(read.class("com/example/Mixin").is_some());
        assert_eq!(read.text("mod.mixins.json"), Some("{}"));
    }

    #[test]
    fn test_missing_archive_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = Archive::read(&temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[test]
    fn test_annotation_accessors_flatten_arrays() {
        let annotation = Annotation::new("Lx;")
            .with("method", AnnotationValue::String("tick".into()))
            .with(
                "targets",
                AnnotationValue::Array(vec![
                    AnnotationValue::String("a.B".into()),
                    AnnotationValue::String("c.D".into()),
                ]),
            )
            .with("remap", AnnotationValue::Bool(false));
        assert_eq!(annotation.strings("method"), vec!["tick"]);
        assert_eq!(annotation.strings("targets"), vec!["a.B", "c.D"]);
        assert!(annotation.strings("missing").is_empty());
        assert!(!annotation.remap(true));
        assert!(Annotation::new("Lx;").remap(true));
    }

    #[test]
    fn test_texts_matching_uses_file_name() {
        let mut archive = Archive::new();
        archive.insert_text("META-INF/mod.mixins.json", "{}");
        archive.insert_text("data/other.json", "{}");
        let matched: Vec<&str> = archive
            .texts_matching(|name| name.contains("mixin"))
            .map(|(path, _)| path)
            .collect();
        assert_eq!(matched, vec!["META-INF/mod.mixins.json"]);
    }
}
