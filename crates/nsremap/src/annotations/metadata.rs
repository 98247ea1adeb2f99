//! Mixin configs and previously generated reference maps found in the input.

use cow_utils::CowUtils;
use indexmap::IndexMap;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::{
    annotations::refmap::{ClassEntries, ReferenceMap},
    classfile::{Archive, file_name},
    error::EngineError,
};

fn is_refmap(name: &str) -> bool {
    name.contains("refmap") && name.ends_with(".json")
}

fn is_mixin_config(name: &str) -> bool {
    name.contains("mixin") && name.ends_with(".json") && !is_refmap(name)
}

/// `mod.mixins.json` -> `mod.mixins-refmap.json`
fn derived_refmap_name(path: &str) -> String {
    let name = file_name(path);
    let stem = name.split(".json").next().unwrap_or(name);
    format!("{stem}-refmap.json")
}

/// What the input archives say about their mixins
#[derive(Debug, Clone, Default)]
pub struct MixinMetadata {
    /// Refmap file per mixin class (internal name)
    class_refmaps: FxHashMap<String, String>,
    /// Known refmap files, in discovery order
    refmaps: IndexMap<String, ReferenceMap>,
    /// Configs with their `refmap` key filled in, by archive path
    configs: IndexMap<String, Value>,
    default_refmap: String,
}

impl MixinMetadata {
    pub fn new(default_refmap: impl Into<String>) -> Self {
        Self {
            default_refmap: default_refmap.into(),
            ..Self::default()
        }
    }

    /// Scan archives for refmaps and mixin configs.
    ///
    /// Refmaps are read first, so a class that already appears in one keeps
    /// that file even when a config names another.
    pub fn read(default_refmap: impl Into<String>, inputs: &[Archive]) -> Result<Self, EngineError> {
        let mut metadata = Self::new(default_refmap);
        for input in inputs {
            for (path, text) in input.texts_matching(is_refmap) {
                metadata.add_refmap(path, text)?;
            }
        }
        for input in inputs {
            for (path, text) in input.texts_matching(is_mixin_config) {
                metadata.add_config(path, text)?;
            }
        }
        Ok(metadata)
    }

    fn add_refmap(&mut self, path: &str, text: &str) -> Result<(), EngineError> {
        let refmap = ReferenceMap::parse(text).map_err(|err| EngineError::Extension {
            extension: "mixin",
            message: format!("invalid refmap {path}: {err}"),
        })?;
        info!("Found refmap {path} covering {} classes", refmap.mappings.len());
        for class in refmap.mappings.keys() {
            self.class_refmaps
                .entry(class.clone())
                .or_insert_with(|| path.to_owned());
        }
        self.refmaps.insert(path.to_owned(), refmap);
        Ok(())
    }

    fn add_config(&mut self, path: &str, text: &str) -> Result<(), EngineError> {
        let mut config: Value = serde_json::from_str(text).map_err(|err| EngineError::Extension {
            extension: "mixin",
            message: format!("invalid mixin config {path}: {err}"),
        })?;
        let Some(object) = config.as_object_mut() else {
            warn!("Mixin config {path} is not a JSON object, skipping");
            return Ok(());
        };

        let refmap = object
            .get("refmap")
            .and_then(Value::as_str)
            .map_or_else(|| derived_refmap_name(path), str::to_owned);
        let package = object.get("package").and_then(Value::as_str).unwrap_or("");
        let mixins: Vec<String> = ["mixins", "client", "server"]
            .iter()
            .filter_map(|key| object.get(*key).and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_str)
            .map(|mixin| {
                let dotted = if package.is_empty() {
                    mixin.to_owned()
                } else {
                    format!("{package}.{mixin}")
                };
                dotted.cow_replace('.', "/").into_owned()
            })
            .collect();
        info!("Found mixin config {path} with {} mixins", mixins.len());

        for class in mixins {
            match self.class_refmaps.get(&class) {
                Some(existing) if *existing != refmap => {
                    warn!("{class} already belongs to {existing}, not moving it to {refmap}");
                }
                Some(_) => {}
                None => {
                    debug!("{class} -> {refmap}");
                    self.class_refmaps.insert(class, refmap.clone());
                }
            }
        }
        self.refmaps.entry(refmap.clone()).or_default();
        object.insert("refmap".to_owned(), Value::String(refmap));
        self.configs.insert(path.to_owned(), config);
        Ok(())
    }

    /// Whether a config or an existing refmap lists `class`
    pub fn contains(&self, class: &str) -> bool {
        self.class_refmaps.contains_key(class)
    }

    /// Refmap file that receives the entries of `class`
    pub fn refmap_for(&self, class: &str) -> &str {
        self.class_refmaps
            .get(class)
            .map(String::as_str)
            .or_else(|| self.refmaps.keys().next().map(String::as_str))
            .unwrap_or(&self.default_refmap)
    }

    /// Previously known entries of `class`, from its existing refmap
    pub fn existing(&self, class: &str) -> Option<&ClassEntries> {
        let file = self.class_refmaps.get(class)?;
        self.refmaps.get(file)?.class(class)
    }

    /// Non-empty reference maps found in the input, by file name
    pub fn existing_refmaps(&self) -> impl Iterator<Item = (&str, &ReferenceMap)> {
        self.refmaps
            .iter()
            .filter(|(_, refmap)| !refmap.is_empty())
            .map(|(path, refmap)| (path.as_str(), refmap))
    }

    /// Configs to write back, by archive path
    pub fn configs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.configs.iter().map(|(path, config)| (path.as_str(), config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive() -> Archive {
        let mut archive = Archive::new();
        archive.insert_text(
            "mod.refmap.json",
            r#"{"mappings": {"com/example/mixin/OldMixin": {"tick": "La;a()V"}}}"#,
        );
        archive.insert_text(
            "mod.mixins.json",
            r#"{"package": "com.example.mixin", "mixins": ["LevelMixin"], "client": ["OldMixin"]}"#,
        );
        archive.insert_text(
            "extra.mixins.json",
            r#"{"package": "com.example.extra", "server": ["ServerMixin"], "refmap": "extra.refmap.json"}"#,
        );
        archive
    }

    #[test]
    fn test_configs_assign_refmaps() {
        let metadata = MixinMetadata::read("unknown-refmap.json", &[archive()]).unwrap();
        assert!(metadata.contains("com/example/mixin/LevelMixin"));
        assert_eq!(
            metadata.refmap_for("com/example/mixin/LevelMixin"),
            "mod.mixins-refmap.json"
        );
        assert_eq!(
            metadata.refmap_for("com/example/extra/ServerMixin"),
            "extra.refmap.json"
        );
        let existing: Vec<&str> = metadata.existing_refmaps().map(|(path, _)| path).collect();
        assert_eq!(existing, vec!["mod.refmap.json"]);
        // listed in an existing refmap first
        assert_eq!(metadata.refmap_for("com/example/mixin/OldMixin"), "mod.refmap.json");
        assert_eq!(
            metadata
                .existing("com/example/mixin/OldMixin")
                .and_then(|entries| entries.get("tick"))
                .map(String::as_str),
            Some("La;a()V")
        );
    }

    #[test]
    fn test_unlisted_classes_use_the_first_refmap() {
        let metadata = MixinMetadata::read("unknown-refmap.json", &[archive()]).unwrap();
        assert!(!metadata.contains("com/example/Stray"));
        assert_eq!(metadata.refmap_for("com/example/Stray"), "mod.refmap.json");

        let empty = MixinMetadata::read("unknown-refmap.json", &[Archive::new()]).unwrap();
        assert_eq!(empty.refmap_for("com/example/Stray"), "unknown-refmap.json");
    }

    #[test]
    fn test_written_configs_name_their_refmap() {
        let metadata = MixinMetadata::read("unknown-refmap.json", &[archive()]).unwrap();
        let configs: Vec<(&str, &Value)> = metadata.configs().collect();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].0, "mod.mixins.json");
        assert_eq!(configs[0].1["refmap"], "mod.mixins-refmap.json");
        assert_eq!(configs[1].1["refmap"], "extra.refmap.json");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let mut archive = Archive::new();
        archive.insert_text("broken.mixins.json", "{");
        let err = MixinMetadata::read("unknown-refmap.json", &[archive]).unwrap_err();
        assert!(err.to_string().contains("broken.mixins.json"));
    }
}
