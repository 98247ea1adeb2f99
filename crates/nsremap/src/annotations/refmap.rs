//! Reference map documents and the per-hop store that accumulates them.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Symbolic reference -> concrete reference, for one mixin class
pub type ClassEntries = BTreeMap<String, String>;

/// The `*refmap*.json` document read by the Mixin runtime
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferenceMap {
    #[serde(default)]
    pub mappings: BTreeMap<String, ClassEntries>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.values().all(BTreeMap::is_empty)
    }

    /// Number of entries over all classes
    pub fn len(&self) -> usize {
        self.mappings.values().map(BTreeMap::len).sum()
    }

    pub fn class(&self, class: &str) -> Option<&ClassEntries> {
        self.mappings.get(class)
    }

    pub fn get(&self, class: &str, key: &str) -> Option<&str> {
        self.mappings
            .get(class)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    pub fn extend(&mut self, class: &str, entries: ClassEntries) {
        if entries.is_empty() {
            return;
        }
        self.mappings
            .entry(class.to_owned())
            .or_default()
            .extend(entries);
    }
}

/// Reference maps produced during one hop, keyed by file name
#[derive(Debug, Default)]
pub struct RefmapStore {
    files: Mutex<BTreeMap<String, ReferenceMap>>,
}

impl RefmapStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, file: &str, class: &str, entries: ClassEntries) {
        if entries.is_empty() {
            return;
        }
        self.files
            .lock()
            .entry(file.to_owned())
            .or_default()
            .extend(class, entries);
    }

    pub fn clear(&self) {
        self.files.lock().clear();
    }

    /// Non-empty reference maps
    pub fn snapshot(&self) -> BTreeMap<String, ReferenceMap> {
        self.files
            .lock()
            .iter()
            .filter(|(_, refmap)| !refmap.is_empty())
            .map(|(file, refmap)| (file.clone(), refmap.clone()))
            .collect()
    }
}
