//! TOML configuration.
//!
//! ```toml
//! mappings = ["mappings/merged.tiny"]
//! patch_state = "fixed"
//!
//! [[namespaces]]
//! name = "official"
//!
//! [[namespaces]]
//! name = "intermediary"
//! deps = ["official"]
//!
//! [[namespaces]]
//! name = "named"
//! named = true
//! deps = ["intermediary"]
//!
//! [classpath]
//! namespace = "official"
//! archives = ["minecraft.json"]
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    annotations::MixinOptions,
    dirs,
    error::RemapError,
    namespace::NamespaceGraph,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceConfig {
    pub name: String,
    #[serde(default)]
    pub named: bool,
    #[serde(default)]
    pub deps: Vec<String>,
}

/// Archives available for resolution but never rewritten
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClasspathConfig {
    /// Namespace of `archives`; the root namespace when absent
    pub namespace: Option<String>,
    /// Baseline archives, remapped to each hop's source namespace
    pub archives: Vec<PathBuf>,
    /// Archives that are the same in every namespace
    pub libraries: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessWidenerConfig {
    pub ignore_namespace_mismatch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Declaration order is registration order
    pub namespaces: Vec<NamespaceConfig>,
    /// Tiny v2 files, merged in order
    pub mappings: Vec<PathBuf>,
    pub classpath: ClasspathConfig,
    pub cache_dir: Option<PathBuf>,
    /// Worker threads per hop; 0 uses one per CPU
    pub threads: usize,
    pub patch_state: Option<String>,
    pub mixin: MixinOptions,
    pub access_widener: AccessWidenerConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Make every relative path relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        self.mappings.iter_mut().for_each(resolve);
        self.classpath.archives.iter_mut().for_each(resolve);
        self.classpath.libraries.iter_mut().for_each(resolve);
        if let Some(cache_dir) = self.cache_dir.as_mut() {
            resolve(cache_dir);
        }
    }

    pub fn build_graph(&self) -> Result<NamespaceGraph, RemapError> {
        let mut builder = NamespaceGraph::builder();
        for namespace in &self.namespaces {
            let deps: Vec<&str> = namespace.deps.iter().map(String::as_str).collect();
            builder.add(&namespace.name, namespace.named, &deps);
        }
        builder.build()
    }

    /// Configured cache directory, else the platform one, else `.nsremap-cache`
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .or_else(dirs::cache_dir)
            .unwrap_or_else(|| PathBuf::from(".nsremap-cache"))
    }
}
