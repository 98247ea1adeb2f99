//! Annotation Resolution Engine.
//!
//! Mixin classes refer to the classes they modify by name, inside annotation
//! strings that a bytecode rewrite never touches. This module resolves those
//! names against the class hierarchy of a hop and records what they become in
//! the hop's target namespace: soft references go into a reference map read by
//! the Mixin runtime, hard references (`@Shadow`, `@Overwrite`) rename the
//! annotated members themselves.
//!
//! Work is split in two phases. Analysis collects per-class tasks without
//! resolving anything; resolution runs once every class has been collected.

mod collect;
pub mod extension;
pub mod metadata;
pub mod refmap;
pub mod registry;
mod resolve;

use serde::{Deserialize, Serialize};

pub use extension::MixinRemapExtension;
pub use metadata::MixinMetadata;
pub use refmap::{ClassEntries, RefmapStore, ReferenceMap};
pub use registry::{AnnotationRegistry, Handler, Rule, Site};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MixinOptions {
    /// Attach the mixin extension to every hop
    pub enabled: bool,
    /// Treat descriptor-less method targets as wildcards
    pub allow_implicit_wildcards: bool,
    /// Refmap file used when the input declares none
    pub default_refmap: String,
    /// Recognize MixinExtras injectors
    pub extras: bool,
}

impl Default for MixinOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_implicit_wildcards: false,
            default_refmap: "unknown-refmap.json".to_owned(),
            extras: true,
        }
    }
}
