//! Error kinds shared across the remapper.
//!
//! Fatal conditions are [`RemapError`] values. Problems with a single symbol
//! are never errors: they become [`SymbolWarning`]s collected in a
//! [`Diagnostics`] sink and the hop carries on.

use std::{fmt, path::PathBuf};

use log::warn;
use parking_lot::Mutex;

/// Failures that abort a remap request or a single hop.
#[derive(Debug, thiserror::Error)]
pub enum RemapError {
    #[error("no remap path from `{src}` to `{dst}`: {reason}\nnamespace adjacency:\n{adjacency}")]
    NoPath {
        src: String,
        dst: String,
        reason: String,
        adjacency: String,
    },

    #[error("ambiguous target `{symbol}`, candidates: {}", .candidates.join(", "))]
    AmbiguousTarget {
        symbol: String,
        candidates: Vec<String>,
    },

    #[error("rewrite engine failed while remapping `{from}` -> `{to}`")]
    EngineIo {
        from: String,
        to: String,
        #[source]
        source: EngineError,
    },

    #[error("namespace `{name}` is registered twice")]
    DuplicateNamespace { name: String },

    #[error("unknown namespace `{name}`")]
    UnknownNamespace { name: String },

    #[error("namespace `{namespace}` depends on unknown namespace `{dependency}`")]
    UnknownDependency {
        namespace: String,
        dependency: String,
    },

    #[error("circular namespace dependency involving `{namespace}`")]
    CyclicDependency { namespace: String },

    #[error("no root namespace: at least one namespace must have no dependencies")]
    MissingRoot,

    #[error("namespace `{name}` has no column in the mapping data, nor does any of its fallbacks")]
    UnmappedNamespace { name: String },

    #[error("{}:{line}: {message}", .path.display())]
    MappingFormat {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Failures raised by a rewrite engine while reading, transforming or
/// writing archives.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to access archive {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed archive {}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("access widener `{path}`: {message}")]
    AccessWidener { path: String, message: String },

    #[error("failed to start worker pool: {message}")]
    ThreadPool { message: String },

    #[error("{extension}: {message}")]
    Extension {
        extension: &'static str,
        message: String,
    },
}

/// Why a symbol could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// No candidate found in the class hierarchy or the known mappings
    Unresolved,
    /// More than one candidate under a must-be-unique lookup
    Ambiguous { candidates: Vec<String> },
    /// An explicit owner that is not among the mixin's target classes
    ForeignOwner,
    /// A mixin class that no mixin config lists
    UnlistedMixin,
}

/// A non-fatal, per-symbol resolution problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolWarning {
    /// Declaring class, in internal form
    pub class: String,
    /// Annotation kind, e.g. `@Inject`
    pub annotation: String,
    /// The symbolic reference as written
    pub symbol: String,
    pub kind: WarningKind,
}

impl SymbolWarning {
    /// The symbol-fatal form of an ambiguity; other kinds stay warnings
    pub fn as_error(&self) -> Option<RemapError> {
        match &self.kind {
            WarningKind::Ambiguous { candidates } => Some(RemapError::AmbiguousTarget {
                symbol: format!("{} {} in {}", self.annotation, self.symbol, self.class),
                candidates: candidates.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WarningKind::Unresolved => write!(
                f,
                "cannot resolve {} target `{}` in {}",
                self.annotation, self.symbol, self.class
            ),
            WarningKind::Ambiguous { candidates } => write!(
                f,
                "ambiguous {} target `{}` in {} (candidates: {})",
                self.annotation,
                self.symbol,
                self.class,
                candidates.join(", ")
            ),
            WarningKind::ForeignOwner => write!(
                f,
                "{} target `{}` in {} names an owner outside the mixin targets",
                self.annotation, self.symbol, self.class
            ),
            WarningKind::UnlistedMixin => write!(
                f,
                "mixin class {} is not listed in any mixin config",
                self.class
            ),
        }
    }
}

/// Thread-safe sink for warnings raised during one hop.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Mutex<Vec<SymbolWarning>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a warning
    pub fn report(&self, warning: SymbolWarning) {
        warn!("{warning}");
        self.warnings.lock().push(warning);
    }

    pub fn len(&self) -> usize {
        self.warnings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.lock().is_empty()
    }

    /// Drain everything reported so far
    pub fn take(&self) -> Vec<SymbolWarning> {
        std::mem::take(&mut *self.warnings.lock())
    }
}
