//! Content-addressed store of hop outputs.
//!
//! An artifact is identified by everything that can change its content: the
//! namespace pair and patch state, the input bytes, the mapping data, the
//! classpath and the hop settings. Artifacts are written to a temporary file inside the store and
//! renamed into place, so a lookup never observes a partial write.

use std::{
    fmt, fs,
    io::Read,
    path::{Path, PathBuf},
};

use log::trace;
use sha2::{Digest, Sha256};

use crate::error::EngineError;

/// What a hop remaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HopKind {
    /// The caller's archive
    Input,
    /// A baseline classpath archive, derived for another namespace
    Classpath,
}

impl HopKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Classpath => "classpath",
        }
    }
}

impl fmt::Display for HopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-meaningful part of an artifact's identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactCoordinate {
    pub to: String,
    pub from: String,
    pub patch_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub coordinate: ArtifactCoordinate,
    pub input_hash: String,
    pub mapping_fingerprint: String,
    pub classpath_fingerprint: String,
    /// Extension and resource remapper options in effect for the hop
    pub settings_fingerprint: String,
    pub kind: HopKind,
}

impl ArtifactKey {
    pub fn digest(&self) -> String {
        digest_parts([
            self.coordinate.to.as_str(),
            self.coordinate.from.as_str(),
            self.coordinate.patch_state.as_deref().unwrap_or_default(),
            self.input_hash.as_str(),
            self.mapping_fingerprint.as_str(),
            self.classpath_fingerprint.as_str(),
            self.settings_fingerprint.as_str(),
            self.kind.as_str(),
        ])
    }

    /// `<from>-<to>[-<patch>]-<kind>-<digest>.json`
    pub fn file_name(&self) -> String {
        let coordinate = &self.coordinate;
        let patch = coordinate
            .patch_state
            .as_deref()
            .map(|patch| format!("-{patch}"))
            .unwrap_or_default();
        format!(
            "{}-{}{patch}-{}-{}.json",
            coordinate.from,
            coordinate.to,
            self.kind,
            self.digest()
        )
    }
}

/// SHA-256 over length-delimited parts, as lowercase hex
pub fn digest_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a file's bytes, as lowercase hex
pub fn content_hash(path: &Path) -> Result<String, EngineError> {
    let io_error = |source: std::io::Error| EngineError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::open(path).map_err(io_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(io_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Copy `source` to `target` through a temporary file next to `target`
pub fn copy_atomic(source: &Path, target: &Path) -> Result<(), EngineError> {
    let directory = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".nsremap-")
        .suffix(".tmp")
        .tempfile_in(directory)
        .map_err(|source| EngineError::Io {
            path: directory.to_path_buf(),
            source,
        })?;
    fs::copy(source, temp.path()).map_err(|err| EngineError::Io {
        path: source.to_path_buf(),
        source: err,
    })?;
    temp.persist(target).map_err(|err| EngineError::Io {
        path: target.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// The published artifact for `key`, if any
    pub fn lookup(&self, key: &ArtifactKey) -> Option<PathBuf> {
        let path = self.path_of(key);
        path.is_file().then_some(path)
    }

    /// Produce the artifact for `key` with `write` and publish it.
    ///
    /// `write` receives a temporary path inside the store. When it fails the
    /// temporary file is removed and nothing is published.
    pub fn publish(
        &self,
        key: &ArtifactKey,
        write: impl FnOnce(&Path) -> Result<(), EngineError>,
    ) -> Result<PathBuf, EngineError> {
        fs::create_dir_all(&self.root).map_err(|source| EngineError::Io {
            path: self.root.clone(),
            source,
        })?;
        let temp = tempfile::Builder::new()
            .prefix(".artifact-")
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(|source| EngineError::Io {
                path: self.root.clone(),
                source,
            })?;
        trace!("Writing artifact through {}", temp.path().display());
        write(temp.path())?;

        let target = self.path_of(key);
        temp.persist(&target).map_err(|err| EngineError::Io {
            path: target.clone(),
            source: err.error,
        })?;
        Ok(target)
    }
}
