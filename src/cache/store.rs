//! On-disk program directories, one per cache key
//!
//! A directory is written only by the holder of the key's write lease and
//! read only by holders of a read lease. The lease discipline, not file
//! permissions, is what keeps readers away from half-built programs.

use crate::cache::key::CacheKey;
use crate::cache::registry::Registry;
use crate::error::{ScripError, ScripResult};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the compiled program inside an artifact directory
pub const BINARY_NAME: &str = "program";

/// State of a key's artifact directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    /// No directory
    Absent,
    /// Directory without a compiled program (failed build kept for inspection)
    Partial,
    /// Compiled program present
    Built,
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Partial => write!(f, "partial"),
            Self::Built => write!(f, "built"),
        }
    }
}

/// Directory holding every artifact
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `<base_dir>/artifacts`
    pub fn new(base_dir: &Path) -> Self {
        Self {
            root: base_dir.join("artifacts"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact directory for a key
    pub fn dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Compiled program path for a key
    pub fn binary(&self, key: &CacheKey) -> PathBuf {
        self.dir(key).join(BINARY_NAME)
    }

    /// Inspect the artifact for a key
    pub fn state(&self, key: &CacheKey) -> ScripResult<ArtifactState> {
        let dir = self.dir(key);
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ScripError::ArtifactIntegrityViolation {
                    key: key.to_string(),
                    reason: format!("{} is not a directory", dir.display()),
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ArtifactState::Absent),
            Err(e) => return Err(ScripError::io(format!("inspecting {}", dir.display()), e)),
        }

        if self.binary(key).is_file() {
            Ok(ArtifactState::Built)
        } else {
            Ok(ArtifactState::Partial)
        }
    }

    /// Remove a key's directory; a missing directory is not an error
    pub fn remove(&self, key: &CacheKey) -> ScripResult<()> {
        let dir = self.dir(key);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Removed artifact directory {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScripError::io(format!("removing {}", dir.display()), e)),
        }
    }

    /// Keys of every artifact directory present on disk
    pub fn keys(&self) -> ScripResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(ScripError::io(format!("reading {}", self.root.display()), e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| ScripError::io(format!("reading {}", self.root.display()), e))?;
            if entry.path().is_dir() {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Artifact directories with no registry row.
    ///
    /// These are reported, never repaired: an orphan means something
    /// removed a row without going through a write lease.
    pub fn verify(&self, registry: &Registry) -> ScripResult<Vec<ScripError>> {
        let known: HashSet<String> = registry
            .list()?
            .into_iter()
            .map(|entry| entry.key.to_string())
            .collect();

        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| !known.contains(key))
            .map(|key| {
                let reason = format!("{} has no registry entry", self.root.join(&key).display());
                ScripError::ArtifactIntegrityViolation { key, reason }
            })
            .collect())
    }
}
