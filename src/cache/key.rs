//! Content-derived cache keys
//!
//! A key is the SHA256 of the generated program text, hex encoded.
//! Same program = same key, in every process.

use crate::error::{ScripError, ScripResult};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier of one cached program, safe to use as a directory name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Length of a derived key in characters
    pub const LEN: usize = 64;

    /// Derive the key for a program's content
    pub fn derive(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hex::encode(hasher.finalize()))
    }

    /// Accept an existing key (from the registry or the command line).
    ///
    /// Only ASCII alphanumerics are allowed so a key can never escape
    /// the artifact directory.
    pub fn parse(raw: &str) -> ScripResult<Self> {
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ScripError::InvalidKey(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
