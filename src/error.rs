//! Error types for scrip
//!
//! All modules use `ScripResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for scrip operations
pub type ScripResult<T> = Result<T, ScripError>;

/// All errors that can occur in scrip
#[derive(Error, Debug)]
pub enum ScripError {
    // Cache errors
    #[error("Program {key} is locked by another process")]
    LockContention { key: String },

    #[error("Cache registry unavailable: {context}")]
    RegistryUnavailable {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Cache integrity violation for {key}: {reason}")]
    ArtifactIntegrityViolation { key: String, reason: String },

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    // Script errors
    #[error("No script given. Pass a script file or inline code with -c")]
    ScriptMissing,

    #[error("Failed to read script {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Toolchain errors
    #[error("Required tool not found: {name}")]
    ToolchainNotFound { name: String },

    #[error("Compilation failed during `{step}`:\n{output}")]
    CompileFailed { step: String, output: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process terminated by signal")]
    ProcessSignaled,

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    User(String),
}

impl ScripError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a registry error with context
    pub fn registry(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::RegistryUnavailable {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a lock contention error for a key
    pub fn contention(key: impl Into<String>) -> Self {
        Self::LockContention { key: key.into() }
    }

    /// Whether another process holds an incompatible lease.
    ///
    /// Contention is an expected outcome; callers decide whether to retry.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::LockContention { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::LockContention { .. } => {
                Some("Program is already being built elsewhere, try again")
            }
            Self::RegistryUnavailable { .. } => {
                Some("Check that the cache directory is writable (SCRIP_PATH)")
            }
            Self::ArtifactIntegrityViolation { .. } => Some("Run: scrip cache verify"),
            Self::ToolchainNotFound { .. } => Some("Install Go from https://go.dev/dl"),
            Self::ScriptMissing => Some("Run: scrip run --help"),
            _ => None,
        }
    }
}
