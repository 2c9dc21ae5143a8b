//! Configuration schema for scrip
//!
//! Configuration is stored at `~/.config/scrip/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Build cache settings
    pub cache: CacheConfig,

    /// Go toolchain settings
    pub build: BuildConfig,
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Base directory holding the registry and compiled programs
    pub dir: Option<PathBuf>,

    /// Reclaim programs unused for more than N days (0 = disabled)
    pub gc_days: u32,

    /// Run reclamation after every `scrip run`
    pub gc_on_run: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            gc_days: 90,
            gc_on_run: false,
        }
    }
}

/// Go toolchain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Go executable
    pub go: String,

    /// goimports executable, used to fix imports when installed (empty = never)
    pub goimports: String,

    /// Module name passed to `go mod init`
    pub module: String,

    /// Import hints added to every program
    pub imports: Vec<String>,

    /// Keep the program directory when compilation fails
    pub keep_failed: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            go: "go".to_string(),
            goimports: "goimports".to_string(),
            module: "scrip".to_string(),
            imports: vec![],
            keep_failed: false,
        }
    }
}
