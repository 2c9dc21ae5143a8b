//! Configuration management for scrip

pub mod schema;

pub use schema::Config;

use crate::error::{ScripError, ScripResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Overrides `cache.dir`
pub const ENV_PATH: &str = "SCRIP_PATH";

/// Overrides `cache.gc_days`
pub const ENV_CLEANUP_DAYS: &str = "SCRIP_CLEANUP_DAYS";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scrip")
            .join("config.toml")
    }

    /// Get the default cache base directory
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scrip")
    }

    /// Resolve the cache base directory for a loaded config
    pub fn cache_dir(config: &Config) -> PathBuf {
        config
            .cache
            .dir
            .clone()
            .unwrap_or_else(Self::default_cache_dir)
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> ScripResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration and apply environment overrides
    pub async fn load_with_env(&self) -> ScripResult<Config> {
        let mut config = self.load().await?;
        self.apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> ScripResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ScripError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| ScripError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply `SCRIP_PATH` / `SCRIP_CLEANUP_DAYS` on top of file settings
    pub fn apply_overrides<F>(&self, config: &mut Config, lookup: F) -> ScripResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_PATH).filter(|d| !d.is_empty()) {
            debug!("Cache directory overridden by {}: {}", ENV_PATH, dir);
            config.cache.dir = Some(PathBuf::from(dir));
        }

        if let Some(days) = lookup(ENV_CLEANUP_DAYS) {
            config.cache.gc_days = days.trim().parse().map_err(|_| ScripError::ConfigInvalid {
                path: self.config_path.clone(),
                reason: format!("{} ({}) is not a number of days", ENV_CLEANUP_DAYS, days),
            })?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> ScripResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            ScripError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> ScripResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ScripError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure the cache base directory exists with owner-only permissions
    pub async fn ensure_cache_dir(config: &Config) -> ScripResult<PathBuf> {
        let dir = Self::cache_dir(config);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ScripError::io(format!("creating directory {}", dir.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&dir, perms)
                .map_err(|e| ScripError::io("setting cache dir permissions", e))?;
        }

        Ok(dir)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
