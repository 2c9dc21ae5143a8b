//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{ScripError, ScripResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

/// Keys accepted by `scrip config set`
const VALID_KEYS: &[&str] = &[
    "general.verbose",
    "cache.dir",
    "cache.gc_days",
    "cache.gc_on_run",
    "build.go",
    "build.goimports",
    "build.module",
    "build.imports",
    "build.keep_failed",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> ScripResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> ScripResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> ScripResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok(
        &ctx,
        &format!("Configuration initialized at {}", path.display()),
    );

    Ok(())
}

async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> ScripResult<()> {
    let ctx = UiContext::detect();

    // Edit the file as written; environment overrides must not be persisted
    let mut config = manager.load().await?;
    apply_setting(&mut config, key, value)?;

    manager.save(&config).await?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));

    Ok(())
}

/// Set one dot-separated key on a config
fn apply_setting(config: &mut Config, key: &str, value: &str) -> ScripResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "verbose"] => config.general.verbose = parse_bool(value)?,

        ["cache", "dir"] => {
            config.cache.dir = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        ["cache", "gc_days"] => config.cache.gc_days = parse_u32(value)?,
        ["cache", "gc_on_run"] => config.cache.gc_on_run = parse_bool(value)?,

        ["build", "go"] => config.build.go = value.to_string(),
        ["build", "goimports"] => {
            config.build.goimports = match value {
                "none" => String::new(),
                tool => tool.to_string(),
            };
        }
        ["build", "module"] => config.build.module = value.to_string(),
        ["build", "imports"] => {
            config.build.imports = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        ["build", "keep_failed"] => config.build.keep_failed = parse_bool(value)?,

        _ => {
            return Err(ScripError::User(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> ScripResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ScripError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_u32(value: &str) -> ScripResult<u32> {
    value
        .parse()
        .map_err(|_| ScripError::User(format!("Invalid number: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sets_known_keys() {
        let mut config = Config::default();
        apply_setting(&mut config, "cache.gc_days", "14").unwrap();
        apply_setting(&mut config, "cache.gc_on_run", "yes").unwrap();
        apply_setting(&mut config, "build.imports", "strings, j encoding/json,").unwrap();
        apply_setting(&mut config, "build.goimports", "none").unwrap();

        assert_eq!(config.cache.gc_days, 14);
        assert!(config.cache.gc_on_run);
        assert_eq!(config.build.imports, vec!["strings", "j encoding/json"]);
        assert!(config.build.goimports.is_empty());
    }

    #[test]
    fn rejects_unknown_key_and_bad_values() {
        let mut config = Config::default();
        assert!(apply_setting(&mut config, "cache.size", "1").is_err());
        assert!(apply_setting(&mut config, "cache.gc_days", "-1").is_err());
        assert!(apply_setting(&mut config, "build.keep_failed", "maybe").is_err());
        assert_eq!(config.cache.gc_days, 90);
    }

    #[tokio::test]
    async fn set_persists_to_file() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("config.toml"));

        set_value(&manager, "build.module", "tools").await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.build.module, "tools");
        assert_eq!(loaded.cache.gc_days, 90);
    }
}
