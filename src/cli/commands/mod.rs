//! CLI command implementations

pub mod cache;
pub mod completions;
pub mod config;
pub mod run;

pub use cache::execute as cache;
pub use completions::execute as completions;
pub use config::execute as config;
pub use run::execute as run;

use crate::cache::{ArtifactStore, Registry};
use crate::cli::args::ScriptSource;
use crate::config::{Config, ConfigManager};
use crate::error::{ScripError, ScripResult};
use crate::script::{Program, Script};

/// Open the registry and artifact store under the configured base directory
async fn open_cache(config: &Config) -> ScripResult<(Registry, ArtifactStore)> {
    let base = ConfigManager::ensure_cache_dir(config).await?;
    let registry = Registry::open(&base)?;
    Ok((registry, ArtifactStore::new(&base)))
}

/// Load the script named on the command line and generate its program
async fn load_program(source: &ScriptSource, config: &Config) -> ScripResult<(Script, Program)> {
    let script = match (&source.code, &source.script) {
        (Some(code), _) => Script::inline(code),
        (None, Some(path)) => Script::from_file(path).await?,
        (None, None) => return Err(ScripError::ScriptMissing),
    };

    let imports: Vec<String> = config
        .build
        .imports
        .iter()
        .chain(&source.imports)
        .cloned()
        .collect();

    let program = Program::new(&script, &imports);
    Ok((script, program))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_code_takes_precedence() {
        let source = ScriptSource {
            code: Some("P(1)".to_string()),
            script: Some("ignored.go".into()),
            ..Default::default()
        };
        let (script, _) = load_program(&source, &Config::default()).await.unwrap();
        assert_eq!(script.body(), "P(1)");
    }

    #[tokio::test]
    async fn config_imports_join_the_key() {
        let source = ScriptSource {
            code: Some("P(strings.ToUpper(\"x\"))".to_string()),
            ..Default::default()
        };
        let mut config = Config::default();
        let (_, plain) = load_program(&source, &config).await.unwrap();

        config.build.imports = vec!["strings".to_string()];
        let (_, hinted) = load_program(&source, &config).await.unwrap();

        assert_ne!(plain.key(), hinted.key());
        assert!(hinted.source().contains("\"strings\""));
    }

    #[tokio::test]
    async fn missing_script() {
        let err = load_program(&ScriptSource::default(), &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScripError::ScriptMissing));
    }
}
