//! Go toolchain
//!
//! A build runs these steps inside the artifact directory:
//!
//! 1. `go mod init <module>`
//! 2. write `main.go`
//! 3. `goimports -w main.go` (skipped when goimports is not installed)
//! 4. `go mod tidy`
//! 5. `go build -o program`

use crate::cache::store::BINARY_NAME;
use crate::config::schema::BuildConfig;
use crate::error::{ScripError, ScripResult};
use crate::script::{diagnostics, Program};
use crate::toolchain::Toolchain;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

const SOURCE_FILE: &str = "main.go";

/// Builds programs with the `go` command
#[derive(Debug, Clone)]
pub struct GoToolchain {
    go: String,
    goimports: Option<String>,
    module: String,
}

impl GoToolchain {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            go: config.go.clone(),
            goimports: (!config.goimports.is_empty()).then(|| config.goimports.clone()),
            module: config.module.clone(),
        }
    }

    /// Check if the go command is installed
    pub async fn is_installed(&self) -> bool {
        Command::new(&self.go)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Run one build step, capturing its output
    async fn step(
        &self,
        dir: &Path,
        program: &Program,
        tool: &str,
        args: &[&str],
    ) -> ScripResult<()> {
        let step = format!("{} {}", tool, args.join(" "));
        debug!("Executing: {}", step);

        let output = Command::new(tool)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ScripError::ToolchainNotFound {
                    name: tool.to_string(),
                },
                _ => ScripError::command_failed(step.clone(), e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("{} stdout:\n{}", step, stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            debug!("{} stderr:\n{}", step, stderr.trim_end());
        }

        if output.status.success() {
            return Ok(());
        }

        let output = diagnostics::render_all(program.source(), &stderr, program.line_offset())
            .unwrap_or_else(|| {
                let raw = if stderr.trim().is_empty() { &stdout } else { &stderr };
                raw.trim_end().to_string()
            });
        Err(ScripError::CompileFailed { step, output })
    }

    async fn format_imports(&self, dir: &Path, program: &Program) -> ScripResult<()> {
        let Some(goimports) = &self.goimports else {
            return Ok(());
        };
        match self.step(dir, program, goimports, &["-w", SOURCE_FILE]).await {
            Err(ScripError::ToolchainNotFound { name }) => {
                debug!("{} not installed, imports left as written", name);
                Ok(())
            }
            other => other,
        }
    }
}

#[async_trait]
impl Toolchain for GoToolchain {
    async fn build(&self, program: &Program, dir: &Path) -> ScripResult<()> {
        info!("Building program {}", program.key().short());

        fs::create_dir_all(dir)
            .await
            .map_err(|e| ScripError::io(format!("creating {}", dir.display()), e))?;

        self.step(dir, program, &self.go, &["mod", "init", self.module.as_str()])
            .await?;

        let source = dir.join(SOURCE_FILE);
        fs::write(&source, program.source())
            .await
            .map_err(|e| ScripError::io(format!("writing {}", source.display()), e))?;

        self.format_imports(dir, program).await?;
        self.step(dir, program, &self.go, &["mod", "tidy"]).await?;
        self.step(dir, program, &self.go, &["build", "-o", BINARY_NAME])
            .await?;

        debug!("Built {}", dir.join(BINARY_NAME).display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "go"
    }
}
