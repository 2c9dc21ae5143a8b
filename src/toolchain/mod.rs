//! Toolchain abstraction
//!
//! Builds run while the caller holds the key's write lease; executions run
//! while it holds a read lease. Implementations never touch the registry.

pub mod go;

pub use go::GoToolchain;

use crate::error::{ScripError, ScripResult};
use crate::script::Program;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Compiler and launcher for generated programs
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Compile `program` into `dir`, leaving the executable at
    /// `dir/`[`BINARY_NAME`](crate::cache::store::BINARY_NAME)
    async fn build(&self, program: &Program, dir: &Path) -> ScripResult<()>;

    /// Run a compiled program with inherited stdio and return its exit code
    async fn execute(&self, binary: &Path, argv0: &str, args: &[String]) -> ScripResult<i32> {
        run_binary(binary, argv0, args).await
    }

    /// Human-readable toolchain name for display
    fn name(&self) -> &'static str;
}

/// Spawn `binary` attached to the terminal and wait for it.
///
/// Ctrl-C reaches the child directly (same process group); scrip keeps
/// waiting so that the caller's lease is released after the child exits.
pub async fn run_binary(binary: &Path, argv0: &str, args: &[String]) -> ScripResult<i32> {
    debug!("Executing {} with args {:?}", binary.display(), args);

    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    #[cfg(unix)]
    command.arg0(argv0);
    #[cfg(not(unix))]
    let _ = argv0;

    let mut child = command
        .spawn()
        .map_err(|e| ScripError::command_failed(binary.display().to_string(), e))?;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            interrupt = tokio::signal::ctrl_c() => {
                if interrupt.is_err() {
                    break child.wait().await;
                }
                debug!("Interrupt received, waiting for program to exit");
            }
        }
    }
    .map_err(|e| ScripError::command_failed(binary.display().to_string(), e))?;

    status.code().ok_or(ScripError::ProcessSignaled)
}
