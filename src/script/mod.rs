//! User scripts and the Go programs generated from them

pub mod diagnostics;
pub mod template;

pub use template::Program;

use crate::error::{ScripError, ScripResult};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Name used for argv[0] when code is passed inline
pub const INLINE_NAME: &str = "scrip";

/// A script as supplied by the user
#[derive(Debug, Clone)]
pub struct Script {
    name: String,
    body: String,
    line_offset: usize,
}

impl Script {
    /// Read a script file
    pub async fn from_file(path: &Path) -> ScripResult<Self> {
        debug!("Reading code from {}", path.display());
        let source = fs::read_to_string(path)
            .await
            .map_err(|e| ScripError::ScriptRead {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self::new(path.display().to_string(), &source))
    }

    /// Code passed on the command line
    pub fn inline(code: &str) -> Self {
        debug!("Using code from command line");
        Self::new(INLINE_NAME.to_string(), code)
    }

    fn new(name: String, source: &str) -> Self {
        let body = strip_shebang(source);
        let line_offset = usize::from(body.len() != source.len());
        Self {
            name,
            body: body.to_string(),
            line_offset,
        }
    }

    /// Path or placeholder name, passed to the program as argv[0]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source without the shebang line
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Lines removed from the top of the file before the body
    pub fn line_offset(&self) -> usize {
        self.line_offset
    }
}

/// Remove a leading `#!` line
pub fn strip_shebang(source: &str) -> &str {
    if !source.starts_with("#!") {
        return source;
    }
    match source.find('\n') {
        Some(pos) => &source[pos + 1..],
        None => "",
    }
}
