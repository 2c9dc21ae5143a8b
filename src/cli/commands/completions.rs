//! Completions command - print a shell completion script

use crate::cli::args::Cli;
use crate::error::ScripResult;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io;

/// Write completions for `shell` to stdout
pub fn execute(shell: Shell) -> ScripResult<()> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    generate(shell, &mut command, name, &mut io::stdout());
    Ok(())
}
