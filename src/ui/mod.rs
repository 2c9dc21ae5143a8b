//! Terminal output for scrip commands
//!
//! Everything scrip says while running a script goes to stderr, so the
//! script's own stdout can be piped. Cache and config commands print their
//! results to stdout.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{key_value, section, step_info, step_ok, step_warn, step_warn_hint};
pub use progress::TaskSpinner;
pub use prompts::confirm;
