//! Scrip - Go scripts without the ceremony
//!
//! Wraps Go snippets into programs, compiles each distinct program once
//! into a cache shared by every scrip process, and runs the cached binary.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod script;
pub mod toolchain;
pub mod ui;

pub use error::{ScripError, ScripResult};
