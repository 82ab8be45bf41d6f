//! CLI module
//!
//! Command-line interface for a single pipeline run. Flags override the
//! config file; the environment fills in missing secrets.

mod commands;
mod runner;

pub use commands::{Backend, Cli, ModeArg};
pub use runner::Runner;
