//! Command line interface for glrelease.
//!
//! Parses arguments, loads configuration, wires the release engine to the
//! real git binary and GitLab, and reports session state to the operator.

mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, HistoryCommand, RuntimeConfig, parse_merge_request};
pub use commands::execute_command;
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
