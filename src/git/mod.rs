//! Git operations for release workflows.
//!
//! This module drives the git command line: a [`CommandRunner`] executes the
//! processes, the classifier turns their output into [`GitOutcome`]s, and
//! [`CliGitOperations`] composes both into the named operations the release
//! engine uses.

pub mod classify;
mod git_adapter;
mod operations;
mod runner;

pub use git_adapter::CliGitOperations;
pub use operations::{ExecutedCommand, GitOperations, GitOutcome, GitReport};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
