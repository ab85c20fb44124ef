//! # glrelease
//!
//! Resumable release runs for GitLab projects.
//!
//! A release merges a chosen set of merge requests into a release branch cut
//! from the target environment's root branch, removes excluded paths, commits,
//! pushes and opens the release merge request. Every step is persisted, so a
//! run that stops on a merge conflict, a rejected push or a GitLab error can
//! be retried after the operator fixes the cause, or aborted with the
//! repository rolled back to where it started.
//!
//! ## Features
//!
//! - **Resumable sessions**: the session is saved before and after each step
//! - **Conflict handling**: suspended merges are concluded on retry, never redone
//! - **Best-effort abort**: reset, clean and branch cleanup with a report of leftovers
//! - **History**: finished releases are archived with their full command log
//!
//! ## Usage
//!
//! ```bash
//! glrelease start --env prod --version 1.2.0 --mr group/app:17:feature/login
//! glrelease retry              # after resolving a conflict
//! glrelease abort              # roll back instead
//! glrelease history list
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cli;
pub mod codehost;
pub mod config;
pub mod engine;
pub mod error;
pub mod exclusions;
pub mod git;
pub mod history;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-export main types for public API
pub use cli::Args;
pub use codehost::{CodeHost, GitLabClient};
pub use config::Config;
pub use engine::{EngineCommand, ReleaseEngine};
pub use error::{ReleaseError, Result};
pub use git::{CliGitOperations, GitOperations};
pub use history::HistoryStore;
pub use session::{ReleaseRequest, ReleaseSession, SessionStore};
