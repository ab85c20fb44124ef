//! Core Git operations trait and outcome types for release execution.
//!
//! This module defines the GitOperations trait that specifies every git action
//! the release engine performs. The implementation over the git binary lives
//! in the git_adapter module.
//!
//! Operations never fail with an error: whatever git did is classified into a
//! [`GitOutcome`] and returned together with the list of commands that were
//! executed, so the engine's transition table is the only place that turns
//! outcomes into session state.

use crate::error::SpawnError;
use crate::git::runner::CommandOutput;
use std::future::Future;
use std::path::Path;

/// Classified result of a git operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOutcome {
    /// Command(s) succeeded
    Ok,
    /// Merge completed (including "already up to date")
    MergeOk,
    /// Merge stopped on conflicts that need a human
    MergeConflict {
        /// Conflicted paths
        paths: Vec<String>,
    },
    /// Named branch or ref does not exist
    BranchNotFound {
        /// Reference that was requested
        reference: String,
    },
    /// Nothing staged to commit (a success)
    NothingToCommit,
    /// Remote refused the update; never retried automatically
    PushRejected {
        /// Git's explanation
        reason: String,
    },
    /// Working tree has local modifications
    DirtyWorkingTree {
        /// `git status --porcelain` lines
        entries: Vec<String>,
    },
    /// Git ran and failed in a way that needs no human decision to classify
    GitError {
        /// Short failure message
        message: String,
        /// Exit code, if any
        exit_code: Option<i32>,
    },
    /// Git could not be started
    SpawnError(SpawnError),
    /// Reset/clean failed during abort; the tree may be dirty
    UnrecoverableState {
        /// Short failure message
        message: String,
    },
}

impl GitOutcome {
    /// Whether the operation should be treated as successful
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            GitOutcome::Ok | GitOutcome::MergeOk | GitOutcome::NothingToCommit
        )
    }

    /// Short label for logs and output
    pub fn label(&self) -> &'static str {
        match self {
            GitOutcome::Ok => "ok",
            GitOutcome::MergeOk => "merge ok",
            GitOutcome::MergeConflict { .. } => "merge conflict",
            GitOutcome::BranchNotFound { .. } => "branch not found",
            GitOutcome::NothingToCommit => "nothing to commit",
            GitOutcome::PushRejected { .. } => "push rejected",
            GitOutcome::DirtyWorkingTree { .. } => "dirty working tree",
            GitOutcome::GitError { .. } => "git error",
            GitOutcome::SpawnError(_) => "spawn error",
            GitOutcome::UnrecoverableState { .. } => "unrecoverable state",
        }
    }

    /// Human readable description, including details
    pub fn describe(&self) -> String {
        match self {
            GitOutcome::MergeConflict { paths } => {
                format!("merge conflict in {}", paths.join(", "))
            }
            GitOutcome::BranchNotFound { reference } => format!("'{}' not found", reference),
            GitOutcome::PushRejected { reason } => format!("push rejected: {}", reason),
            GitOutcome::DirtyWorkingTree { entries } => {
                format!("working tree has {} local change(s)", entries.len())
            }
            GitOutcome::GitError { message, .. } => message.clone(),
            GitOutcome::SpawnError(e) => e.to_string(),
            GitOutcome::UnrecoverableState { message } => {
                format!("{} (manual cleanup required)", message)
            }
            other => other.label().to_string(),
        }
    }
}

/// One git command that was executed, with its own classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    /// Command line as displayed to the operator
    pub command: String,
    /// Outcome of this command alone
    pub outcome: GitOutcome,
    /// Captured output, or why the process never started
    pub result: Result<CommandOutput, SpawnError>,
}

impl ExecutedCommand {
    /// Output text for log excerpts
    pub fn output_text(&self) -> String {
        match &self.result {
            Ok(output) => output.combined(),
            Err(e) => e.to_string(),
        }
    }
}

/// Result of one git operation: its outcome, an optional value and the
/// commands that produced them
#[derive(Debug, Clone)]
pub struct GitReport<T = ()> {
    /// Overall outcome
    pub outcome: GitOutcome,
    /// Value produced on success
    pub value: Option<T>,
    /// Every command issued, in order
    pub commands: Vec<ExecutedCommand>,
}

impl<T> GitReport<T> {
    /// Report with an outcome and no value
    pub fn new(outcome: GitOutcome, commands: Vec<ExecutedCommand>) -> Self {
        Self {
            outcome,
            value: None,
            commands,
        }
    }

    /// Attach a value
    pub fn with_value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    /// Whether the outcome is a success
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Trait defining all git operations needed to execute a release
pub trait GitOperations {
    /// Repository working directory
    fn workdir(&self) -> &Path;

    /// `git status --porcelain` lines (value: entries)
    fn status_porcelain(&self) -> impl Future<Output = GitReport<Vec<String>>>;

    /// Name of the checked-out branch
    fn current_branch(&self) -> impl Future<Output = GitReport<String>>;

    /// Full SHA of HEAD
    fn head_commit(&self) -> impl Future<Output = GitReport<String>>;

    /// Fetch from a remote
    fn fetch(&self, remote: &str) -> impl Future<Output = GitReport>;

    /// Check out an existing branch
    fn checkout(&self, branch: &str) -> impl Future<Output = GitReport>;

    /// Check out `branch`, discarding local changes; failure is `UnrecoverableState`
    fn force_checkout(&self, branch: &str) -> impl Future<Output = GitReport>;

    /// Detach HEAD at `commit`, discarding local changes; failure is `UnrecoverableState`
    fn detach_head(&self, commit: &str) -> impl Future<Output = GitReport>;

    /// Create (or reset) a branch at `start_point` and check it out
    fn create_branch(&self, name: &str, start_point: &str) -> impl Future<Output = GitReport>;

    /// Merge `branch` into the current branch with a merge commit
    fn merge(&self, branch: &str, message: &str) -> impl Future<Output = GitReport>;

    /// Whether a merge is waiting to be concluded (MERGE_HEAD exists)
    fn merge_in_progress(&self) -> impl Future<Output = GitReport<bool>>;

    /// Paths with unresolved conflicts
    fn unmerged_paths(&self) -> impl Future<Output = GitReport<Vec<String>>>;

    /// Commit a merge whose conflicts were resolved by the operator
    fn conclude_merge(&self) -> impl Future<Output = GitReport>;

    /// Abandon an in-progress merge
    fn abort_merge(&self) -> impl Future<Output = GitReport>;

    /// Tracked and untracked-but-not-ignored files at or below `paths`
    fn release_files(&self, paths: &[String]) -> impl Future<Output = GitReport<Vec<String>>>;

    /// Remove paths from the index and working tree
    fn remove_paths(&self, paths: &[String]) -> impl Future<Output = GitReport>;

    /// Stage everything and commit; `NothingToCommit` when the tree is unchanged
    fn commit_all(&self, message: &str) -> impl Future<Output = GitReport>;

    /// Push `branch` to `remote`, setting upstream
    fn push(&self, remote: &str, branch: &str) -> impl Future<Output = GitReport>;

    /// Hard reset to `reference`; failure is `UnrecoverableState`
    fn reset_hard(&self, reference: &str) -> impl Future<Output = GitReport>;

    /// Remove untracked files and directories; failure is `UnrecoverableState`
    fn clean(&self) -> impl Future<Output = GitReport>;

    /// Force-delete a local branch
    fn delete_branch(&self, name: &str) -> impl Future<Output = GitReport>;
}
