//! Comprehensive error types for glrelease operations.
//!
//! This module defines all error types with actionable error messages and recovery suggestions.

use crate::session::{ReleaseStep, SessionStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for glrelease operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all glrelease operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Git operation errors
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Session persistence errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// History persistence errors
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// State machine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Code host (GitLab) errors
    #[error("GitLab error: {0}")]
    CodeHost(#[from] CodeHostError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Failure to start an external process at all.
///
/// A process that starts and exits non-zero is not a spawn error; its exit
/// status is returned as data.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnError {
    /// Binary not found on PATH or at the given location
    #[error("'{program}' not found")]
    NotFound {
        /// Program that was requested
        program: String,
    },

    /// Binary exists but may not be executed
    #[error("permission denied running '{program}'")]
    PermissionDenied {
        /// Program that was requested
        program: String,
    },

    /// Any other OS-level failure
    #[error("failed to run '{program}': {reason}")]
    Other {
        /// Program that was requested
        program: String,
        /// OS error text
        reason: String,
    },
}

impl SpawnError {
    /// Map an OS error from process creation
    pub fn from_io(program: &str, error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => SpawnError::NotFound {
                program: program.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied {
                program: program.to_string(),
            },
            _ => SpawnError::Other {
                program: program.to_string(),
                reason: error.to_string(),
            },
        }
    }
}

/// Git operation errors surfaced outside the state machine
#[derive(Error, Debug)]
pub enum GitError {
    /// Not a git repository
    #[error("Not a git repository: {path}")]
    NotRepository {
        /// Path that was checked
        path: PathBuf,
    },

    /// Git binary could not be located
    #[error("git binary '{binary}' not found on PATH")]
    BinaryNotFound {
        /// Binary name or path
        binary: String,
    },

    /// Process could not be spawned
    #[error("{0}")]
    Spawn(#[from] SpawnError),
}

/// Session persistence errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session file corrupted
    #[error("Session file corrupted: {reason}")]
    Corrupted {
        /// Reason for the error
        reason: String,
    },

    /// No session in progress
    #[error("No release session in progress.")]
    NotFound,

    /// Session format version mismatch
    #[error("Session file version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version
        expected: u32,
        /// Found version
        found: u32,
    },

    /// Failed to save session
    #[error("Failed to save session: {reason}")]
    SaveFailed {
        /// Reason for the error
        reason: String,
    },

    /// Failed to load session
    #[error("Failed to load session: {reason}")]
    LoadFailed {
        /// Reason for the error
        reason: String,
    },

    /// Failed to clear session
    #[error("Failed to clear session: {reason}")]
    ClearFailed {
        /// Reason for the error
        reason: String,
    },
}

/// History persistence errors
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Unknown history record
    #[error("History record '{id}' not found")]
    NotFound {
        /// Requested record id
        id: String,
    },

    /// Failed to write a history record
    #[error("Failed to write history: {reason}")]
    WriteFailed {
        /// Reason for the error
        reason: String,
    },

    /// Failed to read a history record
    #[error("Failed to read history: {reason}")]
    ReadFailed {
        /// Reason for the error
        reason: String,
    },

    /// History file could not be parsed
    #[error("History file corrupted: {reason}")]
    Corrupted {
        /// Reason for the error
        reason: String,
    },
}

/// State machine errors.
///
/// These describe commands the engine refused to execute or could not
/// record; none of them changes the caller's session.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Command not valid for the session's status
    #[error("'{command}' is not valid while the session is {status}")]
    InvalidCommand {
        /// Command that was refused
        command: String,
        /// Session status at the time
        status: SessionStatus,
    },

    /// A step has been dispatched and has not reported back
    #[error("step {step} is still in progress; only abort is accepted")]
    StepInFlight {
        /// Step that is in flight
        step: ReleaseStep,
    },

    /// Another session is already Active, Suspended or Failed
    #[error("release session {id} is already {status}; resume or abort it first")]
    SessionInProgress {
        /// Existing session id
        id: String,
        /// Existing session status
        status: SessionStatus,
    },

    /// Start request failed validation
    #[error("Invalid release request: {reason}")]
    InvalidRequest {
        /// Reason for the error
        reason: String,
    },

    /// Rollback ran, but the aborted session could not be stored or archived
    #[error("rollback ran but the aborted session was not recorded: {source}")]
    AbortNotRecorded {
        /// Rollback failures that need manual cleanup
        unrecoverable: Vec<String>,
        /// Storage failure
        source: Box<ReleaseError>,
    },
}

/// Code host errors
#[derive(Error, Debug)]
pub enum CodeHostError {
    /// Missing API token
    #[error("No GitLab token configured (set {env_var})")]
    MissingToken {
        /// Environment variable that was consulted
        env_var: String,
    },

    /// Token lacks the `api` scope
    #[error("token lacks 'api' scope - please regenerate your GitLab token with 'api' scope enabled")]
    InsufficientScope,

    /// Non-success response
    #[error("GitLab API error: status {status}, body: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Transport failure
    #[error("network error: {reason}")]
    Network {
        /// Reason for the error
        reason: String,
    },

    /// Unexpected response shape
    #[error("failed to parse response: {reason}")]
    InvalidResponse {
        /// Reason for the error
        reason: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {reason}")]
    ReadFailed {
        /// Config path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Config file could not be parsed
    #[error("Invalid config {path}: {reason}")]
    Invalid {
        /// Config path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// No usable data directory
    #[error("Could not determine a data directory; set GLRELEASE_DATA_DIR")]
    NoDataDir,
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

impl ReleaseError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::Git(GitError::BinaryNotFound { .. })
            | ReleaseError::Git(GitError::Spawn(SpawnError::NotFound { .. })) => vec![
                "Install git or set `git_binary` in the config file".to_string(),
            ],
            ReleaseError::Engine(EngineError::AbortNotRecorded { unrecoverable, .. }) => {
                let mut suggestions: Vec<String> = unrecoverable
                    .iter()
                    .map(|message| format!("Manual cleanup required: {}", message))
                    .collect();
                suggestions.push(
                    "Fix the data directory, then run glrelease abort again to record the abort"
                        .to_string(),
                );
                suggestions
            }
            ReleaseError::Engine(EngineError::SessionInProgress { .. }) => vec![
                "Show the session: glrelease status".to_string(),
                "Continue it: glrelease continue (or glrelease retry when suspended)".to_string(),
                "Discard it: glrelease abort".to_string(),
            ],
            ReleaseError::Engine(EngineError::InvalidCommand { status, .. }) => match status {
                SessionStatus::Suspended => {
                    vec!["Resolve the reported problem, then run: glrelease retry".to_string()]
                }
                SessionStatus::Failed => {
                    vec!["A failed session can only be aborted: glrelease abort".to_string()]
                }
                _ => vec!["Check the session with: glrelease status".to_string()],
            },
            ReleaseError::Session(SessionError::Corrupted { .. })
            | ReleaseError::Session(SessionError::VersionMismatch { .. }) => vec![
                "Inspect or remove the session file in the data directory".to_string(),
                "Verify the working copy manually before starting a new release".to_string(),
            ],
            ReleaseError::Session(SessionError::NotFound) => vec![
                "Start a release: glrelease start --env <env> --version <X.Y.Z> --mr <project>:<iid>:<branch>"
                    .to_string(),
            ],
            ReleaseError::Git(GitError::NotRepository { .. }) => vec![
                "Run inside the repository to release, or pass --repo <path>".to_string(),
            ],
            ReleaseError::CodeHost(CodeHostError::MissingToken { env_var }) => vec![
                format!("Export a GitLab personal access token: export {}=...", env_var),
            ],
            ReleaseError::CodeHost(CodeHostError::InsufficientScope) => vec![
                "Create a new token with the 'api' scope".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ReleaseError::Git(GitError::NotRepository { .. })
                | ReleaseError::Git(GitError::BinaryNotFound { .. })
                | ReleaseError::Session(SessionError::Corrupted { .. })
                | ReleaseError::Session(SessionError::VersionMismatch { .. })
                | ReleaseError::CodeHost(CodeHostError::InsufficientScope)
        )
    }
}
