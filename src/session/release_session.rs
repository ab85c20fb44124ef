//! Release session tracking and serialization.

use crate::error::EngineError;
use crate::git::{ExecutedCommand, GitOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current version of the session file format
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// Maximum number of output lines kept per log entry
const EXCERPT_MAX_LINES: usize = 40;

/// Deployment environment; each one releases from a fixed root branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    /// Development (`develop`)
    Develop,
    /// Testing (`testing`)
    Test,
    /// Staging (`stable`)
    Stage,
    /// Production (`master`)
    Prod,
}

impl Environment {
    /// All environments in promotion order
    pub const ALL: [Environment; 4] = [
        Environment::Develop,
        Environment::Test,
        Environment::Stage,
        Environment::Prod,
    ];

    /// Root branch the release branch is cut from
    pub fn root_branch(self) -> &'static str {
        match self {
            Environment::Develop => "develop",
            Environment::Test => "testing",
            Environment::Stage => "stable",
            Environment::Prod => "master",
        }
    }

    /// Lower-case short name used in tags and branch names
    pub fn slug(self) -> &'static str {
        match self {
            Environment::Develop => "develop",
            Environment::Test => "test",
            Environment::Stage => "stage",
            Environment::Prod => "prod",
        }
    }

    /// Upper-case display name
    pub fn name(self) -> &'static str {
        match self {
            Environment::Develop => "DEVELOP",
            Environment::Test => "TEST",
            Environment::Stage => "STAGE",
            Environment::Prod => "PROD",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Environment::ALL
            .into_iter()
            .find(|env| env.name().eq_ignore_ascii_case(s) || env.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown environment '{}' (expected one of DEVELOP, TEST, STAGE, PROD)",
                    s
                )
            })
    }
}

/// Merge request selected for the release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestRef {
    /// GitLab project id (numeric id or URL-encoded path)
    pub project_id: String,
    /// Source branch merged into the release
    pub source_branch: String,
    /// Target branch of the merge request
    pub target_branch: String,
    /// Project-scoped merge request number
    pub iid: u64,
    /// Merge request title
    pub title: String,
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Steps are being executed
    Active,
    /// Waiting for the operator before `retry`
    Suspended,
    /// Release MR created
    Completed,
    /// Rolled back by the operator
    Aborted,
    /// A step failed; only abort is possible
    Failed,
}

impl SessionStatus {
    /// Completed or Aborted
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Suspended => "suspended",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Step of the release pipeline.
///
/// Variant order is pipeline order, so the derived ordering can be used to
/// check that a session only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReleaseStep {
    /// Record the starting point
    Init,
    /// Fetch and check out the root branch
    CheckoutRoot,
    /// Create the release branch from the remote root branch
    CreateReleaseBranch,
    /// Merge one selected merge request
    MergeBranch {
        /// Position in `merge_requests`
        index: usize,
    },
    /// Remove excluded paths
    ApplyExclusions,
    /// Commit the release
    Commit,
    /// Push the release branch
    Push,
    /// Open the release merge request
    CreateRemoteMr,
    /// Nothing left to run
    Done,
}

impl ReleaseStep {
    /// Step following this one for a release with `merge_count` merge requests
    pub fn next(self, merge_count: usize) -> ReleaseStep {
        match self {
            ReleaseStep::Init => ReleaseStep::CheckoutRoot,
            ReleaseStep::CheckoutRoot => ReleaseStep::CreateReleaseBranch,
            ReleaseStep::CreateReleaseBranch if merge_count > 0 => {
                ReleaseStep::MergeBranch { index: 0 }
            }
            ReleaseStep::CreateReleaseBranch => ReleaseStep::ApplyExclusions,
            ReleaseStep::MergeBranch { index } if index + 1 < merge_count => {
                ReleaseStep::MergeBranch { index: index + 1 }
            }
            ReleaseStep::MergeBranch { .. } => ReleaseStep::ApplyExclusions,
            ReleaseStep::ApplyExclusions => ReleaseStep::Commit,
            ReleaseStep::Commit => ReleaseStep::Push,
            ReleaseStep::Push => ReleaseStep::CreateRemoteMr,
            ReleaseStep::CreateRemoteMr | ReleaseStep::Done => ReleaseStep::Done,
        }
    }
}

impl fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseStep::Init => write!(f, "init"),
            ReleaseStep::CheckoutRoot => write!(f, "checkout root"),
            ReleaseStep::CreateReleaseBranch => write!(f, "create release branch"),
            ReleaseStep::MergeBranch { index } => write!(f, "merge branch #{}", index + 1),
            ReleaseStep::ApplyExclusions => write!(f, "apply exclusions"),
            ReleaseStep::Commit => write!(f, "commit"),
            ReleaseStep::Push => write!(f, "push"),
            ReleaseStep::CreateRemoteMr => write!(f, "create release MR"),
            ReleaseStep::Done => write!(f, "done"),
        }
    }
}

/// Why a session is waiting for the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuspendReason {
    /// Merge of `branch` stopped on conflicts
    MergeConflict {
        /// Source branch being merged
        branch: String,
        /// Conflicted paths
        paths: Vec<String>,
    },
    /// Remote refused the push
    PushRejected {
        /// Git's explanation
        reason: String,
    },
    /// Code host call failed
    RemoteMergeRequest {
        /// Error text
        error: String,
    },
    /// Process exited while the step was running
    Interrupted {
        /// Step that was in flight
        step: ReleaseStep,
    },
}

impl SuspendReason {
    /// Operator-facing explanation
    pub fn describe(&self) -> String {
        match self {
            SuspendReason::MergeConflict { branch, paths } => format!(
                "merge of '{}' has conflicts in: {}",
                branch,
                paths.join(", ")
            ),
            SuspendReason::PushRejected { reason } => format!(
                "push was rejected ({}); fetch and reconcile the release branch, then retry",
                reason
            ),
            SuspendReason::RemoteMergeRequest { error } => {
                format!("creating the release merge request failed: {}", error)
            }
            SuspendReason::Interrupted { step } => {
                format!("interrupted while running '{}'; check the working tree, then retry", step)
            }
        }
    }
}

/// Persisted outcome of one logged command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogOutcome {
    /// Command succeeded
    Ok,
    /// Merge succeeded
    MergeOk,
    /// Merge conflicted
    MergeConflict {
        /// Conflicted paths
        paths: Vec<String>,
    },
    /// Reference missing
    BranchNotFound {
        /// Requested reference
        reference: String,
    },
    /// Commit had nothing to record
    NothingToCommit,
    /// Push refused
    PushRejected {
        /// Git's explanation
        reason: String,
    },
    /// Local modifications present
    DirtyWorkingTree {
        /// Porcelain status lines
        entries: Vec<String>,
    },
    /// Git failed
    GitError {
        /// Failure message
        message: String,
        /// Exit code, if any
        exit_code: Option<i32>,
    },
    /// Process could not be started
    SpawnError {
        /// Failure message
        message: String,
    },
    /// Abort could not restore the working tree
    UnrecoverableState {
        /// Failure message
        message: String,
    },
    /// Release merge request created
    MergeRequestCreated {
        /// Web URL of the merge request
        url: String,
    },
    /// Code host call failed
    RemoteError {
        /// Failure message
        message: String,
    },
}

impl LogOutcome {
    /// Whether the logged command succeeded
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            LogOutcome::Ok
                | LogOutcome::MergeOk
                | LogOutcome::NothingToCommit
                | LogOutcome::MergeRequestCreated { .. }
        )
    }

    /// Short label
    pub fn label(&self) -> &'static str {
        match self {
            LogOutcome::Ok => "ok",
            LogOutcome::MergeOk => "merge ok",
            LogOutcome::MergeConflict { .. } => "merge conflict",
            LogOutcome::BranchNotFound { .. } => "branch not found",
            LogOutcome::NothingToCommit => "nothing to commit",
            LogOutcome::PushRejected { .. } => "push rejected",
            LogOutcome::DirtyWorkingTree { .. } => "dirty working tree",
            LogOutcome::GitError { .. } => "git error",
            LogOutcome::SpawnError { .. } => "spawn error",
            LogOutcome::UnrecoverableState { .. } => "unrecoverable state",
            LogOutcome::MergeRequestCreated { .. } => "merge request created",
            LogOutcome::RemoteError { .. } => "remote error",
        }
    }
}

impl From<&GitOutcome> for LogOutcome {
    fn from(outcome: &GitOutcome) -> Self {
        match outcome {
            GitOutcome::Ok => LogOutcome::Ok,
            GitOutcome::MergeOk => LogOutcome::MergeOk,
            GitOutcome::MergeConflict { paths } => LogOutcome::MergeConflict {
                paths: paths.clone(),
            },
            GitOutcome::BranchNotFound { reference } => LogOutcome::BranchNotFound {
                reference: reference.clone(),
            },
            GitOutcome::NothingToCommit => LogOutcome::NothingToCommit,
            GitOutcome::PushRejected { reason } => LogOutcome::PushRejected {
                reason: reason.clone(),
            },
            GitOutcome::DirtyWorkingTree { entries } => LogOutcome::DirtyWorkingTree {
                entries: entries.clone(),
            },
            GitOutcome::GitError { message, exit_code } => LogOutcome::GitError {
                message: message.clone(),
                exit_code: *exit_code,
            },
            GitOutcome::SpawnError(e) => LogOutcome::SpawnError {
                message: e.to_string(),
            },
            GitOutcome::UnrecoverableState { message } => LogOutcome::UnrecoverableState {
                message: message.clone(),
            },
        }
    }
}

/// One executed command in the session log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the command finished
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Step that issued the command
    pub step: ReleaseStep,
    /// Command line as displayed
    pub command: String,
    /// Classified outcome
    pub outcome: LogOutcome,
    /// Tail of the command output
    pub excerpt: String,
}

/// Parameters for a new release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    /// Target environment
    pub environment: Environment,
    /// Version string, `X.Y.Z`
    pub version: String,
    /// Merge requests in merge order
    pub merge_requests: Vec<MergeRequestRef>,
    /// Exclusion patterns to snapshot
    pub exclude_patterns: Vec<String>,
}

impl ReleaseRequest {
    /// Check the request and return the parsed version
    pub fn validate(&self) -> Result<semver::Version, EngineError> {
        let version =
            semver::Version::parse(&self.version).map_err(|e| EngineError::InvalidRequest {
                reason: format!("'{}' is not a semantic version: {}", self.version, e),
            })?;
        if !version.pre.is_empty() || !version.build.is_empty() {
            return Err(EngineError::InvalidRequest {
                reason: format!(
                    "version '{}' must be plain X.Y.Z without pre-release or build metadata",
                    self.version
                ),
            });
        }

        let first = self
            .merge_requests
            .first()
            .ok_or_else(|| EngineError::InvalidRequest {
                reason: "at least one merge request is required".to_string(),
            })?;

        for mr in &self.merge_requests {
            if mr.source_branch.trim().is_empty() {
                return Err(EngineError::InvalidRequest {
                    reason: format!("merge request !{} has no source branch", mr.iid),
                });
            }
            if mr.project_id != first.project_id {
                return Err(EngineError::InvalidRequest {
                    reason: format!(
                        "all merge requests must belong to one project ({} and {} differ)",
                        first.project_id, mr.project_id
                    ),
                });
            }
        }

        Ok(version)
    }
}

/// Complete state of one release run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSession {
    /// Version of the session format
    pub format_version: u32,
    /// Unique ID for this session
    pub id: String,
    /// Merge requests in merge order
    pub merge_requests: Vec<MergeRequestRef>,
    /// Target environment
    pub environment: Environment,
    /// Version being released
    pub version: semver::Version,
    /// Exclusion patterns captured at start
    pub exclude_patterns: Vec<String>,
    /// Step the session is at or paused on
    pub current_step: ReleaseStep,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Every command executed so far
    pub log: Vec<LogEntry>,
    /// Creation time
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last modification time
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// HEAD when the release started
    pub pre_release_commit: Option<String>,
    /// Branch checked out when the release started
    pub original_branch: Option<String>,
    /// Local release branch name
    pub release_branch: String,
    /// Why the session is suspended
    pub suspension: Option<SuspendReason>,
    /// Why the session failed
    pub failure: Option<String>,
    /// Step dispatched but not yet reported back
    pub in_flight: Option<ReleaseStep>,
    /// URL of the release merge request
    pub merge_request_url: Option<String>,
}

impl ReleaseSession {
    /// Create a new Active session at `Init`
    pub fn new(request: ReleaseRequest) -> Result<Self, EngineError> {
        let version = request.validate()?;
        let now = chrono::Utc::now();
        let release_branch = format!("release/{}-{}", request.environment.slug(), version);

        Ok(Self {
            format_version: SESSION_FORMAT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            merge_requests: request.merge_requests,
            environment: request.environment,
            version,
            exclude_patterns: request.exclude_patterns,
            current_step: ReleaseStep::Init,
            status: SessionStatus::Active,
            log: Vec::new(),
            created_at: now,
            updated_at: now,
            pre_release_commit: None,
            original_branch: None,
            release_branch,
            suspension: None,
            failure: None,
            in_flight: None,
            merge_request_url: None,
        })
    }

    /// Root branch of the target environment
    pub fn root_branch(&self) -> &'static str {
        self.environment.root_branch()
    }

    /// Tag derived from version and environment
    pub fn tag(&self) -> String {
        tag_for(&self.version, self.environment)
    }

    /// Project that receives the release merge request
    pub fn project_id(&self) -> &str {
        self.merge_requests
            .first()
            .map(|mr| mr.project_id.as_str())
            .unwrap_or_default()
    }

    /// Merge commit message for the merge request at `index`
    pub fn merge_message(&self, index: usize) -> Option<String> {
        self.merge_requests.get(index).map(|mr| {
            format!(
                "Merge branch '{}' (!{}) into {}",
                mr.source_branch, mr.iid, self.release_branch
            )
        })
    }

    /// Release commit message
    pub fn commit_message(&self) -> String {
        format!(
            "Release {} to {} ({})\n\n{}",
            self.version,
            self.environment,
            self.root_branch(),
            self.merge_request_lines()
        )
    }

    /// Title of the release merge request
    pub fn release_mr_title(&self) -> String {
        format!("Release {} ({})", self.version, self.environment)
    }

    /// Description of the release merge request
    pub fn release_mr_description(&self) -> String {
        format!(
            "Release {} to {}.\n\nIncluded merge requests:\n\n{}",
            self.tag(),
            self.environment,
            self.merge_request_lines()
        )
    }

    fn merge_request_lines(&self) -> String {
        self.merge_requests
            .iter()
            .map(|mr| format!("- !{} {} ({})", mr.iid, mr.title, mr.source_branch))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether the session is Completed or Aborted
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append one git command to the log
    pub fn record(&mut self, step: ReleaseStep, command: &ExecutedCommand) {
        self.push_log(
            step,
            command.command.clone(),
            LogOutcome::from(&command.outcome),
            &command.output_text(),
        );
    }

    /// Append a non-git entry (code host calls) to the log
    pub fn push_log(&mut self, step: ReleaseStep, command: String, outcome: LogOutcome, output: &str) {
        self.log.push(LogEntry {
            timestamp: chrono::Utc::now(),
            step,
            command,
            outcome,
            excerpt: excerpt(output),
        });
        self.touch();
    }

    /// Update the modification time
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }

    /// Get elapsed time
    pub fn elapsed_time(&self) -> chrono::Duration {
        self.updated_at - self.created_at
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "Release {} to {} - {} at '{}' - {} merge request(s) - {} elapsed",
            self.version,
            self.environment,
            self.status,
            self.current_step,
            self.merge_requests.len(),
            format_duration(self.elapsed_time())
        )
    }
}

/// `v<version>` for production, `v<version>-<env>` otherwise
pub fn tag_for(version: &semver::Version, environment: Environment) -> String {
    match environment {
        Environment::Prod => format!("v{}", version),
        other => format!("v{}-{}", version, other.slug()),
    }
}

fn excerpt(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(EXCERPT_MAX_LINES);
    lines[start..].join("\n")
}

fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
