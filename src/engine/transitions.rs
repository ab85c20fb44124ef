//! Transition table of the release state machine.
//!
//! Steps report a [`StepOutcome`]; [`decide`] is the only place that turns an
//! outcome into the next step, status and suspension reason.

use crate::git::GitOutcome;
use crate::session::{ReleaseStep, SessionStatus, SuspendReason};

/// What running one step produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step finished; move on
    Succeeded,
    /// Merge stopped on conflicts
    Conflict {
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
    RemoteFailed {
        /// Error text
        error: String,
    },
    /// Anything else that went wrong
    Fatal {
        /// Failure message
        message: String,
    },
}

impl StepOutcome {
    /// Map a git outcome; `branch` names the merge source for conflicts
    pub fn from_git(outcome: &GitOutcome, branch: Option<&str>) -> Self {
        match outcome {
            GitOutcome::Ok | GitOutcome::MergeOk | GitOutcome::NothingToCommit => {
                StepOutcome::Succeeded
            }
            GitOutcome::MergeConflict { paths } => StepOutcome::Conflict {
                branch: branch.unwrap_or_default().to_string(),
                paths: paths.clone(),
            },
            GitOutcome::PushRejected { reason } => StepOutcome::PushRejected {
                reason: reason.clone(),
            },
            other => StepOutcome::Fatal {
                message: other.describe(),
            },
        }
    }
}

/// Session fields a step outcome decides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Step to be at afterwards
    pub step: ReleaseStep,
    /// Status afterwards
    pub status: SessionStatus,
    /// Suspension reason, when Suspended
    pub suspension: Option<SuspendReason>,
    /// Failure message, when Failed
    pub failure: Option<String>,
}

impl Transition {
    fn stay(step: ReleaseStep, status: SessionStatus) -> Self {
        Self {
            step,
            status,
            suspension: None,
            failure: None,
        }
    }

    fn suspend(step: ReleaseStep, reason: SuspendReason) -> Self {
        Self {
            suspension: Some(reason),
            ..Self::stay(step, SessionStatus::Suspended)
        }
    }

    fn fail(step: ReleaseStep, message: String) -> Self {
        Self {
            failure: Some(message),
            ..Self::stay(step, SessionStatus::Failed)
        }
    }
}

/// Decide the transition for `outcome` of `step`
pub fn decide(step: ReleaseStep, outcome: &StepOutcome, merge_count: usize) -> Transition {
    match (step, outcome) {
        (_, StepOutcome::Succeeded) => {
            let next = step.next(merge_count);
            let status = if next == ReleaseStep::Done {
                SessionStatus::Completed
            } else {
                SessionStatus::Active
            };
            Transition::stay(next, status)
        }
        (ReleaseStep::MergeBranch { .. }, StepOutcome::Conflict { branch, paths }) => {
            Transition::suspend(
                step,
                SuspendReason::MergeConflict {
                    branch: branch.clone(),
                    paths: paths.clone(),
                },
            )
        }
        (ReleaseStep::Push, StepOutcome::PushRejected { reason }) => Transition::suspend(
            step,
            SuspendReason::PushRejected {
                reason: reason.clone(),
            },
        ),
        (ReleaseStep::CreateRemoteMr, StepOutcome::RemoteFailed { error }) => Transition::suspend(
            step,
            SuspendReason::RemoteMergeRequest {
                error: error.clone(),
            },
        ),
        (_, StepOutcome::Fatal { message }) => Transition::fail(step, message.clone()),
        (_, unexpected) => Transition::fail(
            step,
            format!("unexpected outcome during {}: {:?}", step, unexpected),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_advances() {
        let t = decide(ReleaseStep::MergeBranch { index: 0 }, &StepOutcome::Succeeded, 2);
        assert_eq!(t.step, ReleaseStep::MergeBranch { index: 1 });
        assert_eq!(t.status, SessionStatus::Active);

        let t = decide(ReleaseStep::MergeBranch { index: 1 }, &StepOutcome::Succeeded, 2);
        assert_eq!(t.step, ReleaseStep::ApplyExclusions);
    }

    #[test]
    fn last_step_completes() {
        let t = decide(ReleaseStep::CreateRemoteMr, &StepOutcome::Succeeded, 1);
        assert_eq!(t.step, ReleaseStep::Done);
        assert_eq!(t.status, SessionStatus::Completed);
    }

    #[test]
    fn conflict_suspends_on_same_merge() {
        let step = ReleaseStep::MergeBranch { index: 1 };
        let t = decide(
            step,
            &StepOutcome::Conflict {
                branch: "feature-b".to_string(),
                paths: vec!["file.go".to_string()],
            },
            2,
        );
        assert_eq!(t.step, step);
        assert_eq!(t.status, SessionStatus::Suspended);
        assert_eq!(
            t.suspension,
            Some(SuspendReason::MergeConflict {
                branch: "feature-b".to_string(),
                paths: vec!["file.go".to_string()],
            })
        );
    }

    #[test]
    fn push_rejection_and_remote_failure_suspend() {
        let t = decide(
            ReleaseStep::Push,
            &StepOutcome::PushRejected {
                reason: "fetch first".to_string(),
            },
            1,
        );
        assert_eq!((t.step, t.status), (ReleaseStep::Push, SessionStatus::Suspended));

        let t = decide(
            ReleaseStep::CreateRemoteMr,
            &StepOutcome::RemoteFailed {
                error: "500".to_string(),
            },
            1,
        );
        assert_eq!(t.status, SessionStatus::Suspended);
    }

    #[test]
    fn fatal_fails_in_place() {
        let t = decide(
            ReleaseStep::CheckoutRoot,
            &StepOutcome::Fatal {
                message: "'stable' not found".to_string(),
            },
            1,
        );
        assert_eq!(t.step, ReleaseStep::CheckoutRoot);
        assert_eq!(t.status, SessionStatus::Failed);
        assert_eq!(t.failure.as_deref(), Some("'stable' not found"));
    }

    #[test]
    fn conflict_outside_merge_is_fatal() {
        let t = decide(
            ReleaseStep::Commit,
            &StepOutcome::Conflict {
                branch: String::new(),
                paths: Vec::new(),
            },
            1,
        );
        assert_eq!(t.status, SessionStatus::Failed);
    }

    #[test]
    fn git_outcomes_map_to_step_outcomes() {
        assert_eq!(
            StepOutcome::from_git(&GitOutcome::NothingToCommit, None),
            StepOutcome::Succeeded
        );
        assert!(matches!(
            StepOutcome::from_git(
                &GitOutcome::GitError {
                    message: "fatal: boom".to_string(),
                    exit_code: Some(128)
                },
                None
            ),
            StepOutcome::Fatal { .. }
        ));
    }
}
