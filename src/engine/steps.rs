//! Execution of the individual release steps.
//!
//! Each step runs its git operations against a working copy of the session,
//! logs every executed command and reports a [`StepOutcome`]. Steps never
//! change `current_step` or `status`; that is left to the transition table.

use super::ReleaseEngine;
use super::transitions::StepOutcome;
use crate::codehost::{CodeHost, MergeRequestDraft};
use crate::error::CodeHostError;
use crate::exclusions::apply_exclusions;
use crate::git::{GitOperations, GitOutcome, GitReport};
use crate::session::{LogOutcome, ReleaseSession, ReleaseStep};

impl<G: GitOperations, H: CodeHost> ReleaseEngine<G, H> {
    /// Run `step` once against `session`
    pub(super) async fn execute_step(
        &self,
        session: &mut ReleaseSession,
        step: ReleaseStep,
        retry: bool,
    ) -> StepOutcome {
        match step {
            ReleaseStep::Init => self.init(session).await,
            ReleaseStep::CheckoutRoot => self.checkout_root(session).await,
            ReleaseStep::CreateReleaseBranch => self.create_release_branch(session).await,
            ReleaseStep::MergeBranch { index } => self.merge_branch(session, index, retry).await,
            ReleaseStep::ApplyExclusions => self.exclude(session).await,
            ReleaseStep::Commit => {
                let message = session.commit_message();
                let report = self.git.commit_all(&message).await;
                outcome_of(session, step, report)
            }
            ReleaseStep::Push => {
                let report = self
                    .git
                    .push(&self.settings.remote, &session.release_branch)
                    .await;
                outcome_of(session, step, report)
            }
            ReleaseStep::CreateRemoteMr => self.create_remote_mr(session).await,
            ReleaseStep::Done => StepOutcome::Succeeded,
        }
    }

    async fn init(&self, session: &mut ReleaseSession) -> StepOutcome {
        let step = ReleaseStep::Init;

        let status = self.git.status_porcelain().await;
        let entries = status.value.clone().unwrap_or_default();
        if let Some(failed) = log_report(session, step, status) {
            return failed;
        }
        if !entries.is_empty() {
            let dirty = GitOutcome::DirtyWorkingTree { entries };
            return StepOutcome::Fatal {
                message: format!("{}; commit or stash before releasing", dirty.describe()),
            };
        }

        let branch = self.git.current_branch().await;
        let original_branch = branch.value.clone();
        if let Some(failed) = log_report(session, step, branch) {
            return failed;
        }

        let head = self.git.head_commit().await;
        let pre_release_commit = head.value.clone();
        if let Some(failed) = log_report(session, step, head) {
            return failed;
        }

        session.original_branch = original_branch;
        session.pre_release_commit = pre_release_commit;
        StepOutcome::Succeeded
    }

    async fn checkout_root(&self, session: &mut ReleaseSession) -> StepOutcome {
        let step = ReleaseStep::CheckoutRoot;

        let fetch = self.git.fetch(&self.settings.remote).await;
        if let Some(failed) = log_report(session, step, fetch) {
            return failed;
        }

        let checkout = self.git.checkout(session.root_branch()).await;
        outcome_of(session, step, checkout)
    }

    async fn create_release_branch(&self, session: &mut ReleaseSession) -> StepOutcome {
        let start_point = format!("{}/{}", self.settings.remote, session.root_branch());
        let branch = session.release_branch.clone();
        let report = self.git.create_branch(&branch, &start_point).await;
        outcome_of(session, ReleaseStep::CreateReleaseBranch, report)
    }

    async fn merge_branch(
        &self,
        session: &mut ReleaseSession,
        index: usize,
        retry: bool,
    ) -> StepOutcome {
        let step = ReleaseStep::MergeBranch { index };
        let (Some(mr), Some(message)) = (
            session.merge_requests.get(index).cloned(),
            session.merge_message(index),
        ) else {
            return StepOutcome::Fatal {
                message: format!("no merge request at position {}", index + 1),
            };
        };

        if retry {
            let pending = self.git.merge_in_progress().await;
            let in_progress = pending.value.unwrap_or(false);
            if let Some(failed) = log_report(session, step, pending) {
                return failed;
            }

            if in_progress {
                let unmerged = self.git.unmerged_paths().await;
                let paths = unmerged.value.clone().unwrap_or_default();
                if let Some(failed) = log_report(session, step, unmerged) {
                    return failed;
                }
                if !paths.is_empty() {
                    return StepOutcome::Conflict {
                        branch: mr.source_branch,
                        paths,
                    };
                }

                log::info!("concluding the merge of '{}' resolved by the operator", mr.source_branch);
                let concluded = self.git.conclude_merge().await;
                if let Some(failed) = log_report(session, step, concluded) {
                    return failed;
                }
            }
        }

        let source = format!("{}/{}", self.settings.remote, mr.source_branch);
        let report = self.git.merge(&source, &message).await;
        for command in &report.commands {
            session.record(step, command);
        }
        StepOutcome::from_git(&report.outcome, Some(&mr.source_branch))
    }

    async fn exclude(&self, session: &mut ReleaseSession) -> StepOutcome {
        let step = ReleaseStep::ApplyExclusions;
        let patterns = session.exclude_patterns.clone();
        let report = apply_exclusions(&self.git, &patterns).await;

        for command in &report.commands {
            session.record(step, command);
        }
        if !report.removed.is_empty() {
            log::info!("excluded: {}", report.removed.join(", "));
        }
        StepOutcome::from_git(&report.outcome, None)
    }

    async fn create_remote_mr(&self, session: &mut ReleaseSession) -> StepOutcome {
        let step = ReleaseStep::CreateRemoteMr;
        if let Some(url) = &session.merge_request_url {
            log::info!("release merge request already exists: {}", url);
            return StepOutcome::Succeeded;
        }

        let draft = MergeRequestDraft {
            project_id: session.project_id().to_string(),
            source_branch: session.release_branch.clone(),
            target_branch: session.root_branch().to_string(),
            title: session.release_mr_title(),
            description: session.release_mr_description(),
        };
        let command = format!(
            "create merge request {} -> {} in project {}",
            draft.source_branch, draft.target_branch, draft.project_id
        );

        match self.code_host.create_merge_request(&draft).await {
            Ok(url) => {
                session.push_log(
                    step,
                    command,
                    LogOutcome::MergeRequestCreated { url: url.clone() },
                    &url,
                );
                session.merge_request_url = Some(url);
                StepOutcome::Succeeded
            }
            Err(e) => {
                let error = e.to_string();
                session.push_log(
                    step,
                    command,
                    LogOutcome::RemoteError {
                        message: error.clone(),
                    },
                    &error,
                );
                if matches!(e, CodeHostError::Api { status: 409, .. }) {
                    return self.adopt_open_merge_request(session, &draft, error).await;
                }
                StepOutcome::RemoteFailed { error }
            }
        }
    }

    /// A 409 means an open merge request for the release branch already
    /// exists, usually from an attempt whose response never arrived.
    async fn adopt_open_merge_request(
        &self,
        session: &mut ReleaseSession,
        draft: &MergeRequestDraft,
        error: String,
    ) -> StepOutcome {
        let step = ReleaseStep::CreateRemoteMr;
        let command = format!(
            "find open merge request {} -> {} in project {}",
            draft.source_branch, draft.target_branch, draft.project_id
        );

        match self.code_host.find_open_merge_request(draft).await {
            Ok(Some(url)) => {
                log::info!("using existing release merge request {}", url);
                session.push_log(
                    step,
                    command,
                    LogOutcome::MergeRequestCreated { url: url.clone() },
                    &url,
                );
                session.merge_request_url = Some(url);
                StepOutcome::Succeeded
            }
            Ok(None) => {
                let message = "no open merge request found".to_string();
                session.push_log(
                    step,
                    command,
                    LogOutcome::RemoteError {
                        message: message.clone(),
                    },
                    &message,
                );
                StepOutcome::RemoteFailed { error }
            }
            Err(lookup) => {
                let message = lookup.to_string();
                session.push_log(
                    step,
                    command,
                    LogOutcome::RemoteError {
                        message: message.clone(),
                    },
                    &message,
                );
                StepOutcome::RemoteFailed {
                    error: format!("{} (lookup of the open merge request failed: {})", error, message),
                }
            }
        }
    }
}

/// Log every command of `report` and map its outcome
fn outcome_of<T>(session: &mut ReleaseSession, step: ReleaseStep, report: GitReport<T>) -> StepOutcome {
    for command in &report.commands {
        session.record(step, command);
    }
    StepOutcome::from_git(&report.outcome, None)
}

/// Log every command of `report`; `Some` when the step has to stop
fn log_report<T>(
    session: &mut ReleaseSession,
    step: ReleaseStep,
    report: GitReport<T>,
) -> Option<StepOutcome> {
    match outcome_of(session, step, report) {
        StepOutcome::Succeeded => None,
        stop => Some(stop),
    }
}
