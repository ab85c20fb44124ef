//! Abort: best-effort rollback to the pre-release state.
//!
//! Abort never refuses to finish. HEAD goes back to the branch the session
//! started on before anything is reset. Every git failure is logged; restore,
//! reset and clean failures are additionally reported back as requiring
//! manual cleanup, and the session still ends Aborted. If the aborted session
//! cannot be stored, the error carries the same report.

use super::ReleaseEngine;
use crate::codehost::CodeHost;
use crate::error::{EngineError, ReleaseError, Result};
use crate::git::{GitOperations, GitOutcome, GitReport};
use crate::session::{ReleaseSession, ReleaseStep, SessionStatus, SuspendReason};

/// What the rollback could not undo
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbortReport {
    /// Messages for failures that need manual cleanup
    pub unrecoverable: Vec<String>,
}

impl AbortReport {
    /// Whether the working tree was restored
    pub fn is_clean(&self) -> bool {
        self.unrecoverable.is_empty()
    }
}

impl<G: GitOperations, H: CodeHost> ReleaseEngine<G, H> {
    pub(super) async fn abort(&self, session: &mut ReleaseSession) -> Result<AbortReport> {
        let step = session.current_step;
        let mut working = session.clone();
        let mut report = AbortReport::default();

        log::info!("aborting session {} at '{}'", working.id, step);

        // Init never recorded a starting point: nothing was touched.
        if let Some(pre_release_commit) = working.pre_release_commit.clone() {
            let pending = self.git.merge_in_progress().await;
            let in_progress = pending.value.unwrap_or(false);
            record_all(&mut working, step, &pending);
            if in_progress {
                let aborted = self.git.abort_merge().await;
                record_all(&mut working, step, &aborted);
            }

            // Leave the root and release branches before resetting, so the
            // reset only ever moves the branch the operator started on.
            let restore = match working.original_branch.clone().filter(|b| b != "HEAD") {
                Some(original) => self.git.force_checkout(&original).await,
                None => self.git.detach_head(&pre_release_commit).await,
            };
            collect_unrecoverable(&mut report, &restore.outcome);
            let restored = restore.is_success();
            record_all(&mut working, step, &restore);

            if restored {
                let reset = self.git.reset_hard(&pre_release_commit).await;
                collect_unrecoverable(&mut report, &reset.outcome);
                record_all(&mut working, step, &reset);

                let clean = self.git.clean().await;
                collect_unrecoverable(&mut report, &clean.outcome);
                record_all(&mut working, step, &clean);
            } else {
                log::warn!("starting point not restored; skipping reset to {}", pre_release_commit);
            }

            let started_on_release_branch =
                working.original_branch.as_deref() == Some(working.release_branch.as_str());
            if restored && release_branch_created(session) && !started_on_release_branch {
                let branch = working.release_branch.clone();
                let deleted = self.git.delete_branch(&branch).await;
                if !deleted.is_success() {
                    log::debug!("release branch not deleted: {}", deleted.outcome.describe());
                }
                record_all(&mut working, step, &deleted);
            }
        }

        for message in &report.unrecoverable {
            log::warn!("manual cleanup required: {}", message);
        }

        working.status = SessionStatus::Aborted;
        working.suspension = None;
        working.in_flight = None;
        working.touch();

        if let Err(e) = self.sessions.save(&working) {
            session.log = working.log;
            session.in_flight = None;
            return Err(not_recorded(report, e));
        }
        *session = working;
        if let Err(e) = self.finalize(session) {
            return Err(not_recorded(report, e));
        }
        Ok(report)
    }
}

fn not_recorded(report: AbortReport, error: ReleaseError) -> ReleaseError {
    EngineError::AbortNotRecorded {
        unrecoverable: report.unrecoverable,
        source: Box::new(error),
    }
    .into()
}

/// Whether the release branch may exist: its step finished, or was cut
/// short while running
fn release_branch_created(session: &ReleaseSession) -> bool {
    let create = ReleaseStep::CreateReleaseBranch;
    match session.current_step {
        step if step > create => true,
        step if step == create => {
            session.in_flight == Some(create)
                || session.suspension == Some(SuspendReason::Interrupted { step: create })
        }
        _ => false,
    }
}

fn record_all<T>(session: &mut ReleaseSession, step: ReleaseStep, report: &GitReport<T>) {
    for command in &report.commands {
        session.record(step, command);
    }
}

fn collect_unrecoverable(report: &mut AbortReport, outcome: &GitOutcome) {
    if let GitOutcome::UnrecoverableState { .. } = outcome {
        report.unrecoverable.push(outcome.describe());
    }
}
