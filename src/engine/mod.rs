//! Release state machine.
//!
//! The engine owns no session itself: callers hold a [`ReleaseSession`] and
//! hand it to [`ReleaseEngine::dispatch`] with a named command. Each command
//! computes the next state on a copy, persists it, and only then updates the
//! caller's session, so a failed save never leaves memory ahead of disk.

mod abort;
mod steps;
mod transitions;

pub use abort::AbortReport;
pub use transitions::{StepOutcome, Transition, decide};

use crate::codehost::CodeHost;
use crate::error::{EngineError, Result};
use crate::git::GitOperations;
use crate::history::{HistoryStore, ThemeColorSnapshot, record_for};
use crate::session::{
    LoadOutcome, ReleaseRequest, ReleaseSession, SessionStatus, SessionStore, SuspendReason,
};
use std::fmt;

/// Commands accepted for an existing session.
///
/// Creating a session is [`ReleaseEngine::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Run the current step of an Active session
    AdvanceOnSuccess,
    /// Re-run the step a Suspended session is paused on
    Retry,
    /// Roll back and end the session
    Abort,
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::AdvanceOnSuccess => write!(f, "continue"),
            EngineCommand::Retry => write!(f, "retry"),
            EngineCommand::Abort => write!(f, "abort"),
        }
    }
}

/// Engine settings that do not belong to a session
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Git remote to fetch from and push to
    pub remote: String,
    /// Color escapes stored with history records
    pub theme: ThemeColorSnapshot,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            theme: ThemeColorSnapshot::default(),
        }
    }
}

/// Drives a release session through its steps
#[derive(Debug)]
pub struct ReleaseEngine<G, H> {
    git: G,
    code_host: H,
    sessions: SessionStore,
    history: HistoryStore,
    settings: EngineSettings,
}

impl<G: GitOperations, H: CodeHost> ReleaseEngine<G, H> {
    /// Create an engine
    pub fn new(
        git: G,
        code_host: H,
        sessions: SessionStore,
        history: HistoryStore,
        settings: EngineSettings,
    ) -> Self {
        Self {
            git,
            code_host,
            sessions,
            history,
            settings,
        }
    }

    /// Git operations in use
    pub fn git(&self) -> &G {
        &self.git
    }

    /// Session store in use
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// History store in use
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Load the stored session.
    ///
    /// A session saved while a step was running belongs to a process that
    /// died mid-step; it is converted to Suspended (`Interrupted`) and saved
    /// so that the operator can inspect the tree and retry.
    pub fn resume(&self) -> Result<LoadOutcome> {
        match self.sessions.load()? {
            LoadOutcome::Resumable(mut session) => {
                if let Some(step) = session.in_flight {
                    log::warn!(
                        "session {} was interrupted during '{}'; suspending it",
                        session.id,
                        step
                    );
                    let mut working = session.clone();
                    working.in_flight = None;
                    working.status = SessionStatus::Suspended;
                    working.suspension = Some(SuspendReason::Interrupted { step });
                    working.touch();
                    self.sessions.save(&working)?;
                    session = working;
                }
                Ok(LoadOutcome::Resumable(session))
            }
            other => Ok(other),
        }
    }

    /// Create and persist a new Active session at `Init`.
    ///
    /// Refused while another session is Active, Suspended or Failed. A
    /// terminal session left behind by an interrupted completion is archived
    /// first.
    pub fn start(&self, request: ReleaseRequest) -> Result<ReleaseSession> {
        match self.resume()? {
            LoadOutcome::Resumable(existing) => {
                return Err(EngineError::SessionInProgress {
                    id: existing.id,
                    status: existing.status,
                }
                .into());
            }
            LoadOutcome::Terminal(existing) => self.finalize(&existing)?,
            LoadOutcome::None => {}
        }

        let session = ReleaseSession::new(request)?;
        self.sessions.save(&session)?;
        log::info!(
            "started release {} to {} ({} merge request(s)), session {}",
            session.version,
            session.environment,
            session.merge_requests.len(),
            session.id
        );
        Ok(session)
    }

    /// Apply one command to `session`
    pub async fn dispatch(
        &self,
        session: &mut ReleaseSession,
        command: EngineCommand,
    ) -> Result<Option<AbortReport>> {
        if let Some(step) = session.in_flight
            && command != EngineCommand::Abort
        {
            return Err(EngineError::StepInFlight { step }.into());
        }

        let allowed = match command {
            EngineCommand::AdvanceOnSuccess => session.status == SessionStatus::Active,
            EngineCommand::Retry => session.status == SessionStatus::Suspended,
            EngineCommand::Abort => !session.is_terminal(),
        };
        if !allowed {
            return Err(EngineError::InvalidCommand {
                command: command.to_string(),
                status: session.status,
            }
            .into());
        }

        match command {
            EngineCommand::AdvanceOnSuccess => {
                self.advance(session, false).await?;
                Ok(None)
            }
            EngineCommand::Retry => {
                self.advance(session, true).await?;
                Ok(None)
            }
            EngineCommand::Abort => self.abort(session).await.map(Some),
        }
    }

    /// Advance an Active session until it stops being Active
    pub async fn run(&self, session: &mut ReleaseSession) -> Result<()> {
        while session.status == SessionStatus::Active {
            self.dispatch(session, EngineCommand::AdvanceOnSuccess).await?;
        }
        Ok(())
    }

    /// Retry the suspended step, then keep going
    pub async fn retry(&self, session: &mut ReleaseSession) -> Result<()> {
        self.dispatch(session, EngineCommand::Retry).await?;
        self.run(session).await
    }

    /// Run the current step once and apply its transition
    async fn advance(&self, session: &mut ReleaseSession, retry: bool) -> Result<()> {
        let step = session.current_step;

        let mut working = session.clone();
        working.in_flight = Some(step);
        working.status = SessionStatus::Active;
        working.suspension = None;
        working.touch();
        self.sessions.save(&working)?;
        *session = working.clone();

        log::info!("running step '{}'", step);
        let outcome = self.execute_step(&mut working, step, retry).await;
        let transition = decide(step, &outcome, working.merge_requests.len());

        working.in_flight = None;
        working.current_step = transition.step;
        working.status = transition.status;
        working.suspension = transition.suspension;
        working.failure = transition.failure;
        working.touch();

        if let Err(e) = self.sessions.save(&working) {
            // Keep the record of what ran, but stay on the unfinished step.
            session.log = working.log;
            session.in_flight = None;
            return Err(e);
        }
        *session = working;

        match session.status {
            SessionStatus::Suspended => {
                if let Some(reason) = &session.suspension {
                    log::warn!("suspended at '{}': {}", step, reason.describe());
                }
            }
            SessionStatus::Failed => {
                log::error!(
                    "step '{}' failed: {}",
                    step,
                    session.failure.as_deref().unwrap_or("unknown error")
                );
            }
            SessionStatus::Completed => {
                log::info!("release {} completed", session.tag());
                self.finalize(session)?;
            }
            _ => log::debug!("step '{}' done, next '{}'", step, session.current_step),
        }
        Ok(())
    }

    /// Archive a Completed or Aborted session and remove it from storage.
    ///
    /// The history record is written before the session file is removed, and
    /// an id already in history is not appended again, so this can be
    /// repeated after a crash.
    pub fn finalize(&self, session: &ReleaseSession) -> Result<()> {
        if !session.is_terminal() {
            return Err(EngineError::InvalidCommand {
                command: "finalize".to_string(),
                status: session.status,
            }
            .into());
        }

        if self.history.contains(&session.id)? {
            log::debug!("session {} already archived", session.id);
        } else {
            let (entry, detail) = record_for(session, self.settings.theme.clone())?;
            self.history.append(&entry, &detail)?;
        }

        self.sessions.clear()
    }
}
