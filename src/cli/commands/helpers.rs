//! Shared helper functions for command execution.

use crate::cli::RuntimeConfig;
use crate::codehost::GitLabClient;
use crate::engine::{AbortReport, EngineSettings, ReleaseEngine};
use crate::error::{ReleaseError, Result, SessionError};
use crate::git::{CliGitOperations, ProcessRunner};
use crate::history::{HistoryStore, ThemeColorSnapshot};
use crate::session::{LoadOutcome, ReleaseSession, SessionStatus, SessionStore, SuspendReason};

/// Engine wired to the git binary and GitLab
pub(super) type Engine = ReleaseEngine<CliGitOperations<ProcessRunner>, GitLabClient>;

/// Exit code for a session that stopped for the operator
pub(super) const EXIT_SUSPENDED: i32 = 2;

/// Build the engine for the repository named by `--repo`
pub(super) async fn build_engine(config: &RuntimeConfig) -> Result<Engine> {
    let settings = &config.settings;
    let git_binary = settings.resolve_git_binary()?;
    config.verbose_println(&format!("Using git at {}", git_binary.display()));

    let git = CliGitOperations::open(
        ProcessRunner::new(),
        &config.repo,
        &git_binary.to_string_lossy(),
    )
    .await?;
    let code_host = GitLabClient::new(&settings.gitlab)?;

    Ok(ReleaseEngine::new(
        git,
        code_host,
        SessionStore::new(&settings.data_dir),
        HistoryStore::new(&settings.data_dir),
        EngineSettings {
            remote: settings.remote.clone(),
            theme: ThemeColorSnapshot::capture(&settings.theme),
        },
    ))
}

/// Load the session to act on.
///
/// A Completed or Aborted session left behind by an interrupted finish is
/// archived and reported instead of returned.
pub(super) fn load_resumable(engine: &Engine, config: &RuntimeConfig) -> Result<Option<ReleaseSession>> {
    match engine.resume()? {
        LoadOutcome::Resumable(session) => Ok(Some(session)),
        LoadOutcome::Terminal(session) => {
            config.warning_println(&format!(
                "Session {} had already ended ({}); archiving it",
                session.id, session.status
            ));
            engine.finalize(&session)?;
            Ok(None)
        }
        LoadOutcome::None => Err(ReleaseError::Session(SessionError::NotFound)),
    }
}

/// Process exit code for the state a session stopped in
pub(super) fn exit_code_for(session: &ReleaseSession) -> i32 {
    match session.status {
        SessionStatus::Completed | SessionStatus::Aborted | SessionStatus::Active => 0,
        SessionStatus::Suspended => EXIT_SUSPENDED,
        SessionStatus::Failed => 1,
    }
}

/// Tell the operator where the session stopped and what to do next
pub(super) fn report_session(config: &RuntimeConfig, session: &ReleaseSession) {
    match session.status {
        SessionStatus::Completed => {
            config.success_println(&format!(
                "Release {} to {} completed",
                session.tag(),
                session.environment
            ));
            if let Some(url) = &session.merge_request_url {
                config.indent(&format!("Merge request: {}", url));
            }
        }
        SessionStatus::Aborted => {
            config.success_println(&format!("Release {} aborted", session.tag()));
        }
        SessionStatus::Suspended => {
            let reason = session
                .suspension
                .as_ref()
                .map(SuspendReason::describe)
                .unwrap_or_else(|| "waiting for the operator".to_string());
            config.warning_println(&format!(
                "Release suspended at '{}': {}",
                session.current_step, reason
            ));
            if let Some(SuspendReason::MergeConflict { paths, .. }) = &session.suspension {
                for path in paths {
                    config.indent(path);
                }
                config.println("Resolve the conflicts and stage the files, then run `glrelease retry`.");
            } else {
                config.println("Fix the cause, then run `glrelease retry`.");
            }
            config.println("Run `glrelease abort` to roll back instead.");
        }
        SessionStatus::Failed => {
            config.error_println(&format!(
                "Release failed at '{}': {}",
                session.current_step,
                session.failure.as_deref().unwrap_or("unknown error")
            ));
            config.println("Run `glrelease abort` to restore the repository.");
        }
        SessionStatus::Active => config.info_println(&session.summary()),
    }
}

/// Warn about whatever abort could not roll back
pub(super) fn report_abort(config: &RuntimeConfig, report: &AbortReport) {
    if report.is_clean() {
        return;
    }
    config.warning_println("Some changes could not be rolled back; clean up manually:");
    for message in &report.unrecoverable {
        config.indent(message);
    }
}

/// Prompt user for confirmation with y/n input
pub(super) fn prompt_confirmation(prompt: &str) -> std::io::Result<bool> {
    use std::io::Write;

    print!("{} [y/N]: ", prompt);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    let response = input.trim().to_lowercase();
    Ok(matches!(response.as_str(), "y" | "yes"))
}
