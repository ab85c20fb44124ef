//! Status command implementation.
//!
//! Displays the stored session without touching the repository.

use crate::cli::{Args, Command, RuntimeConfig};
use crate::error::{ReleaseError, Result};
use crate::session::{LogEntry, LoadOutcome, ReleaseSession, ReleaseStep, SessionStore};

/// Execute status command
pub(super) async fn execute_status(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let Command::Status { json, log } = &args.command else {
        unreachable!("execute_status called with non-Status command");
    };

    let store = SessionStore::new(&config.settings.data_dir);
    let session = match store.load()? {
        LoadOutcome::None => {
            if *json {
                println!("{{\"status\": \"no_active_release\"}}");
            } else {
                config.println("No release session in progress");
            }
            return Ok(0);
        }
        LoadOutcome::Resumable(session) | LoadOutcome::Terminal(session) => session,
    };

    if *json {
        let json_output = serde_json::to_string_pretty(&session).map_err(ReleaseError::Json)?;
        println!("{}", json_output);
        return Ok(0);
    }

    print_session(config, &session, *log);
    Ok(0)
}

fn print_session(config: &RuntimeConfig, session: &ReleaseSession, log_limit: usize) {
    config.println(&format!("📊 {}", session.summary()));
    config.println(&format!("Session: {}", session.id));
    config.println(&format!("Release branch: {}", session.release_branch));
    config.println(&format!("Started: {}", session.created_at));
    config.println(&format!("Updated: {}", session.updated_at));

    if let Some(step) = session.in_flight {
        config.warning_println(&format!(
            "Step '{}' was running when the session was last saved",
            step
        ));
    }
    if let Some(reason) = &session.suspension {
        config.warning_println(&format!("Suspended: {}", reason.describe()));
    }
    if let Some(failure) = &session.failure {
        config.error_println(&format!("Failed: {}", failure));
    }
    if let Some(url) = &session.merge_request_url {
        config.println(&format!("Merge request: {}", url));
    }

    config.println("\nMerge requests:");
    for (index, mr) in session.merge_requests.iter().enumerate() {
        let marker = if session.current_step > (ReleaseStep::MergeBranch { index }) {
            "✓"
        } else if session.current_step == (ReleaseStep::MergeBranch { index }) {
            "→"
        } else {
            " "
        };
        config.println(&format!(
            "  {} !{} {} ({})",
            marker, mr.iid, mr.title, mr.source_branch
        ));
    }

    if log_limit > 0 && !session.log.is_empty() {
        config.println("\nRecent commands:");
        let start = session.log.len().saturating_sub(log_limit);
        for entry in &session.log[start..] {
            config.println(&format!("  {}", format_entry(entry)));
            if config.is_verbose() && !entry.excerpt.is_empty() {
                config.indent(&entry.excerpt);
            }
        }
    }
}

pub(super) fn format_entry(entry: &LogEntry) -> String {
    format!(
        "[{}] {:<22} {:<21} {}",
        entry.timestamp.format("%H:%M:%S"),
        entry.step.to_string(),
        entry.outcome.label(),
        entry.command
    )
}
