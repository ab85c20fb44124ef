//! History command implementation.

use super::status::format_entry;
use crate::cli::{Args, Command, HistoryCommand, RuntimeConfig};
use crate::error::{ReleaseError, Result};
use crate::history::{HistoryStatus, HistoryStore, ThemeColorSnapshot, recolor};

/// Execute history command
pub(super) async fn execute_history(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let Command::History { command } = &args.command else {
        unreachable!("execute_history called with non-History command");
    };

    let store = HistoryStore::new(&config.settings.data_dir);
    match command {
        HistoryCommand::List { json } => list(config, &store, *json),
        HistoryCommand::Show { id } => show(config, &store, id),
    }
}

fn list(config: &RuntimeConfig, store: &HistoryStore, json: bool) -> Result<i32> {
    let mut entries = store.load_index()?;
    entries.sort_by(|a, b| b.date_time.cmp(&a.date_time));

    if json {
        let json_output = serde_json::to_string_pretty(&entries).map_err(ReleaseError::Json)?;
        println!("{}", json_output);
        return Ok(0);
    }

    if entries.is_empty() {
        config.println("No releases recorded yet");
        return Ok(0);
    }

    for entry in &entries {
        let line = format!(
            "{:<15}{:<10}{:<20}{:<10}{}",
            entry.tag,
            entry.environment.name(),
            entry
                .date_time
                .with_timezone(&chrono::Local)
                .format("%d.%m.%Y %H:%M")
                .to_string(),
            format!("{} mrs", entry.mr_count),
            entry.id
        );
        let _ = config
            .output()
            .dot(entry.status == HistoryStatus::Completed, &line);
    }
    Ok(0)
}

fn show(config: &RuntimeConfig, store: &HistoryStore, id: &str) -> Result<i32> {
    let detail = store.load_detail(id)?;
    let current_theme = ThemeColorSnapshot::capture(&config.settings.theme);

    config.section(&format!("{} ({})", detail.tag, detail.status));
    config.println(&format!("Environment: {}", detail.environment));
    config.println(&format!("Version: {}", detail.version));
    config.println(&format!("Release branch: {}", detail.release_branch));
    config.println(&format!("Started: {}", detail.started_at));
    config.println(&format!("Finished: {}", detail.finished_at));
    if let Some(url) = &detail.merge_request_url {
        config.println(&format!("Merge request: {}", url));
    }

    config.println("\nMerge requests:");
    for mr in &detail.merge_requests {
        config.println(&format!(
            "  !{} {} ({} → {})",
            mr.iid, mr.title, mr.source_branch, mr.target_branch
        ));
    }

    config.println("\nLog:");
    for entry in &detail.log {
        config.println(&format!("  {}", format_entry(entry)));
        if !entry.excerpt.is_empty() {
            let excerpt = recolor(&entry.excerpt, &detail.theme, &current_theme);
            for line in excerpt.lines() {
                let _ = config.output().raw(&format!("      {}", line));
            }
        }
    }
    Ok(0)
}
