//! Start command implementation.

use super::helpers::{build_engine, exit_code_for, report_session};
use crate::cli::{Args, Command, RuntimeConfig};
use crate::error::Result;
use crate::exclusions::{normalize_patterns, parse_patterns};
use crate::session::ReleaseRequest;
use anyhow::Context;

/// Execute start command
pub(super) async fn execute_start(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let Command::Start {
        environment,
        version,
        merge_requests,
        exclude,
        exclude_file,
        no_default_excludes,
    } = &args.command
    else {
        unreachable!("execute_start called with non-Start command");
    };

    let mut patterns = if *no_default_excludes {
        Vec::new()
    } else {
        config.settings.exclude_patterns.clone()
    };
    patterns.extend(normalize_patterns(exclude));
    if let Some(path) = exclude_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read exclude file {}", path.display()))?;
        patterns.extend(parse_patterns(&text));
    }
    let mut seen = std::collections::HashSet::new();
    patterns.retain(|p| seen.insert(p.clone()));

    let request = ReleaseRequest {
        environment: *environment,
        version: version.clone(),
        merge_requests: merge_requests.clone(),
        exclude_patterns: patterns,
    };

    request.validate()?;

    let engine = build_engine(config).await?;
    let mut session = engine.start(request)?;

    config.section(&format!("Release {} to {}", session.tag(), session.environment));
    config.info_println(&format!(
        "Branch {} from {}/{}",
        session.release_branch,
        config.settings.remote,
        session.root_branch()
    ));
    for mr in &session.merge_requests {
        config.indent(&format!("!{} {} ({})", mr.iid, mr.title, mr.source_branch));
    }
    if !session.exclude_patterns.is_empty() {
        config.verbose_println(&format!(
            "Excluding: {}",
            session.exclude_patterns.join(", ")
        ));
    }

    engine.run(&mut session).await?;
    report_session(config, &session);
    Ok(exit_code_for(&session))
}
