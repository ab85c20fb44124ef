//! Commands acting on the stored session: continue, retry and abort.

use super::helpers::{
    build_engine, exit_code_for, load_resumable, prompt_confirmation, report_abort,
    report_session,
};
use crate::cli::RuntimeConfig;
use crate::engine::EngineCommand;
use crate::error::Result;

/// Run the remaining steps of an Active session
pub(super) async fn execute_continue(config: &RuntimeConfig) -> Result<i32> {
    let engine = build_engine(config).await?;
    let Some(mut session) = load_resumable(&engine, config)? else {
        return Ok(0);
    };

    config.info_println(&session.summary());
    engine
        .dispatch(&mut session, EngineCommand::AdvanceOnSuccess)
        .await?;
    engine.run(&mut session).await?;

    report_session(config, &session);
    Ok(exit_code_for(&session))
}

/// Re-run the suspended step, then continue
pub(super) async fn execute_retry(config: &RuntimeConfig) -> Result<i32> {
    let engine = build_engine(config).await?;
    let Some(mut session) = load_resumable(&engine, config)? else {
        return Ok(0);
    };

    config.info_println(&format!(
        "Retrying '{}' for release {}",
        session.current_step,
        session.tag()
    ));
    engine.retry(&mut session).await?;

    report_session(config, &session);
    Ok(exit_code_for(&session))
}

/// Roll back and end the session
pub(super) async fn execute_abort(config: &RuntimeConfig, yes: bool) -> Result<i32> {
    let engine = build_engine(config).await?;
    let Some(mut session) = load_resumable(&engine, config)? else {
        return Ok(0);
    };

    if !yes {
        let prompt = format!(
            "Abort release {} and reset the repository to its state before the release?",
            session.tag()
        );
        if !prompt_confirmation(&prompt)? {
            config.println("Abort cancelled");
            return Ok(1);
        }
    }

    config.progress_println(&format!("Rolling back release {}", session.tag()));
    let report = engine.dispatch(&mut session, EngineCommand::Abort).await?;
    if let Some(report) = &report {
        report_abort(config, report);
    }

    report_session(config, &session);
    Ok(exit_code_for(&session))
}
