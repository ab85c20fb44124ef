//! Command execution functions.
//!
//! Each command loads configuration, wires what it needs and reports the
//! resulting session state. Exit codes: 0 when the command did what was
//! asked, 2 when the release is suspended and waiting for the operator, 1 on
//! errors and failed releases.

mod helpers;
mod history;
mod session;
mod start;
mod status;

use crate::cli::{Args, Command, RuntimeConfig};
use crate::config::Config;
use crate::error::{CliError, ReleaseError, Result};

use history::execute_history;
use session::{execute_abort, execute_continue, execute_retry};
use start::execute_start;
use status::execute_status;

/// Execute the main command based on parsed arguments
pub async fn execute_command(args: Args) -> Result<i32> {
    if let Err(reason) = args.validate() {
        let output = super::OutputManager::new(false, false);
        output.error(&ReleaseError::from(CliError::InvalidArguments { reason }).to_string());
        return Ok(1);
    }

    let settings = match Config::load() {
        Ok(settings) => settings,
        Err(e) => {
            let output = super::OutputManager::new(false, false);
            output.error(&format!("Could not load configuration: {}", e));
            return Ok(1);
        }
    };
    let config = RuntimeConfig::new(&args, settings);
    log::debug!("data directory: {}", config.settings.data_dir.display());

    let result = match &args.command {
        Command::Start { .. } => execute_start(&args, &config).await,
        Command::Continue => execute_continue(&config).await,
        Command::Retry => execute_retry(&config).await,
        Command::Abort { yes } => execute_abort(&config, *yes).await,
        Command::Status { .. } => execute_status(&args, &config).await,
        Command::History { .. } => execute_history(&args, &config).await,
    };

    match result {
        Ok(exit_code) => Ok(exit_code),
        Err(e) => {
            config.error_println(&format!(
                "Command '{}' failed: {}",
                args.command.name(),
                e
            ));

            if !e.is_recoverable() {
                config.warning_println("Running the command again will not help until this is fixed.");
            }

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                config.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    config.println(&format!("  • {}", suggestion));
                }
            }

            Ok(1)
        }
    }
}
