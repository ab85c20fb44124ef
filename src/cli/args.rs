//! Command line argument parsing.

use crate::config::Config;
use crate::session::{Environment, MergeRequestRef};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Merge GitLab merge requests into a release branch and open the release MR
#[derive(Parser, Debug)]
#[command(
    name = "glrelease",
    version,
    about = "Resumable GitLab release runs",
    long_about = "Merge a set of GitLab merge requests into a fresh release branch cut from an \
environment's root branch, push it and open the release merge request.

A run stops on merge conflicts, rejected pushes and GitLab errors. Fix the cause, then
`glrelease retry`, or roll everything back with `glrelease abort`.

Usage:
  glrelease start --env prod --version 1.2.0 --mr group/app:17:feature/login
  glrelease status
  glrelease retry
  glrelease history list"
)]
pub struct Args {
    /// Command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Repository to release from
    #[arg(long, global = true, value_name = "PATH", default_value = ".")]
    pub repo: PathBuf,

    /// Show per-command detail
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a new release run
    Start {
        /// Target environment (develop, test, stage, prod)
        #[arg(long = "env", value_name = "ENV")]
        environment: Environment,

        /// Release version, `X.Y.Z`
        #[arg(long, value_name = "VERSION")]
        version: String,

        /// Merge request to include, `<project>:<iid>:<source>[:<target>[:<title>]]`
        #[arg(
            long = "mr",
            value_name = "MR",
            required = true,
            value_parser = parse_merge_request
        )]
        merge_requests: Vec<MergeRequestRef>,

        /// Extra exclusion pattern (repeatable)
        #[arg(long = "exclude", value_name = "PATTERN")]
        exclude: Vec<String>,

        /// File with newline-delimited exclusion patterns
        #[arg(long, value_name = "FILE")]
        exclude_file: Option<PathBuf>,

        /// Ignore exclusion patterns from the config file
        #[arg(long)]
        no_default_excludes: bool,
    },

    /// Run the remaining steps of an active session
    Continue,

    /// Re-run the step the session is suspended on, then continue
    Retry,

    /// Roll back the working tree and end the session
    Abort {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the current session
    Status {
        /// Print the session as JSON
        #[arg(long)]
        json: bool,

        /// Number of log entries to show
        #[arg(long, default_value_t = 10)]
        log: usize,
    },

    /// Browse finished releases
    History {
        /// History command
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// `history` subcommands
#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// List finished releases, newest first
    List {
        /// Print the index as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one release with its command log
    Show {
        /// Session id
        id: String,
    },
}

impl Command {
    /// Command name for messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Continue => "continue",
            Command::Retry => "retry",
            Command::Abort { .. } => "abort",
            Command::Status { .. } => "status",
            Command::History { .. } => "history",
        }
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if let Command::Start { merge_requests, .. } = &self.command {
            let mut seen = std::collections::HashSet::new();
            for mr in merge_requests {
                if !seen.insert((&mr.project_id, mr.iid)) {
                    return Err(format!(
                        "merge request {}!{} listed more than once",
                        mr.project_id, mr.iid
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Parse `<project>:<iid>:<source>[:<target>[:<title>]]`.
///
/// The title is the last field and may itself contain colons. The target
/// defaults to `develop` and the title to the source branch.
pub fn parse_merge_request(value: &str) -> Result<MergeRequestRef, String> {
    let mut fields = value.splitn(5, ':');
    let project_id = fields.next().unwrap_or_default().trim();
    let iid = fields.next().map(str::trim);
    let source_branch = fields.next().map(str::trim);

    let (Some(iid), Some(source_branch)) = (iid, source_branch) else {
        return Err(format!(
            "expected <project>:<iid>:<source>[:<target>[:<title>]], got '{}'",
            value
        ));
    };
    if project_id.is_empty() {
        return Err("project is empty".to_string());
    }
    if source_branch.is_empty() {
        return Err("source branch is empty".to_string());
    }
    let iid = iid
        .parse::<u64>()
        .map_err(|_| format!("merge request iid '{}' is not a number", iid))?;

    let target_branch = fields
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("develop");
    let title = fields
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(source_branch);

    Ok(MergeRequestRef {
        project_id: project_id.to_string(),
        source_branch: source_branch.to_string(),
        target_branch: target_branch.to_string(),
        iid,
        title: title.to_string(),
    })
}

/// Configuration derived from command line arguments and the config file
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
    /// Loaded settings
    pub settings: Config,
    /// Repository path from `--repo`
    pub repo: PathBuf,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(args: &Args, settings: Config) -> Self {
        Self {
            output: super::OutputManager::with_theme(
                settings.theme.clone(),
                args.verbose,
                args.quiet,
            ),
            settings,
            repo: args.repo.clone(),
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print message
    pub fn println(&self, message: &str) {
        let _ = self.output.println(message);
    }

    /// Print message in verbose mode only
    pub fn verbose_println(&self, message: &str) {
        let _ = self.output.verbose(message);
    }

    /// Print error message (always shown)
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        let _ = self.output.warn(message);
    }

    /// Print success message
    pub fn success_println(&self, message: &str) {
        let _ = self.output.success(message);
    }

    /// Print info message
    pub fn info_println(&self, message: &str) {
        let _ = self.output.info(message);
    }

    /// Print progress message
    pub fn progress_println(&self, message: &str) {
        let _ = self.output.progress(message);
    }

    /// Print section header
    pub fn section(&self, title: &str) {
        let _ = self.output.section(title);
    }

    /// Print indented text
    pub fn indent(&self, message: &str) {
        let _ = self.output.indent(message);
    }

    /// Check if verbose output is enabled
    pub fn is_verbose(&self) -> bool {
        self.output.is_verbose()
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.output.is_quiet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_request_with_defaults() {
        let mr = parse_merge_request("group/app:17:feature/login").unwrap();
        assert_eq!(mr.project_id, "group/app");
        assert_eq!(mr.iid, 17);
        assert_eq!(mr.source_branch, "feature/login");
        assert_eq!(mr.target_branch, "develop");
        assert_eq!(mr.title, "feature/login");
    }

    #[test]
    fn merge_request_title_keeps_colons() {
        let mr = parse_merge_request("42:3:fix/a:develop:fix: handle empty input").unwrap();
        assert_eq!(mr.target_branch, "develop");
        assert_eq!(mr.title, "fix: handle empty input");
    }

    #[test]
    fn malformed_merge_requests() {
        assert!(parse_merge_request("42:17").is_err());
        assert!(parse_merge_request("42:x:feature").is_err());
        assert!(parse_merge_request(":1:feature").is_err());
        assert!(parse_merge_request("42:1: ").is_err());
    }

    #[test]
    fn start_arguments_parse() {
        let args = Args::try_parse_from([
            "glrelease",
            "start",
            "--env",
            "stage",
            "--version",
            "1.2.0",
            "--mr",
            "42:1:feature/a",
            "--mr",
            "42:2:feature/b",
            "--exclude",
            ".gitlab-ci.yml",
        ])
        .unwrap();

        match &args.command {
            Command::Start {
                environment,
                merge_requests,
                exclude,
                ..
            } => {
                assert_eq!(*environment, Environment::Stage);
                assert_eq!(merge_requests.len(), 2);
                assert_eq!(exclude, &vec![".gitlab-ci.yml".to_string()]);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(args.validate().is_ok());
    }

    #[test]
    fn duplicate_merge_requests_are_rejected() {
        let args = Args::try_parse_from([
            "glrelease", "start", "--env", "prod", "--version", "1.0.0", "--mr", "42:1:a", "--mr",
            "42:1:b",
        ])
        .unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn start_requires_a_merge_request() {
        assert!(
            Args::try_parse_from(["glrelease", "start", "--env", "prod", "--version", "1.0.0"])
                .is_err()
        );
    }
}
