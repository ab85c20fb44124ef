//! Adapter layer between the GitOperations trait and the git binary.
//!
//! Every operation is a thin composition of git subcommands run through a
//! [`CommandRunner`], followed by classification of what git printed.

use crate::error::{GitError, Result, SpawnError};
use crate::git::classify::{self, Signal};
use crate::git::runner::{CommandOutput, CommandRunner};
use crate::git::{ExecutedCommand, GitOperations, GitOutcome, GitReport};
use std::path::{Path, PathBuf};

/// Git operations using the git command line
#[derive(Debug, Clone)]
pub struct CliGitOperations<R> {
    runner: R,
    workdir: PathBuf,
    git_binary: String,
}

type Run = (String, std::result::Result<CommandOutput, SpawnError>);

impl<R: CommandRunner> CliGitOperations<R> {
    /// Operations on the repository at `workdir`, using `git` from PATH
    pub fn new(runner: R, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
            git_binary: "git".to_string(),
        }
    }

    /// Use a specific git binary
    pub fn with_git_binary(mut self, binary: impl Into<String>) -> Self {
        self.git_binary = binary.into();
        self
    }

    /// Open the repository containing `path`, rooted at its top level
    pub async fn open(runner: R, path: &Path, git_binary: &str) -> Result<Self> {
        let args = vec!["rev-parse".to_string(), "--show-toplevel".to_string()];
        let output = runner
            .run(path, git_binary, &args)
            .await
            .map_err(GitError::Spawn)?;

        if !output.success() {
            return Err(GitError::NotRepository {
                path: path.to_path_buf(),
            }
            .into());
        }

        let toplevel = output.stdout.trim();
        Ok(Self {
            runner,
            workdir: PathBuf::from(toplevel),
            git_binary: git_binary.to_string(),
        })
    }

    async fn exec(&self, args: &[&str]) -> Run {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let display = display_command(&args);
        let result = self.runner.run(&self.workdir, &self.git_binary, &args).await;
        (display, result)
    }

    /// Run one command with default classification: exit 0 is `Ok`
    async fn simple(&self, args: &[&str]) -> GitReport {
        let (display, result) = self.exec(args).await;
        let outcome = default_outcome(&result);
        GitReport::new(outcome.clone(), vec![executed(display, outcome, result)])
    }

    /// Run one command whose stdout is the value
    async fn query(&self, args: &[&str]) -> GitReport<String> {
        let (display, result) = self.exec(args).await;
        let outcome = default_outcome(&result);
        let value = match &result {
            Ok(out) if out.success() => Some(out.stdout.trim().to_string()),
            _ => None,
        };
        let report = GitReport::new(outcome.clone(), vec![executed(display, outcome, result)]);
        match value {
            Some(v) => report.with_value(v),
            None => report,
        }
    }

    async fn query_lines(&self, args: &[&str]) -> GitReport<Vec<String>> {
        let report = self.query(args).await;
        let value = report.value.as_deref().map(classify::lines);
        let lines_report = GitReport::new(report.outcome, report.commands);
        match value {
            Some(v) => lines_report.with_value(v),
            None => lines_report,
        }
    }

    /// Commands whose failure leaves the tree in an unknown state
    async fn destructive(&self, args: &[&str]) -> GitReport {
        let (display, result) = self.exec(args).await;
        let outcome = match &result {
            Ok(out) if out.success() => GitOutcome::Ok,
            Ok(out) => GitOutcome::UnrecoverableState {
                message: format!("{}: {}", display, classify::failure_message(out)),
            },
            Err(e) => GitOutcome::UnrecoverableState {
                message: format!("{}: {}", display, e),
            },
        };
        GitReport::new(outcome.clone(), vec![executed(display, outcome, result)])
    }
}

impl<R: CommandRunner> GitOperations for CliGitOperations<R> {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn status_porcelain(&self) -> GitReport<Vec<String>> {
        self.query_lines(&["status", "--porcelain"]).await
    }

    async fn current_branch(&self) -> GitReport<String> {
        self.query(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn head_commit(&self) -> GitReport<String> {
        self.query(&["rev-parse", "HEAD"]).await
    }

    async fn fetch(&self, remote: &str) -> GitReport {
        self.simple(&["fetch", "--prune", remote]).await
    }

    async fn checkout(&self, branch: &str) -> GitReport {
        let (display, result) = self.exec(&["checkout", branch]).await;
        let outcome = match &result {
            Ok(out) if !out.success()
                && classify::classify(&classify::CHECKOUT_RULES, out)
                    == Some(Signal::BranchNotFound) =>
            {
                GitOutcome::BranchNotFound {
                    reference: branch.to_string(),
                }
            }
            _ => default_outcome(&result),
        };
        GitReport::new(outcome.clone(), vec![executed(display, outcome, result)])
    }

    async fn force_checkout(&self, branch: &str) -> GitReport {
        self.destructive(&["checkout", "-f", branch]).await
    }

    async fn detach_head(&self, commit: &str) -> GitReport {
        self.destructive(&["checkout", "-f", "--detach", commit]).await
    }

    async fn create_branch(&self, name: &str, start_point: &str) -> GitReport {
        let (display, result) = self.exec(&["checkout", "-B", name, start_point]).await;
        let outcome = match &result {
            Ok(out) if !out.success()
                && classify::classify(&classify::CHECKOUT_RULES, out)
                    == Some(Signal::BranchNotFound) =>
            {
                GitOutcome::BranchNotFound {
                    reference: start_point.to_string(),
                }
            }
            _ => default_outcome(&result),
        };
        GitReport::new(outcome.clone(), vec![executed(display, outcome, result)])
    }

    async fn merge(&self, branch: &str, message: &str) -> GitReport {
        let (display, result) = self
            .exec(&["merge", "--no-ff", "--no-edit", "-m", message, branch])
            .await;

        let output = match &result {
            Err(e) => {
                let outcome = GitOutcome::SpawnError(e.clone());
                return GitReport::new(outcome.clone(), vec![executed(display, outcome, result)]);
            }
            Ok(out) if out.success() => {
                let outcome = GitOutcome::MergeOk;
                return GitReport::new(outcome.clone(), vec![executed(display, outcome, result)]);
            }
            Ok(out) => out.clone(),
        };

        let signal = classify::classify(&classify::MERGE_RULES, &output);
        if signal == Some(Signal::BranchNotFound) {
            let outcome = GitOutcome::BranchNotFound {
                reference: branch.to_string(),
            };
            return GitReport::new(outcome.clone(), vec![executed(display, outcome, result)]);
        }

        // The index is authoritative for conflicts; the printed CONFLICT
        // lines are only a fallback when it cannot be queried.
        let unmerged = self.unmerged_paths().await;
        let outcome = match (&unmerged.value, signal) {
            (Some(paths), _) if !paths.is_empty() => GitOutcome::MergeConflict {
                paths: paths.clone(),
            },
            (_, Some(Signal::Conflict)) => GitOutcome::MergeConflict {
                paths: classify::conflict_paths(&output.combined()),
            },
            _ => GitOutcome::GitError {
                message: classify::failure_message(&output),
                exit_code: output.exit_code,
            },
        };

        let mut commands = vec![executed(display, outcome.clone(), result)];
        commands.extend(unmerged.commands);
        GitReport::new(outcome, commands)
    }

    async fn merge_in_progress(&self) -> GitReport<bool> {
        let (display, result) = self
            .exec(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])
            .await;
        let (outcome, value) = match &result {
            Ok(out) if out.exit_code == Some(0) => (GitOutcome::Ok, Some(true)),
            Ok(out) if out.exit_code == Some(1) => (GitOutcome::Ok, Some(false)),
            _ => (default_outcome(&result), None),
        };
        let report = GitReport::new(outcome.clone(), vec![executed(display, outcome, result)]);
        match value {
            Some(v) => report.with_value(v),
            None => report,
        }
    }

    async fn unmerged_paths(&self) -> GitReport<Vec<String>> {
        self.query_lines(&["diff", "--name-only", "--diff-filter=U"])
            .await
    }

    async fn conclude_merge(&self) -> GitReport {
        self.simple(&["commit", "--no-edit"]).await
    }

    async fn abort_merge(&self) -> GitReport {
        self.simple(&["merge", "--abort"]).await
    }

    async fn release_files(&self, paths: &[String]) -> GitReport<Vec<String>> {
        if paths.is_empty() {
            return GitReport::new(GitOutcome::Ok, Vec::new()).with_value(Vec::new());
        }
        let mut args = vec!["ls-files", "-z", "--cached", "--others", "--exclude-standard", "--"];
        args.extend(paths.iter().map(String::as_str));
        let (display, result) = self.exec(&args).await;
        let outcome = default_outcome(&result);
        let value = match &result {
            Ok(out) if out.success() => Some(nul_separated(&out.stdout)),
            _ => None,
        };
        let report = GitReport::new(outcome.clone(), vec![executed(display, outcome, result)]);
        match value {
            Some(v) => report.with_value(v),
            None => report,
        }
    }

    async fn remove_paths(&self, paths: &[String]) -> GitReport {
        if paths.is_empty() {
            return GitReport::new(GitOutcome::Ok, Vec::new());
        }
        let mut args = vec!["rm", "-r", "-f", "--ignore-unmatch", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.simple(&args).await
    }

    async fn commit_all(&self, message: &str) -> GitReport {
        let staged = self.simple(&["add", "-A"]).await;
        if !staged.is_success() {
            return staged;
        }
        let mut commands = staged.commands;

        let (display, result) = self.exec(&["commit", "-m", message]).await;
        let outcome = match &result {
            Ok(out) if !out.success()
                && classify::classify(&classify::COMMIT_RULES, out)
                    == Some(Signal::NothingToCommit) =>
            {
                GitOutcome::NothingToCommit
            }
            _ => default_outcome(&result),
        };
        commands.push(executed(display, outcome.clone(), result));
        GitReport::new(outcome, commands)
    }

    async fn push(&self, remote: &str, branch: &str) -> GitReport {
        let (display, result) = self.exec(&["push", "-u", remote, branch]).await;
        let outcome = match &result {
            Ok(out) if !out.success()
                && classify::classify(&classify::PUSH_RULES, out)
                    == Some(Signal::PushRejected) =>
            {
                GitOutcome::PushRejected {
                    reason: rejection_reason(out),
                }
            }
            _ => default_outcome(&result),
        };
        GitReport::new(outcome.clone(), vec![executed(display, outcome, result)])
    }

    async fn reset_hard(&self, reference: &str) -> GitReport {
        self.destructive(&["reset", "--hard", reference]).await
    }

    async fn clean(&self) -> GitReport {
        self.destructive(&["clean", "-fd"]).await
    }

    async fn delete_branch(&self, name: &str) -> GitReport {
        self.simple(&["branch", "-D", name]).await
    }
}

fn executed(
    command: String,
    outcome: GitOutcome,
    result: std::result::Result<CommandOutput, SpawnError>,
) -> ExecutedCommand {
    ExecutedCommand {
        command,
        outcome,
        result,
    }
}

fn default_outcome(result: &std::result::Result<CommandOutput, SpawnError>) -> GitOutcome {
    match result {
        Ok(out) if out.success() => GitOutcome::Ok,
        Ok(out) => GitOutcome::GitError {
            message: classify::failure_message(out),
            exit_code: out.exit_code,
        },
        Err(e) => GitOutcome::SpawnError(e.clone()),
    }
}

/// `-z` output, de-duplicated (a file can be listed as cached and other)
fn nul_separated(stdout: &str) -> Vec<String> {
    let mut files: Vec<String> = stdout
        .split('\0')
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    files.sort();
    files.dedup();
    files
}

/// The `! [rejected]` line if present, otherwise the last error line
fn rejection_reason(output: &CommandOutput) -> String {
    output
        .combined()
        .lines()
        .map(str::trim)
        .find(|line| line.contains("[rejected]"))
        .map(str::to_string)
        .unwrap_or_else(|| classify::failure_message(output))
}

fn display_command(args: &[String]) -> String {
    let mut parts = vec!["git".to_string()];
    for arg in args {
        if arg.is_empty() || arg.chars().any(char::is_whitespace) {
            parts.push(format!("'{}'", arg.replace('\'', "'\\''")));
        } else {
            parts.push(arg.clone());
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let args = vec![
            "commit".to_string(),
            "-m".to_string(),
            "Release 1.2.0".to_string(),
        ];
        assert_eq!(display_command(&args), "git commit -m 'Release 1.2.0'");
    }

    #[test]
    fn nul_separated_listing() {
        assert_eq!(
            nul_separated("deploy/a.yaml\0.gitlab-ci.yml\0deploy/a.yaml\0"),
            vec![".gitlab-ci.yml".to_string(), "deploy/a.yaml".to_string()]
        );
        assert!(nul_separated("").is_empty());
    }

    #[test]
    fn rejection_reason_prefers_rejected_line() {
        let out = CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: " ! [rejected]        release/prod-1.2.0 -> release/prod-1.2.0 (non-fast-forward)\nerror: failed to push some refs\n".to_string(),
            duration: std::time::Duration::ZERO,
        };
        assert_eq!(
            rejection_reason(&out),
            "! [rejected]        release/prod-1.2.0 -> release/prod-1.2.0 (non-fast-forward)"
        );
    }
}
