//! External command execution.
//!
//! A [`CommandRunner`] runs one program to completion and reports what
//! happened. A non-zero exit status is an ordinary result (a merge conflict
//! exits non-zero); only a failure to start the process is an error.

use crate::error::SpawnError;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Captured result of one finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`None` when terminated by a signal)
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock time from spawn to exit
    pub duration: Duration,
}

impl CommandOutput {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Runs a single external command and waits for it to exit.
pub trait CommandRunner {
    /// Run `program` with `args` inside `workdir`
    fn run(
        &self,
        workdir: &Path,
        program: &str,
        args: &[String],
    ) -> impl Future<Output = Result<CommandOutput, SpawnError>>;
}

impl<R: CommandRunner> CommandRunner for Arc<R> {
    fn run(
        &self,
        workdir: &Path,
        program: &str,
        args: &[String],
    ) -> impl Future<Output = Result<CommandOutput, SpawnError>> {
        (**self).run(workdir, program, args)
    }
}

/// [`CommandRunner`] backed by real OS processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    envs: Vec<(String, String)>,
}

impl ProcessRunner {
    /// Runner with a stable environment for git.
    ///
    /// The C locale keeps git's messages in the form the classifier expects,
    /// and terminal prompts are disabled so a missing credential fails
    /// instead of waiting for input that never comes.
    pub fn new() -> Self {
        Self {
            envs: vec![
                ("LC_ALL".to_string(), "C".to_string()),
                ("LANG".to_string(), "C".to_string()),
                ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
            ],
        }
    }

    /// Add an environment variable for every spawned process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        workdir: &Path,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, SpawnError> {
        log::debug!("running {} {} in {}", program, args.join(" "), workdir.display());

        let started = Instant::now();
        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(workdir)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| SpawnError::from_io(program, &e))?;
        let duration = started.elapsed();

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        };

        log::debug!(
            "{} exited with {:?} after {:.2}s",
            program,
            result.exit_code,
            duration.as_secs_f64()
        );
        Ok(result)
    }
}
