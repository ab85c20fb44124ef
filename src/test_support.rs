//! Test helpers: a scripted command runner and a recording code host.
//!
//! [`ScriptedRunner`] answers git invocations from a list of rules instead of
//! spawning processes. A rule matches when the first argument equals its
//! subcommand and the joined arguments contain all of its needles. Rules added
//! later win; `once` rules are used up by their first match. Commands no rule
//! matches succeed with empty output.

use crate::codehost::{CodeHost, MergeRequestDraft};
use crate::error::{CodeHostError, SpawnError};
use crate::git::CommandOutput;
use crate::git::CommandRunner;
use crate::session::{Environment, MergeRequestRef, ReleaseRequest};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Canned response for a scripted command
#[derive(Debug, Clone)]
pub enum Reply {
    /// Process ran and exited
    Output(CommandOutput),
    /// Process could not be started
    Spawn(SpawnError),
}

impl Reply {
    /// Exit 0 with `stdout`
    pub fn ok(stdout: &str) -> Self {
        Reply::Output(CommandOutput {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration: Duration::ZERO,
        })
    }

    /// Non-zero exit with the given output
    pub fn fail(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        Reply::Output(CommandOutput {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::ZERO,
        })
    }

    /// Binary missing
    pub fn not_found() -> Self {
        Reply::Spawn(SpawnError::NotFound {
            program: "git".to_string(),
        })
    }
}

#[derive(Debug)]
struct Rule {
    subcommand: String,
    needles: Vec<String>,
    reply: Reply,
    once: bool,
    used: bool,
}

impl Rule {
    fn matches(&self, args: &[String]) -> bool {
        if self.once && self.used {
            return false;
        }
        if args.first().map(String::as_str) != Some(self.subcommand.as_str()) {
            return false;
        }
        let joined = args.join(" ");
        self.needles.iter().all(|needle| joined.contains(needle.as_str()))
    }
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<Rule>,
    calls: Vec<Vec<String>>,
}

/// [`CommandRunner`] that replays scripted replies and records every call
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
}

impl ScriptedRunner {
    /// Runner where every command succeeds with empty output
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn add(&self, subcommand: &str, needles: &[&str], reply: Reply, once: bool) -> &Self {
        self.script().rules.push(Rule {
            subcommand: subcommand.to_string(),
            needles: needles.iter().map(|n| n.to_string()).collect(),
            reply,
            once,
            used: false,
        });
        self
    }

    /// Reply to every matching command
    pub fn on(&self, subcommand: &str, needles: &[&str], reply: Reply) -> &Self {
        self.add(subcommand, needles, reply, false)
    }

    /// Reply to the next matching command only
    pub fn once(&self, subcommand: &str, needles: &[&str], reply: Reply) -> &Self {
        self.add(subcommand, needles, reply, true)
    }

    /// Every call so far, as `git <args>` strings
    pub fn calls(&self) -> Vec<String> {
        self.script()
            .calls
            .iter()
            .map(|args| format!("git {}", args.join(" ")))
            .collect()
    }

    /// Number of calls of `subcommand` whose arguments contain `needle`
    pub fn count(&self, subcommand: &str, needle: &str) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some(subcommand))
            .filter(|args| args.join(" ").contains(needle))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        _workdir: &Path,
        _program: &str,
        args: &[String],
    ) -> Result<CommandOutput, SpawnError> {
        let mut script = self.script();
        script.calls.push(args.to_vec());

        let reply = match script.rules.iter_mut().rev().find(|rule| rule.matches(args)) {
            Some(rule) => {
                rule.used = true;
                rule.reply.clone()
            }
            None => Reply::ok(""),
        };

        match reply {
            Reply::Output(output) => Ok(output),
            Reply::Spawn(error) => Err(error),
        }
    }
}

/// [`CodeHost`] that records drafts and returns predictable URLs
#[derive(Debug, Default)]
pub struct RecordingCodeHost {
    drafts: Mutex<Vec<MergeRequestDraft>>,
    failures: Mutex<VecDeque<CodeHostError>>,
    open: Mutex<Option<String>>,
    lookups: Mutex<usize>,
}

impl RecordingCodeHost {
    /// Host where every call succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail with `error`
    pub fn fail_next(&self, error: CodeHostError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// Report `url` as the already open release merge request
    pub fn set_open_merge_request(&self, url: &str) {
        *self.open.lock().unwrap_or_else(|e| e.into_inner()) = Some(url.to_string());
    }

    /// Number of open merge request lookups
    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drafts received so far, including failed attempts
    pub fn drafts(&self) -> Vec<MergeRequestDraft> {
        self.drafts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl CodeHost for RecordingCodeHost {
    async fn create_merge_request(&self, draft: &MergeRequestDraft) -> Result<String, CodeHostError> {
        let count = {
            let mut drafts = self.drafts.lock().unwrap_or_else(|e| e.into_inner());
            drafts.push(draft.clone());
            drafts.len()
        };

        if let Some(error) = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Err(error);
        }

        Ok(format!(
            "https://gitlab.example.com/projects/{}/-/merge_requests/{}",
            draft.project_id, count
        ))
    }

    async fn find_open_merge_request(
        &self,
        _draft: &MergeRequestDraft,
    ) -> Result<Option<String>, CodeHostError> {
        *self.lookups.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(self.open.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// Merge request in project `42` targeting `develop`
pub fn merge_request(iid: u64, source_branch: &str, title: &str) -> MergeRequestRef {
    MergeRequestRef {
        project_id: "42".to_string(),
        source_branch: source_branch.to_string(),
        target_branch: "develop".to_string(),
        iid,
        title: title.to_string(),
    }
}

/// Release request with no exclusion patterns
pub fn release_request(
    environment: Environment,
    version: &str,
    merge_requests: Vec<MergeRequestRef>,
) -> ReleaseRequest {
    ReleaseRequest {
        environment,
        version: version.to_string(),
        merge_requests,
        exclude_patterns: Vec::new(),
    }
}
