//! Output classification for git commands.
//!
//! Git's exit codes are coarse: a conflicted merge and a broken merge both
//! exit 1. Each operation therefore has a small ordered table of
//! pattern -> signal rules evaluated against the command's combined output;
//! the first matching rule wins. The process runner pins `LC_ALL=C`, so the
//! patterns only need to cover git's English messages.

use crate::git::runner::CommandOutput;
use regex::Regex;
use std::sync::LazyLock;

/// What a rule recognised in a command's output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Merge stopped on conflicting changes
    Conflict,
    /// Reference does not exist
    BranchNotFound,
    /// Commit had nothing staged
    NothingToCommit,
    /// Remote refused a non-fast-forward update
    PushRejected,
    /// A previous merge is still waiting to be concluded
    MergeInProgress,
}

/// One pattern -> signal rule
#[derive(Debug)]
pub struct Rule {
    /// Signal produced when the pattern matches
    pub signal: Signal,
    pattern: Regex,
}

impl Rule {
    fn new(pattern: &str, signal: Signal) -> Self {
        // Patterns are compile-time constants covered by the tests below.
        let pattern = Regex::new(pattern).expect("classifier pattern must compile");
        Self { signal, pattern }
    }

    /// Whether this rule matches `text`
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Rules for `git checkout` / `git checkout -B`
pub static CHECKOUT_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(r"did not match any file\(s\) known to git", Signal::BranchNotFound),
        Rule::new(r"(?m)^fatal: invalid reference:", Signal::BranchNotFound),
        Rule::new(r"is not a commit and a branch .* cannot be created", Signal::BranchNotFound),
        Rule::new(r"(?m)^fatal: '[^']+' is not a commit", Signal::BranchNotFound),
    ]
});

/// Rules for `git merge`
pub static MERGE_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(r"(?m)^CONFLICT \(", Signal::Conflict),
        Rule::new(r"Automatic merge failed; fix conflicts", Signal::Conflict),
        Rule::new(r"You have not concluded your merge", Signal::MergeInProgress),
        Rule::new(r"Merging is not possible because you have unmerged files", Signal::MergeInProgress),
        Rule::new(r"not something we can merge", Signal::BranchNotFound),
    ]
});

/// Rules for `git commit`
pub static COMMIT_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(r"nothing to commit", Signal::NothingToCommit),
        Rule::new(r"nothing added to commit", Signal::NothingToCommit),
        Rule::new(r"no changes added to commit", Signal::NothingToCommit),
    ]
});

/// Rules for `git push`
pub static PUSH_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(r"\[rejected\]", Signal::PushRejected),
        Rule::new(r"\(non-fast-forward\)", Signal::PushRejected),
        Rule::new(r"\(fetch first\)", Signal::PushRejected),
        Rule::new(r"Updates were rejected", Signal::PushRejected),
    ]
});

static CONFLICT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^CONFLICT \([^)]*\): (?:Merge conflict in (?P<content>.+?)\s*$|(?P<deleted>\S+) deleted in )",
    )
    .expect("conflict path pattern must compile")
});

/// First signal whose rule matches the command's combined output
pub fn classify(rules: &[Rule], output: &CommandOutput) -> Option<Signal> {
    let text = output.combined();
    rules.iter().find(|rule| rule.matches(&text)).map(|rule| rule.signal)
}

/// Conflicted paths named in `git merge` output.
///
/// Covers content conflicts (`Merge conflict in <path>`) and
/// modify/delete conflicts (`<path> deleted in <ref>`). Paths are returned
/// in first-seen order without duplicates.
pub fn conflict_paths(text: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for caps in CONFLICT_PATH.captures_iter(text) {
        let path = caps
            .name("content")
            .or_else(|| caps.name("deleted"))
            .map(|m| m.as_str().to_string());
        if let Some(path) = path
            && !paths.contains(&path)
        {
            paths.push(path);
        }
    }
    paths
}

/// Non-empty, trimmed lines of a command's stdout
pub fn lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Last non-empty line of stderr (or stdout), used as a short failure message
pub fn failure_message(output: &CommandOutput) -> String {
    let source = if output.stderr.trim().is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };
    source
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("exit status {:?}", output.exit_code))
}
