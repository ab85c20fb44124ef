//! Removal of excluded paths before the release commit.
//!
//! Patterns are matched against '/'-separated paths relative to the
//! repository root, either literally or as globs. Matching directories are
//! removed as a whole and not descended into. The `.git` directory is never
//! visited.

use crate::git::{ExecutedCommand, GitOperations, GitOutcome};
use glob::Pattern;
use std::path::Path;
use walkdir::WalkDir;

/// Parse newline-delimited exclusion text.
///
/// Blank lines and lines starting with `#` are ignored; surrounding
/// whitespace and a leading `./` are stripped.
pub fn parse_patterns(text: &str) -> Vec<String> {
    normalize_patterns(text.lines())
}

/// Clean up a list of patterns the same way [`parse_patterns`] does
pub fn normalize_patterns<I, S>(patterns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .filter_map(|p| {
            let p = p.as_ref().trim();
            let p = p.strip_prefix("./").unwrap_or(p);
            (!p.is_empty() && !p.starts_with('#')).then(|| p.to_string())
        })
        .collect()
}

/// One exclusion pattern
#[derive(Debug, Clone)]
struct Matcher {
    literal: String,
    glob: Option<Pattern>,
}

impl Matcher {
    fn new(pattern: &str) -> Self {
        let literal = pattern.trim_end_matches('/').to_string();
        // Anything that is not a valid glob is only matched literally.
        let glob = Pattern::new(&literal).ok();
        Self { literal, glob }
    }

    fn matches(&self, relative: &str) -> bool {
        relative == self.literal || self.glob.as_ref().is_some_and(|g| g.matches(relative))
    }
}

/// Paths in `root` matched by `patterns`, sorted and de-duplicated
pub fn resolve_matches(root: &Path, patterns: &[String]) -> Vec<String> {
    let matchers: Vec<Matcher> = patterns.iter().map(|p| Matcher::new(p)).collect();
    if matchers.is_empty() {
        return Vec::new();
    }

    let mut matched = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping unreadable path during exclusion scan: {}", e);
                continue;
            }
        };

        let Some(relative) = relative_path(root, entry.path()) else {
            continue;
        };

        if relative == ".git" {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        if matchers.iter().any(|m| m.matches(&relative)) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            matched.push(relative);
        }
    }

    matched.sort();
    matched.dedup();
    matched
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Result of applying exclusions
#[derive(Debug, Clone)]
pub struct ExclusionReport {
    /// Paths that were removed
    pub removed: Vec<String>,
    /// Overall outcome
    pub outcome: GitOutcome,
    /// Git commands issued, in order
    pub commands: Vec<ExecutedCommand>,
}

impl ExclusionReport {
    fn nothing(commands: Vec<ExecutedCommand>) -> Self {
        Self {
            removed: Vec::new(),
            outcome: GitOutcome::Ok,
            commands,
        }
    }
}

/// Whether `file` is `path` or lies below it
fn covers(path: &str, file: &str) -> bool {
    file == path
        || file
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Remove every path matched by `patterns` from the index and working tree.
///
/// Only files git would put in a commit are touched: tracked files and
/// untracked files that are not ignored. Ignored files (build output, local
/// logs) stay where they are even when a pattern matches them. Unmatched
/// patterns are skipped, so running this twice removes nothing the second
/// time.
pub async fn apply_exclusions<G: GitOperations>(git: &G, patterns: &[String]) -> ExclusionReport {
    let root = git.workdir().to_path_buf();
    let matched = resolve_matches(&root, patterns);
    if matched.is_empty() {
        log::debug!("no paths matched {} exclusion pattern(s)", patterns.len());
        return ExclusionReport::nothing(Vec::new());
    }

    let listed = git.release_files(&matched).await;
    let mut commands = listed.commands;
    let files = match (listed.outcome, listed.value) {
        (GitOutcome::Ok, Some(files)) => files,
        (outcome, _) => {
            return ExclusionReport {
                removed: Vec::new(),
                outcome,
                commands,
            };
        }
    };

    let removed: Vec<String> = matched
        .into_iter()
        .filter(|path| files.iter().any(|file| covers(path, file)))
        .collect();
    if removed.is_empty() {
        log::debug!("excluded paths are all ignored by git; nothing to remove");
        return ExclusionReport::nothing(commands);
    }

    log::info!("removing {} excluded path(s)", removed.len());
    let report = git.remove_paths(&removed).await;
    commands.extend(report.commands);

    if report.outcome.is_success() {
        // `git rm` leaves untracked files behind; delete those it listed.
        for file in &files {
            let path = root.join(file);
            if path.is_file() || path.is_symlink() {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("could not delete untracked {}: {}", path.display(), e);
                }
            }
        }
        for relative in &removed {
            let path = root.join(relative);
            if path.is_dir() {
                // Still holds ignored files when this fails.
                let _ = std::fs::remove_dir(&path);
            }
        }
    }

    ExclusionReport {
        removed,
        outcome: report.outcome,
        commands,
    }
}
