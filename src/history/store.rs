//! Append-only history of finished releases.
//!
//! Layout under the history directory:
//!
//! - `index.json`: array of [`HistoryEntry`] in insertion order
//! - `<id>.json`: one [`HistoryDetail`] per record
//!
//! The detail is written before the index row, so every id listed in the
//! index has a detail file.

use crate::error::{HistoryError, Result};
use crate::history::ThemeColorSnapshot;
use crate::session::{
    Environment, LogEntry, MergeRequestRef, ReleaseSession, SessionStatus, write_atomic,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Final status of a history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    /// Release MR was created
    Completed,
    /// Operator aborted the release
    Aborted,
}

impl HistoryStatus {
    /// Status for a terminal session status
    pub fn from_session(status: SessionStatus) -> Option<Self> {
        match status {
            SessionStatus::Completed => Some(HistoryStatus::Completed),
            SessionStatus::Aborted => Some(HistoryStatus::Aborted),
            _ => None,
        }
    }
}

impl std::fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryStatus::Completed => write!(f, "completed"),
            HistoryStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// One row of the history index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Session id
    pub id: String,
    /// Tag derived from version and environment
    pub tag: String,
    /// Target environment
    pub environment: Environment,
    /// When the session finished
    pub date_time: chrono::DateTime<chrono::Utc>,
    /// Number of merge requests released
    pub mr_count: usize,
    /// Final status
    pub status: HistoryStatus,
}

/// Full record of one finished session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDetail {
    /// Session id
    pub id: String,
    /// Tag derived from version and environment
    pub tag: String,
    /// Target environment
    pub environment: Environment,
    /// Released version
    pub version: semver::Version,
    /// Release branch name
    pub release_branch: String,
    /// Merge requests in merge order
    pub merge_requests: Vec<MergeRequestRef>,
    /// Release merge request, when one was created
    pub merge_request_url: Option<String>,
    /// Final status
    pub status: HistoryStatus,
    /// Complete command log
    pub log: Vec<LogEntry>,
    /// Color escapes in effect when the log was recorded
    pub theme: ThemeColorSnapshot,
    /// Session start
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Session end
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

/// Build the index row and detail for a Completed or Aborted session
pub fn record_for(
    session: &ReleaseSession,
    theme: ThemeColorSnapshot,
) -> Result<(HistoryEntry, HistoryDetail)> {
    let status = HistoryStatus::from_session(session.status).ok_or_else(|| {
        HistoryError::WriteFailed {
            reason: format!(
                "session {} is {} and cannot be archived",
                session.id, session.status
            ),
        }
    })?;

    let entry = HistoryEntry {
        id: session.id.clone(),
        tag: session.tag(),
        environment: session.environment,
        date_time: session.updated_at,
        mr_count: session.merge_requests.len(),
        status,
    };
    let detail = HistoryDetail {
        id: session.id.clone(),
        tag: session.tag(),
        environment: session.environment,
        version: session.version.clone(),
        release_branch: session.release_branch.clone(),
        merge_requests: session.merge_requests.clone(),
        merge_request_url: session.merge_request_url.clone(),
        status,
        log: session.log.clone(),
        theme,
        started_at: session.created_at,
        finished_at: session.updated_at,
    };
    Ok((entry, detail))
}

/// File-backed history store
#[derive(Debug, Clone)]
pub struct HistoryStore {
    history_dir: PathBuf,
}

impl HistoryStore {
    /// Store under `<data_dir>/history`
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            history_dir: data_dir.as_ref().join("history"),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.history_dir.join("index.json")
    }

    fn detail_path(&self, id: &str) -> Option<PathBuf> {
        let safe = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        safe.then(|| self.history_dir.join(format!("{}.json", id)))
    }

    /// All entries in insertion order
    pub fn load_index(&self) -> Result<Vec<HistoryEntry>> {
        let path = self.index_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HistoryError::ReadFailed {
                    reason: format!("{}: {}", path.display(), e),
                }
                .into());
            }
        };

        let entries = serde_json::from_str(&contents).map_err(|e| HistoryError::Corrupted {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Ok(entries)
    }

    /// Whether a record with `id` is in the index
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.load_index()?.iter().any(|entry| entry.id == id))
    }

    /// Append one record. An id already in the index is left untouched.
    pub fn append(&self, entry: &HistoryEntry, detail: &HistoryDetail) -> Result<()> {
        if entry.id != detail.id {
            return Err(HistoryError::WriteFailed {
                reason: format!("entry id {} does not match detail id {}", entry.id, detail.id),
            }
            .into());
        }

        let mut index = self.load_index()?;
        if index.iter().any(|existing| existing.id == entry.id) {
            log::debug!("history already contains {}; not appending again", entry.id);
            return Ok(());
        }

        let detail_path = self.detail_path(&detail.id).ok_or_else(|| HistoryError::WriteFailed {
            reason: format!("invalid record id '{}'", detail.id),
        })?;
        let serialized =
            serde_json::to_string_pretty(detail).map_err(|e| HistoryError::WriteFailed {
                reason: format!("Failed to serialize detail: {}", e),
            })?;
        write_atomic(&detail_path, serialized.as_bytes()).map_err(|e| {
            HistoryError::WriteFailed {
                reason: format!("{}: {}", detail_path.display(), e),
            }
        })?;

        index.push(entry.clone());
        let serialized =
            serde_json::to_string_pretty(&index).map_err(|e| HistoryError::WriteFailed {
                reason: format!("Failed to serialize index: {}", e),
            })?;
        let index_path = self.index_path();
        write_atomic(&index_path, serialized.as_bytes()).map_err(|e| {
            HistoryError::WriteFailed {
                reason: format!("{}: {}", index_path.display(), e),
            }
        })?;

        log::info!("recorded {} release {} ({})", entry.status, entry.tag, entry.id);
        Ok(())
    }

    /// Detail record for `id`
    pub fn load_detail(&self, id: &str) -> Result<HistoryDetail> {
        let not_found = || HistoryError::NotFound { id: id.to_string() };
        let path = self.detail_path(id).ok_or_else(not_found)?;

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found().into()),
            Err(e) => {
                return Err(HistoryError::ReadFailed {
                    reason: format!("{}: {}", path.display(), e),
                }
                .into());
            }
        };

        let detail = serde_json::from_str(&contents).map_err(|e| HistoryError::Corrupted {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Ok(detail)
    }
}
