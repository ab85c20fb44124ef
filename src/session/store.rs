//! Session persistence.
//!
//! One well-known JSON file holds the in-progress session. Every save goes
//! through a temp file that is fsynced and renamed over the target, so a crash
//! leaves either the previous snapshot or the new one, never a torn file.

use crate::error::{Result, SessionError};
use crate::session::{ReleaseSession, SESSION_FORMAT_VERSION};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the session snapshot inside the data directory
pub const SESSION_FILE_NAME: &str = "session.json";

/// What `load` found on disk
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// No session file
    None,
    /// Active, Suspended or Failed session that can be continued or aborted
    Resumable(ReleaseSession),
    /// Completed or Aborted session whose completion did not finish clearing
    Terminal(ReleaseSession),
}

/// Persistent store for the single in-progress session
#[derive(Debug, Clone)]
pub struct SessionStore {
    /// Path to session file
    session_file_path: PathBuf,
}

impl SessionStore {
    /// Store keeping its file in `data_dir`
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            session_file_path: data_dir.as_ref().join(SESSION_FILE_NAME),
        }
    }

    /// Path of the session file
    pub fn path(&self) -> &Path {
        &self.session_file_path
    }

    /// Check if a session file exists
    pub fn exists(&self) -> bool {
        self.session_file_path.exists()
    }

    /// Atomically replace the stored session
    pub fn save(&self, session: &ReleaseSession) -> Result<()> {
        if session.format_version != SESSION_FORMAT_VERSION {
            return Err(SessionError::VersionMismatch {
                expected: SESSION_FORMAT_VERSION,
                found: session.format_version,
            }
            .into());
        }

        let serialized =
            serde_json::to_string_pretty(session).map_err(|e| SessionError::SaveFailed {
                reason: format!("Failed to serialize session: {}", e),
            })?;

        write_atomic(&self.session_file_path, serialized.as_bytes()).map_err(|e| {
            SessionError::SaveFailed {
                reason: format!("{}: {}", self.session_file_path.display(), e),
            }
        })?;

        log::debug!(
            "saved session {} ({} at {})",
            session.id,
            session.status,
            session.current_step
        );
        Ok(())
    }

    /// Load the stored session, if any
    pub fn load(&self) -> Result<LoadOutcome> {
        let contents = match fs::read_to_string(&self.session_file_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoadOutcome::None),
            Err(e) => {
                return Err(SessionError::LoadFailed {
                    reason: format!("Failed to read {}: {}", self.session_file_path.display(), e),
                }
                .into());
            }
        };

        // Check the format version before the full parse so an old or newer
        // file is reported as a mismatch rather than as corruption.
        let raw: serde_json::Value =
            serde_json::from_str(&contents).map_err(|e| SessionError::Corrupted {
                reason: format!("Failed to parse session file: {}", e),
            })?;
        let found = raw
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| SessionError::Corrupted {
                reason: "missing format_version".to_string(),
            })?;
        if found != u64::from(SESSION_FORMAT_VERSION) {
            return Err(SessionError::VersionMismatch {
                expected: SESSION_FORMAT_VERSION,
                found: u32::try_from(found).unwrap_or(u32::MAX),
            }
            .into());
        }

        let session: ReleaseSession =
            serde_json::from_value(raw).map_err(|e| SessionError::Corrupted {
                reason: format!("Failed to deserialize session: {}", e),
            })?;

        if session.is_terminal() {
            log::warn!(
                "found {} session {} in {}; its completion was interrupted",
                session.status,
                session.id,
                self.session_file_path.display()
            );
            return Ok(LoadOutcome::Terminal(session));
        }

        Ok(LoadOutcome::Resumable(session))
    }

    /// Delete the session file; a missing file is not an error
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.session_file_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::ClearFailed {
                reason: format!("{}: {}", self.session_file_path.display(), e),
            }
            .into()),
        }
    }
}

/// Write `contents` to `path` via a synced temp file and rename
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_file_path = PathBuf::from(temp_name);

    {
        let mut file = fs::File::create(&temp_file_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    fs::rename(&temp_file_path, path)
}
