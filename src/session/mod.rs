//! Release session model and persistence.
//!
//! A session is the explicit record of one release run. It is passed to every
//! engine operation and saved after every step, so a run can be resumed after
//! a conflict, a rejected push or a process restart.

mod release_session;
mod store;

pub use release_session::{
    Environment, LogEntry, LogOutcome, MergeRequestRef, ReleaseRequest, ReleaseSession,
    ReleaseStep, SESSION_FORMAT_VERSION, SessionStatus, SuspendReason, tag_for,
};
pub use store::{LoadOutcome, SESSION_FILE_NAME, SessionStore};

pub(crate) use store::write_atomic;
