//! File-backed chat session persistence with an explicit order list.
//!
//! Layout under the configured store directory:
//! ```text
//! chat-sessions/
//!   order.json            {"order": ["c", "a", "b"]}
//!   sessions/<id>.json    {"id", "data", "lastModified"}
//! ```
//! The order list is authoritative for `list`, and drift against the record
//! files is repaired on read.

mod order;
mod store;
mod types;

pub use order::OrderOperation;
pub use store::SessionStore;
pub use types::{SessionRecord, SessionSummary, StorageInfo};

use std::path::PathBuf;

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Invalid session id {0:?}: use 1-128 letters, digits, '-' or '_'")]
    InvalidId(String),
    #[error("Unknown session ids: {}", .0.join(", "))]
    UnknownIds(Vec<String>),
    #[error("Reorder must list every existing session exactly once")]
    NotAPermutation,
    #[error("Corrupt session file {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("Session storage I/O failed at {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },
}

/// `[A-Za-z0-9_-]{1,128}`: ids become file names.
pub fn validate_id(id: &str) -> Result<(), SessionError> {
    let valid = (1..=128).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidId(id.to_string()))
    }
}
