//! Large-artifact downloads with progress events and all-or-nothing cleanup.

mod events;
mod manager;
mod task;

pub use events::DownloadEvent;
pub use manager::{DownloadHandle, DownloadManager, DEFAULT_INACTIVITY_TIMEOUT};
pub use task::{DownloadStatus, DownloadTask};

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("Download failed with status: {status}")]
    Http { status: u16 },
    #[error("Download error: {0}")]
    Network(String),
    #[error("Failed to write chunk: {0}")]
    Write(String),
    #[error("Download stalled: no data received for {0:?}")]
    Timeout(Duration),
    #[error("Download cancelled")]
    Cancelled,
    #[error("Failed to create directory {path:?}: {reason}")]
    CreateDir { path: PathBuf, reason: String },
    #[error("Invalid download destination: {0:?}")]
    InvalidDestination(PathBuf),
    #[error("A download to {0:?} is already in progress")]
    AlreadyInProgress(PathBuf),
    #[error("No active download for {0:?}")]
    NotActive(PathBuf),
    #[error("Download task failed: {0}")]
    TaskFailed(String),
}
