//! Starting, stopping and probing the video-understanding backend.
//!
//! The backend is either a Python process we spawn on this machine or a
//! remote GPU service somebody else runs. Both speak the same JSON-over-HTTP
//! protocol, so [`BackendClient`] is shared and only process control differs.

mod client;
mod process;
mod request;
mod snapshot;

pub use client::BackendClient;
pub use process::{BackendEndpoint, ProcessSupervisor, SupervisorConfig};
pub use request::{BackendRequest, SUPPORTED_VIDEO_EXTENSIONS};
pub use snapshot::ServiceSnapshot;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Backend is unreachable: {0}")]
    Unreachable(String),
    #[error("Backend did not answer within {0:?}")]
    Timeout(Duration),
    /// Failure text reported by the backend itself, passed through untouched
    #[error("{0}")]
    Rejected(String),
    #[error("Unexpected backend response: {0}")]
    InvalidResponse(String),
    #[error("Failed to launch backend '{program}': {reason}")]
    Spawn { program: String, reason: String },
    #[error("Backend process exited during startup ({}): {stderr}", code.map_or("signal".to_string(), |c| format!("code {}", c)))]
    ProcessExited { code: Option<i32>, stderr: String },
    #[error("Backend did not become reachable within {0:?}")]
    StartupTimeout(Duration),
    #[error("Model files are missing: {0:?}")]
    ModelFilesMissing(PathBuf),
    #[error("Unsupported video file {0:?}. Supported formats: mp4, avi, mov, mkv, wmv, flv, webm")]
    UnsupportedVideo(PathBuf),
    #[error("Failed to read {path:?}: {reason}")]
    ReadFile { path: PathBuf, reason: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BackendError {
    /// Errors that mean "the backend is not there right now" rather than
    /// "the backend said no".
    pub fn is_connectivity(&self) -> bool {
        matches!(self, BackendError::Unreachable(_) | BackendError::Timeout(_))
    }
}

/// Process control plus the pass-through request channel.
///
/// The controller only ever talks to this trait so tests can substitute a
/// scripted fake.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Bring the backend up and initialize it. Succeeds without side effects
    /// when the backend is already running.
    async fn start(&self) -> Result<String, BackendError>;

    async fn stop(&self) -> Result<String, BackendError>;

    /// Live probe. A backend that cannot be reached reports as not running.
    async fn status(&self) -> ServiceSnapshot;

    async fn load_model(&self) -> Result<(), BackendError>;

    async fn release_model(&self) -> Result<(), BackendError>;

    /// Forward a request to whichever backend is active. No retries.
    async fn forward(&self, request: BackendRequest) -> Result<serde_json::Value, BackendError>;
}
