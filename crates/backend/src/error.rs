use derive_more::From;
use serde::Serialize;

use crate::config::ConfigError;
use crate::controller::StateConflict;
use crate::downloads::DownloadError;
use crate::sessions::SessionError;
use crate::supervisor::BackendError;

#[derive(Debug, From, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(ConfigError),

    #[error(transparent)]
    StateConflict(StateConflict),

    #[error(transparent)]
    Download(DownloadError),

    #[error(transparent)]
    Backend(BackendError),

    #[error(transparent)]
    Session(SessionError),
}

/// Coarse error taxonomy shown to the UI next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, specta::Type, strum::Display)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Configuration,
    TransientConnectivity,
    Download,
    StateConflict,
    StorageIntegrity,
    Backend,
    Storage,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::StateConflict(_) => ErrorKind::StateConflict,
            Error::Download(_) => ErrorKind::Download,
            Error::Backend(BackendError::Config(_)) => ErrorKind::Configuration,
            Error::Backend(e) if e.is_connectivity() => ErrorKind::TransientConnectivity,
            Error::Backend(_) => ErrorKind::Backend,
            Error::Session(SessionError::Config(_)) => ErrorKind::Configuration,
            Error::Session(SessionError::Corrupt { .. }) => ErrorKind::StorageIntegrity,
            Error::Session(_) => ErrorKind::Storage,
        }
    }
}
