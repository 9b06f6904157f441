use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type, strum::Display)]
#[serde(rename_all = "camelCase")]
pub enum DownloadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Bookkeeping for one download call. Never persisted: after a restart the
/// file on disk is the only truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    pub target_path: PathBuf,
    pub url: String,
    pub downloaded_bytes: u64,
    /// `None` when the server sent no content length
    pub total_bytes: Option<u64>,
    pub status: DownloadStatus,
}

impl DownloadTask {
    pub fn new(url: &str, target_path: PathBuf) -> Self {
        Self {
            target_path,
            url: url.to_string(),
            downloaded_bytes: 0,
            total_bytes: None,
            status: DownloadStatus::Pending,
        }
    }

    /// Percentage complete, if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => Some((self.downloaded_bytes as f64 / total as f64) * 100.0),
            _ => None,
        }
    }
}
