use serde::{Deserialize, Serialize};

/// Events a download emits to its subscriber, in order:
/// `Started`, zero or more `Progress`, then exactly one terminal event.
///
/// `Progress` is only sent when the server announced a content length;
/// without it the transfer is indeterminate and the UI shows a spinner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DownloadEvent {
    #[serde(rename_all = "camelCase")]
    Started { total_bytes: Option<u64> },
    #[serde(rename_all = "camelCase")]
    Progress {
        downloaded_bytes: u64,
        total_bytes: u64,
        percentage: f64,
    },
    Complete,
    Cancelled,
    Error { error: String },
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Complete | DownloadEvent::Cancelled | DownloadEvent::Error { .. }
        )
    }
}
