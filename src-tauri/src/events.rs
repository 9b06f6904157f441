//! Typesafe events emitted to the webview.
//!
//! These events are emitted from Rust and can be listened to in TypeScript
//! with full type safety via tauri-specta.

use serde::{Deserialize, Serialize};
use tauri::AppHandle;
use tauri_specta::Event;
use tokio::sync::{mpsc, watch};
use vimo_backend::downloads::DownloadEvent;
use vimo_backend::ServiceState;

/// Model download state change event - single event stream for the checkpoint download
#[derive(Debug, Clone, Serialize, Deserialize, specta::Type, tauri_specta::Event)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ModelDownloadStateChanged {
    /// Transfer accepted by the server; `totalBytes` is absent when unknown
    #[serde(rename = "started")]
    Started {
        #[serde(rename = "totalBytes")]
        total_bytes: Option<u64>,
    },
    /// Download is in progress
    #[serde(rename = "progress")]
    Progress {
        #[serde(rename = "downloadedBytes")]
        downloaded_bytes: u64,
        #[serde(rename = "totalBytes")]
        total_bytes: u64,
        percentage: f64,
    },
    /// Checkpoint is in place
    #[serde(rename = "complete")]
    Complete,
    /// Cancelled by the user; partial files were removed
    #[serde(rename = "cancelled")]
    Cancelled,
    /// Download failed; partial files were removed
    #[serde(rename = "error")]
    Error { error: String },
}

impl From<DownloadEvent> for ModelDownloadStateChanged {
    fn from(event: DownloadEvent) -> Self {
        match event {
            DownloadEvent::Started { total_bytes } => Self::Started { total_bytes },
            DownloadEvent::Progress {
                downloaded_bytes,
                total_bytes,
                percentage,
            } => Self::Progress {
                downloaded_bytes,
                total_bytes,
                percentage,
            },
            DownloadEvent::Complete => Self::Complete,
            DownloadEvent::Cancelled => Self::Cancelled,
            DownloadEvent::Error { error } => Self::Error { error },
        }
    }
}

/// Believed service state changed, from a transition or a status check
#[derive(Debug, Clone, Serialize, Deserialize, specta::Type, tauri_specta::Event)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStateChanged {
    pub state: ServiceState,
}

/// Emit every download event until the sender side is dropped.
pub async fn forward_download_events(app: AppHandle, mut rx: mpsc::UnboundedReceiver<DownloadEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = ModelDownloadStateChanged::from(event).emit(&app) {
            log::warn!("Failed to emit download event: {}", e);
        }
    }
}

/// Emit the controller's state on every change for the lifetime of the app.
pub async fn forward_service_state(app: AppHandle, mut changes: watch::Receiver<ServiceState>) {
    while changes.changed().await.is_ok() {
        let state = changes.borrow_and_update().clone();
        if let Err(e) = (ServiceStateChanged { state }).emit(&app) {
            log::warn!("Failed to emit service state: {}", e);
        }
    }
}
