use std::path::PathBuf;
use std::sync::Arc;

use tauri::{AppHandle, State};
use tokio::sync::mpsc;
use vimo_backend::models::ModelFilesStatus;
use vimo_backend::{CommandResponse, LifecycleController};

use super::controller;
use crate::events;

// ===== MODEL FILE COMMANDS =====

#[tauri::command]
#[specta::specta]
pub fn check_model_files(
    controller: State<'_, Arc<LifecycleController>>,
    store_directory: PathBuf,
) -> CommandResponse<ModelFilesStatus> {
    controller.check_model_files(&store_directory)
}

/// Download the checkpoint into `<storeDirectory>/checkpoints`.
/// Progress arrives as `ModelDownloadStateChanged` events.
#[tauri::command]
#[specta::specta]
pub async fn download_model(app: AppHandle, store_directory: PathBuf) -> CommandResponse<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let forwarder = tauri::async_runtime::spawn(events::forward_download_events(app.clone(), rx));

    let response = controller(&app)
        .download_model(&store_directory, Some(&tx))
        .await;

    // Closing the channel lets the forwarder flush and exit
    drop(tx);
    if let Err(e) = forwarder.await {
        log::warn!("Download event forwarder failed: {}", e);
    }

    response
}

#[tauri::command]
#[specta::specta]
pub fn cancel_model_download(
    controller: State<'_, Arc<LifecycleController>>,
    store_directory: PathBuf,
) -> CommandResponse<()> {
    controller.cancel_model_download(&store_directory)
}
