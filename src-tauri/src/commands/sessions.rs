use std::sync::Arc;

use serde_json::Value;
use tauri::{AppHandle, State};
use vimo_backend::sessions::{OrderOperation, SessionSummary, StorageInfo};
use vimo_backend::{CommandResponse, LifecycleController};

use super::controller;

// ===== CHAT SESSION COMMANDS =====

#[tauri::command]
#[specta::specta]
pub async fn chat_sessions_load(app: AppHandle, id: String) -> CommandResponse<Value> {
    controller(&app).load_session(&id).await
}

#[tauri::command]
#[specta::specta]
pub async fn chat_sessions_save(app: AppHandle, id: String, data: Value) -> CommandResponse<()> {
    controller(&app).save_session(&id, data).await
}

#[tauri::command]
#[specta::specta]
pub async fn chat_sessions_list(app: AppHandle) -> CommandResponse<Vec<SessionSummary>> {
    controller(&app).list_sessions().await
}

#[tauri::command]
#[specta::specta]
pub async fn chat_sessions_delete(app: AppHandle, id: String) -> CommandResponse<()> {
    controller(&app).delete_session(&id).await
}

#[tauri::command]
#[specta::specta]
pub fn chat_sessions_get_storage_info(
    controller: State<'_, Arc<LifecycleController>>,
) -> CommandResponse<StorageInfo> {
    controller.storage_info()
}

#[tauri::command]
#[specta::specta]
pub async fn chat_sessions_ensure_storage_directory(app: AppHandle) -> CommandResponse<StorageInfo> {
    controller(&app).ensure_storage_directory().await
}

#[tauri::command]
#[specta::specta]
pub async fn chat_sessions_update_order(
    app: AppHandle,
    ids: Vec<String>,
    operation: OrderOperation,
) -> CommandResponse<Vec<String>> {
    controller(&app).update_session_order(ids, operation).await
}
