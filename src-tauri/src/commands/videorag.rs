use std::path::PathBuf;

use serde_json::Value;
use tauri::AppHandle;
use vimo_backend::supervisor::BackendRequest;
use vimo_backend::CommandResponse;

use super::controller;

// ===== BACKEND PASS-THROUGH COMMANDS =====
// None of these are gated on the service state; an unreachable backend
// comes back as an error in the envelope.

#[tauri::command]
#[specta::specta]
pub async fn videorag_upload_video(
    app: AppHandle,
    session_id: String,
    video_paths: Vec<PathBuf>,
    base_storage_path: PathBuf,
) -> CommandResponse<Value> {
    controller(&app)
        .forward(BackendRequest::UploadVideos {
            session_id,
            video_paths,
            base_storage_path,
        })
        .await
}

#[tauri::command]
#[specta::specta]
pub async fn videorag_get_status(app: AppHandle, session_id: String) -> CommandResponse<Value> {
    controller(&app)
        .forward(BackendRequest::SessionStatus { session_id })
        .await
}

#[tauri::command]
#[specta::specta]
pub async fn videorag_query(app: AppHandle, session_id: String, query: String) -> CommandResponse<Value> {
    controller(&app)
        .forward(BackendRequest::Query { session_id, query })
        .await
}

#[tauri::command]
#[specta::specta]
pub async fn videorag_system_status(app: AppHandle) -> CommandResponse<Value> {
    controller(&app).forward(BackendRequest::SystemStatus).await
}

#[tauri::command]
#[specta::specta]
pub async fn videorag_delete_session(app: AppHandle, session_id: String) -> CommandResponse<Value> {
    controller(&app)
        .forward(BackendRequest::DeleteSession { session_id })
        .await
}

/// Any other backend request: jobs, scene detection, model info, config, progress
#[tauri::command]
#[specta::specta]
pub async fn videorag_forward(app: AppHandle, request: BackendRequest) -> CommandResponse<Value> {
    controller(&app).forward(request).await
}
