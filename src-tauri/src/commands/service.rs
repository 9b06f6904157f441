use std::sync::Arc;

use tauri::{AppHandle, State};
use vimo_backend::{CommandResponse, LifecycleController, LoadingFlags, ServiceState};

use super::controller;

// ===== SERVICE LIFECYCLE COMMANDS =====

#[tauri::command]
#[specta::specta]
pub async fn start_service(app: AppHandle) -> CommandResponse<ServiceState> {
    controller(&app).start_service().await
}

#[tauri::command]
#[specta::specta]
pub async fn stop_service(app: AppHandle) -> CommandResponse<ServiceState> {
    controller(&app).stop_service().await
}

/// Live probe of the backend; the believed state is updated from it
#[tauri::command]
#[specta::specta]
pub async fn service_status(app: AppHandle) -> CommandResponse<ServiceState> {
    controller(&app).check_service_status().await
}

#[tauri::command]
#[specta::specta]
pub async fn load_model(app: AppHandle) -> CommandResponse<ServiceState> {
    controller(&app).load_model().await
}

#[tauri::command]
#[specta::specta]
pub async fn release_model(app: AppHandle) -> CommandResponse<ServiceState> {
    controller(&app).release_model().await
}

#[tauri::command]
#[specta::specta]
pub async fn model_status(app: AppHandle) -> CommandResponse<ServiceState> {
    controller(&app).check_model_status().await
}

// ===== SNAPSHOTS (no backend I/O) =====

#[tauri::command]
#[specta::specta]
pub fn get_service_state(controller: State<'_, Arc<LifecycleController>>) -> ServiceState {
    controller.state()
}

#[tauri::command]
#[specta::specta]
pub fn get_loading_flags(controller: State<'_, Arc<LifecycleController>>) -> LoadingFlags {
    controller.loading_flags()
}
