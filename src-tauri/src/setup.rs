use std::sync::Arc;

use log::{error, info, warn};
use tauri::Manager;
use tauri_plugin_store::StoreExt;
use vimo_backend::config::{self as settings, AppSettings};
use vimo_backend::downloads::DownloadManager;
use vimo_backend::models::INTERNVIDEO2_CHECKPOINT;
use vimo_backend::sessions::SessionStore;
use vimo_backend::supervisor::{ProcessSupervisor, SupervisorConfig};
use vimo_backend::LifecycleController;

use crate::{config, events, keychain};

pub fn setup_app(app: &mut tauri::App<tauri::Wry>) -> Result<(), Box<dyn std::error::Error>> {
    info!("Vimo v{}", env!("CARGO_PKG_VERSION"));

    // Settings are read once; edits take effect on the next launch
    let store = app.store(config::STORE_FILE)?;
    let config_store = config::Config::new(store);
    let app_settings = settings::load_app_settings(&config_store);

    let api_key = keychain::load_remote_api_key().unwrap_or_else(|e| {
        warn!("Continuing without remote API key: {}", e);
        None
    });

    let supervisor_config = match SupervisorConfig::from_settings(&app_settings, api_key) {
        Ok(supervisor_config) => supervisor_config,
        Err(e) => {
            // Keep the store directory so sessions still work
            error!("Invalid backend settings, using defaults: {}", e);
            let fallback = AppSettings {
                store_directory: app_settings.store_directory.clone(),
                ..AppSettings::default()
            };
            SupervisorConfig::from_settings(&fallback, None)?
        }
    };
    info!(
        "Backend endpoint: {} ({})",
        supervisor_config.base_url(),
        if supervisor_config.is_remote() { "remote" } else { "local" }
    );

    let sessions = Arc::new(SessionStore::new());
    match &app_settings.store_directory {
        Some(dir) => sessions.configure(dir.clone())?,
        None => warn!("Store directory not configured yet"),
    }

    let controller = Arc::new(LifecycleController::new(
        Arc::new(ProcessSupervisor::new(supervisor_config)?),
        Arc::new(DownloadManager::new()),
        sessions,
        INTERNVIDEO2_CHECKPOINT.resolve_url(&app_settings.models),
    ));

    app.manage(config_store);
    app.manage(controller.clone());

    // Push every state change to the webview
    tauri::async_runtime::spawn(events::forward_service_state(
        app.handle().clone(),
        controller.subscribe(),
    ));

    // A backend may already be up from an earlier session
    tauri::async_runtime::spawn(async move {
        let state = controller.check_service_status().await;
        if let Some(state) = state.data {
            info!(
                "Initial backend status: running={}, model loaded={}",
                state.is_running, state.intern_video2_loaded
            );
        }
    });

    Ok(())
}

/// Stop a backend this app spawned. Remote services are left alone.
pub fn shutdown(app: &tauri::AppHandle) {
    let Some(controller) = app.try_state::<Arc<LifecycleController>>() else {
        return;
    };
    if !controller.state().is_running {
        return;
    }

    info!("App exiting, stopping backend...");
    let response = tauri::async_runtime::block_on(controller.stop_service());
    if let Some(e) = response.error {
        error!("Failed to stop backend on exit: {}", e);
    }
}
