use std::sync::Arc;

use log::{info, warn};
use secrecy::SecretString;
use tauri::State;
use vimo_backend::config::{self as settings, AppSettings};
use vimo_backend::LifecycleController;

use crate::{config, keychain};

// ===== SETTINGS COMMANDS =====

#[tauri::command]
#[specta::specta]
pub fn load_app_settings(config_store: State<config::Config>) -> Result<AppSettings, String> {
    Ok(settings::load_app_settings(config_store.inner()))
}

/// Validate and persist settings. Backend settings apply on the next launch.
#[tauri::command]
#[specta::specta]
pub fn save_app_settings(
    config_store: State<config::Config>,
    controller: State<'_, Arc<LifecycleController>>,
    app_settings: AppSettings,
) -> Result<(), String> {
    let store_directory = app_settings.store_directory.clone();
    settings::save_app_settings(config_store.inner(), app_settings).map_err(|e| e.to_string())?;

    // First-run setup picks a store directory; sessions can use it right away
    if let Some(dir) = store_directory {
        if !controller.sessions().storage_info().is_configured {
            info!("Store directory set to {:?}", dir);
            controller.sessions().configure(dir).map_err(|e| e.to_string())?;
        } else if controller.sessions().storage_info().store_directory.as_ref() != Some(&dir) {
            warn!("Store directory changed to {:?}; applies after restart", dir);
        }
    }

    Ok(())
}

#[tauri::command]
#[specta::specta]
pub fn save_remote_api_key(api_key: String) -> Result<(), String> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err("API key cannot be empty".to_string());
    }

    keychain::save_remote_api_key(&SecretString::from(api_key.to_string())).map_err(|e| e.to_string())
}

#[tauri::command]
#[specta::specta]
pub fn delete_remote_api_key() -> Result<(), String> {
    keychain::delete_remote_api_key().map_err(|e| e.to_string())
}

#[tauri::command]
#[specta::specta]
pub fn has_remote_api_key() -> Result<bool, String> {
    keychain::load_remote_api_key()
        .map(|key| key.is_some())
        .map_err(|e| e.to_string())
}
