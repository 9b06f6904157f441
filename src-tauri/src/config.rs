use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use vimo_backend::config::{ConfigError, ConfigKey, ConfigStore};

/// File name of the settings store in the app data directory
pub const STORE_FILE: &str = "config.json";

/// Type-safe configuration store that wraps the Tauri plugin store
#[derive(Clone)]
pub struct Config {
    store: Arc<tauri_plugin_store::Store<tauri::Wry>>,
}

impl Config {
    pub fn new(store: Arc<tauri_plugin_store::Store<tauri::Wry>>) -> Self {
        Self { store }
    }
}

impl ConfigStore for Config {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        self.store
            .get(key.key_name())
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError> {
        let persist_error = |reason: String| ConfigError::Persist {
            key: key.key_name(),
            reason,
        };

        let val = serde_json::to_value(value).map_err(|e| persist_error(e.to_string()))?;
        self.store.set(key.key_name(), val);
        self.store.save().map_err(|e| persist_error(e.to_string()))
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError> {
        self.store.delete(key.key_name());
        self.store.save().map_err(|e| ConfigError::Persist {
            key: key.key_name(),
            reason: e.to_string(),
        })
    }
}
