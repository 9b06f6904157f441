use std::marker::PhantomData;
use std::path::PathBuf;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Storage directory is not configured")]
    StorageNotConfigured,
    #[error("Storage directory is already configured as {0:?}")]
    StorageAlreadyConfigured(PathBuf),
    #[error("Storage directory {0:?} does not exist")]
    StorageMissing(PathBuf),
    #[error("Invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },
    #[error("Failed to persist '{key}': {reason}")]
    Persist { key: &'static str, reason: String },
}

/// Where the backend lives: a process we spawn, or a service someone else runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, specta::Type)]
#[serde(rename_all = "camelCase")]
pub enum BackendMode {
    #[default]
    Local,
    Remote,
}

/// How to launch the local Python backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, specta::Type)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalBackendConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["videorag_api.py".to_string()],
            working_dir: None,
            host: "127.0.0.1".to_string(),
            port: 64451,
        }
    }
}

impl LocalBackendConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, specta::Type)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    pub mode: BackendMode,
    /// Base URL of the remote GPU service (remote mode only)
    pub remote_url: Option<String>,
    pub local: LocalBackendConfig,
}

/// Model identifiers handed to the backend on initialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, specta::Type)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    pub analysis_model: String,
    pub processing_model: String,
    pub caption_model: String,
    pub asr_model: String,
    /// Overrides the default checkpoint download URL
    pub checkpoint_url: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            analysis_model: "gpt-4o-mini".to_string(),
            processing_model: "gpt-4o-mini".to_string(),
            caption_model: "qwen-vl-plus".to_string(),
            asr_model: "paraformer-realtime-v2".to_string(),
            checkpoint_url: None,
        }
    }
}

// ===== App Settings =====

/// Persisted settings blob, edited by the settings screen and read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, specta::Type)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Root for model checkpoints and chat sessions
    pub store_directory: Option<PathBuf>,
    pub backend: BackendSettings,
    pub models: ModelSettings,
    /// Ceiling for pass-through requests (upload, query) to the backend
    pub request_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            store_directory: None,
            backend: BackendSettings::default(),
            models: ModelSettings::default(),
            request_timeout_secs: 600,
        }
    }
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "requestTimeoutSecs",
                reason: "must be greater than zero".to_string(),
            });
        }

        match self.backend.mode {
            BackendMode::Remote => {
                let url = self
                    .backend
                    .remote_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .ok_or_else(|| ConfigError::InvalidSetting {
                        field: "backend.remoteUrl",
                        reason: "required in remote mode".to_string(),
                    })?;

                let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidSetting {
                    field: "backend.remoteUrl",
                    reason: e.to_string(),
                })?;

                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ConfigError::InvalidSetting {
                        field: "backend.remoteUrl",
                        reason: format!("unsupported scheme '{}'", parsed.scheme()),
                    });
                }
            }
            BackendMode::Local => {
                if self.backend.local.program.trim().is_empty() {
                    return Err(ConfigError::InvalidSetting {
                        field: "backend.local.program",
                        reason: "must not be empty".to_string(),
                    });
                }
                if self.backend.local.port == 0 {
                    return Err(ConfigError::InvalidSetting {
                        field: "backend.local.port",
                        reason: "must not be zero".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

// ===== Type-Safe Config Store =====

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

impl ConfigKey<AppSettings> {
    pub const APP_SETTINGS: Self = Self::new("appSettings");
}

pub trait ConfigStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError>;
}

/// Load settings, falling back to defaults when nothing was saved yet.
pub fn load_app_settings(store: &impl ConfigStore) -> AppSettings {
    store.get(&ConfigKey::APP_SETTINGS).unwrap_or_default()
}

/// Validate and persist settings.
pub fn save_app_settings(
    store: &impl ConfigStore,
    settings: AppSettings,
) -> Result<(), ConfigError> {
    settings.validate()?;
    store.set(&ConfigKey::APP_SETTINGS, settings)
}
