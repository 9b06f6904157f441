use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a live status probe observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub is_running: bool,
    pub intern_video2_loaded: bool,
}

impl ServiceSnapshot {
    pub const NOT_RUNNING: Self = Self {
        is_running: false,
        intern_video2_loaded: false,
    };

    /// Derive a snapshot from a `/api/system/status` body.
    ///
    /// Running means the backend holds an initialized global config, not
    /// merely that it answered. Loaded is read from its own flag and never
    /// survives a not-running result.
    pub fn from_status_body(body: &Value) -> Self {
        let status = body.get("status");
        let flag = |name: &str| {
            status
                .and_then(|s| s.get(name))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };

        let is_running = flag("global_config_set");
        Self {
            is_running,
            intern_video2_loaded: is_running && flag("internvideo2_loaded"),
        }
    }
}
