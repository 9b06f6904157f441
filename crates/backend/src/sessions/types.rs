use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One session file on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub data: Value,
    pub last_modified: DateTime<Utc>,
}

impl SessionRecord {
    /// Title shown in the sidebar, when the blob carries one.
    pub fn title(&self) -> Option<String> {
        self.data
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub order_index: u32,
    pub last_modified: DateTime<Utc>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub store_directory: Option<PathBuf>,
    pub is_configured: bool,
}

/// `order.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct OrderFile {
    pub order: Vec<String>,
}
