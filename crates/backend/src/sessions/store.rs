use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::OwnedMutexGuard;

use super::order::{self, OrderOperation};
use super::types::{OrderFile, SessionRecord, SessionSummary, StorageInfo};
use super::{validate_id, SessionError};
use crate::config::ConfigError;

const SESSIONS_ROOT: &str = "chat-sessions";
const RECORDS_DIR: &str = "sessions";
const ORDER_FILE: &str = "order.json";

/// Resolved paths for one configured store directory.
struct Layout {
    records: PathBuf,
    order: PathBuf,
}

impl Layout {
    fn new(store_dir: &Path) -> Self {
        let root = store_dir.join(SESSIONS_ROOT);
        Self {
            records: root.join(RECORDS_DIR),
            order: root.join(ORDER_FILE),
        }
    }

    fn record(&self, id: &str) -> PathBuf {
        self.records.join(format!("{}.json", id))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SessionError + '_ {
    move |e| SessionError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Write through a uniquely named temp file, then rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SessionError> {
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error(path)(e));
    }
    Ok(())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SessionError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| SessionError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_atomic(path, &bytes).await
}

/// `Ok(None)` when the file does not exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SessionError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path)(e)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| SessionError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Durable chat session storage.
///
/// The store directory is process-wide configuration, set once. Writes to
/// the same id are serialized; different ids proceed independently. The
/// order list has its own lock, always taken after an id lock.
pub struct SessionStore {
    store_dir: OnceLock<PathBuf>,
    /// Set by `ensure_storage_directory`; allows recreating a vanished root
    ensured: AtomicBool,
    id_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    order_lock: tokio::sync::Mutex<()>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// A store with no directory yet; every operation fails until configured.
    pub fn new() -> Self {
        Self {
            store_dir: OnceLock::new(),
            ensured: AtomicBool::new(false),
            id_locks: Mutex::new(HashMap::new()),
            order_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_store_directory(store_dir: impl Into<PathBuf>) -> Self {
        let store = Self::new();
        let _ = store.store_dir.set(store_dir.into());
        store
    }

    /// Set the store directory. Repeating the same path is a no-op.
    pub fn configure(&self, store_dir: impl Into<PathBuf>) -> Result<(), SessionError> {
        let store_dir = store_dir.into();
        let current = self.store_dir.get_or_init(|| store_dir.clone());
        if *current == store_dir {
            info!("Session store directory: {:?}", store_dir);
            Ok(())
        } else {
            Err(ConfigError::StorageAlreadyConfigured(current.clone()).into())
        }
    }

    pub fn storage_info(&self) -> StorageInfo {
        let store_directory = self.store_dir.get().cloned();
        StorageInfo {
            is_configured: store_directory.is_some(),
            store_directory,
        }
    }

    /// Create the store directory and session layout, and allow later calls
    /// to recreate them if they vanish.
    pub async fn ensure_storage_directory(&self) -> Result<StorageInfo, SessionError> {
        let store_dir = self.store_dir.get().ok_or(ConfigError::StorageNotConfigured)?;
        let layout = Layout::new(store_dir);

        tokio::fs::create_dir_all(&layout.records)
            .await
            .map_err(io_error(&layout.records))?;
        self.ensured.store(true, Ordering::SeqCst);

        info!("Session storage ready at {:?}", store_dir);
        Ok(self.storage_info())
    }

    /// Verify configuration and return the layout, creating session
    /// directories inside an existing store directory as needed.
    async fn layout(&self) -> Result<Layout, SessionError> {
        let store_dir = self.store_dir.get().ok_or(ConfigError::StorageNotConfigured)?;

        if !tokio::fs::metadata(store_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            if !self.ensured.load(Ordering::SeqCst) {
                return Err(ConfigError::StorageMissing(store_dir.clone()).into());
            }
            warn!("Store directory {:?} vanished, recreating it", store_dir);
        }

        let layout = Layout::new(store_dir);
        tokio::fs::create_dir_all(&layout.records)
            .await
            .map_err(io_error(&layout.records))?;
        Ok(layout)
    }

    async fn lock_id(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .id_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    async fn read_order(&self, layout: &Layout) -> Result<Vec<String>, SessionError> {
        match read_json::<OrderFile>(&layout.order).await {
            Ok(file) => Ok(file.unwrap_or_default().order),
            Err(SessionError::Corrupt { path, reason }) => {
                // Rebuilt from the records by the next healing read
                warn!("Ignoring corrupt order list {:?}: {}", path, reason);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn write_order(&self, layout: &Layout, order: Vec<String>) -> Result<(), SessionError> {
        write_json(&layout.order, &OrderFile { order }).await
    }

    /// Every readable record, in directory order.
    async fn read_records(&self, layout: &Layout) -> Result<Vec<SessionRecord>, SessionError> {
        let mut entries = tokio::fs::read_dir(&layout.records)
            .await
            .map_err(io_error(&layout.records))?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_error(&layout.records))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_id(id).is_err() {
                continue;
            }

            match read_json::<SessionRecord>(&path).await {
                Ok(Some(record)) if record.id == id => records.push(record),
                Ok(Some(record)) => {
                    warn!("Skipping {:?}: holds session {:?}", path, record.id)
                }
                // Deleted between listing and reading
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable session: {}", e),
            }
        }

        Ok(records)
    }

    async fn existing_ids(&self, layout: &Layout) -> Result<HashSet<String>, SessionError> {
        Ok(self
            .read_records(layout)
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect())
    }

    /// Create or replace a session. A new id is appended to the order list.
    pub async fn save(&self, id: &str, data: Value) -> Result<(), SessionError> {
        validate_id(id)?;
        let _id_guard = self.lock_id(id).await;
        let layout = self.layout().await?;

        let record = SessionRecord {
            id: id.to_string(),
            data,
            last_modified: Utc::now(),
        };
        write_json(&layout.record(id), &record).await?;

        let _order_guard = self.order_lock.lock().await;
        let mut order = self.read_order(&layout).await?;
        if !order.iter().any(|existing| existing == id) {
            order.push(id.to_string());
            self.write_order(&layout, order).await?;
            info!("Created session {}", id);
        } else {
            debug!("Saved session {}", id);
        }

        Ok(())
    }

    pub async fn load(&self, id: &str) -> Result<Value, SessionError> {
        validate_id(id)?;
        let _id_guard = self.lock_id(id).await;
        let layout = self.layout().await?;

        read_json::<SessionRecord>(&layout.record(id))
            .await?
            .map(|record| record.data)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Sessions in persisted order, after repairing drift against the records.
    pub async fn list(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let layout = self.layout().await?;
        let _order_guard = self.order_lock.lock().await;

        let records = self.read_records(&layout).await?;
        let order = self.read_order(&layout).await?;

        let stamps: Vec<(String, DateTime<Utc>)> = records
            .iter()
            .map(|record| (record.id.clone(), record.last_modified))
            .collect();
        let healed = order::heal(&order, &stamps);

        if healed != order {
            info!(
                "Self-healed session order: {} listed, {} with records",
                order.len(),
                healed.len()
            );
            self.write_order(&layout, healed.clone()).await?;
        }

        let mut by_id: HashMap<String, SessionRecord> = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        Ok(healed
            .iter()
            .filter_map(|id| by_id.remove(id))
            .enumerate()
            .map(|(index, record)| SessionSummary {
                order_index: index as u32,
                title: record.title(),
                id: record.id,
                last_modified: record.last_modified,
            })
            .collect())
    }

    /// Remove a session. The order entry goes first so a crash in between
    /// leaves at worst an orphaned record, which `list` re-appends.
    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        validate_id(id)?;
        let _id_guard = self.lock_id(id).await;
        let layout = self.layout().await?;

        let was_listed = {
            let _order_guard = self.order_lock.lock().await;
            let order = self.read_order(&layout).await?;
            let remaining = order::apply(
                &order,
                &[id.to_string()],
                OrderOperation::Delete,
                &HashSet::new(),
            )?;
            let was_listed = remaining.len() != order.len();
            if was_listed {
                self.write_order(&layout, remaining).await?;
            }
            was_listed
        };

        let path = layout.record(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !was_listed {
                    return Err(SessionError::NotFound(id.to_string()));
                }
            }
            Err(e) => return Err(io_error(&path)(e)),
        }

        info!("Deleted session {}", id);
        Ok(())
    }

    /// The only way to move sessions within the sequence. Returns the new order.
    pub async fn update_order(
        &self,
        ids: Vec<String>,
        operation: OrderOperation,
    ) -> Result<Vec<String>, SessionError> {
        ids.iter().try_for_each(|id| validate_id(id))?;
        let layout = self.layout().await?;
        let _order_guard = self.order_lock.lock().await;

        let existing = self.existing_ids(&layout).await?;
        let order = self.read_order(&layout).await?;
        let next = order::apply(&order, &ids, operation, &existing)?;

        if next != order {
            self.write_order(&layout, next.clone()).await?;
            info!("Session order updated ({}): {} entries", operation, next.len());
        }

        Ok(next)
    }
}
