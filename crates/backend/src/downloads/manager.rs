use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::DownloadEvent;
use super::task::{DownloadStatus, DownloadTask};
use super::DownloadError;

/// Abort a transfer after this long without receiving a byte
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Minimum spacing between progress events to avoid flooding the UI
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Downloads single large files into place.
///
/// Bytes stream into `<file>.partial` and are renamed on a clean finish.
/// Any failure (HTTP status, network, write, inactivity, cancellation)
/// removes the whole destination directory before the error is returned.
pub struct DownloadManager {
    client: reqwest::Client,
    inactivity_timeout: Duration,
    /// Cancellation tokens for active downloads, keyed by target path
    active: Arc<Mutex<HashMap<PathBuf, CancellationToken>>>,
}

/// A download running in the background.
///
/// Dropping `events` only unsubscribes; call [`DownloadHandle::cancel`] to
/// abort the transfer itself.
pub struct DownloadHandle {
    pub events: UnboundedReceiver<DownloadEvent>,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<DownloadTask, DownloadError>>,
}

impl DownloadHandle {
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Wait for the terminal result.
    pub async fn finish(self) -> Result<DownloadTask, DownloadError> {
        self.task
            .await
            .map_err(|e| DownloadError::TaskFailed(e.to_string()))?
    }
}

/// Removes the path from the active map however the download ends.
struct ActiveDownload<'a> {
    active: &'a Mutex<HashMap<PathBuf, CancellationToken>>,
    path: PathBuf,
}

impl Drop for ActiveDownload<'_> {
    fn drop(&mut self) {
        lock(self.active).remove(&self.path);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit(events: Option<&UnboundedSender<DownloadEvent>>, event: DownloadEvent) {
    if let Some(tx) = events {
        // A closed receiver just means nobody is listening any more
        let _ = tx.send(event);
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadManager {
    pub fn new() -> Self {
        Self::with_inactivity_timeout(DEFAULT_INACTIVITY_TIMEOUT)
    }

    pub fn with_inactivity_timeout(inactivity_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            inactivity_timeout,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Is a download to this path currently running?
    pub fn is_downloading(&self, dest: &Path) -> bool {
        lock(&self.active).contains_key(dest)
    }

    /// Cancel an ongoing download. The running call performs the cleanup.
    pub fn cancel(&self, dest: &Path) -> Result<(), DownloadError> {
        match lock(&self.active).get(dest) {
            Some(token) => {
                token.cancel();
                info!("Cancellation requested for download to {:?}", dest);
                Ok(())
            }
            None => Err(DownloadError::NotActive(dest.to_path_buf())),
        }
    }

    /// Start a download in the background and hand back its event stream.
    pub fn spawn(self: &Arc<Self>, url: String, dest: PathBuf) -> DownloadHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let manager = Arc::clone(self);
        let token = cancel_token.clone();
        let task = tokio::spawn(async move {
            manager
                .download_with_token(&url, &dest, Some(&tx), token)
                .await
        });

        DownloadHandle {
            events: rx,
            cancel_token,
            task,
        }
    }

    /// Download `url` to `dest`.
    ///
    /// Returns immediately, without touching the network, when `dest`
    /// already exists.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        events: Option<&UnboundedSender<DownloadEvent>>,
    ) -> Result<DownloadTask, DownloadError> {
        self.download_with_token(url, dest, events, CancellationToken::new())
            .await
    }

    async fn download_with_token(
        &self,
        url: &str,
        dest: &Path,
        events: Option<&UnboundedSender<DownloadEvent>>,
        cancel_token: CancellationToken,
    ) -> Result<DownloadTask, DownloadError> {
        let mut task = DownloadTask::new(url, dest.to_path_buf());

        if dest.is_file() {
            let size = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
            info!("{:?} already downloaded, skipping", dest);
            task.downloaded_bytes = size;
            task.total_bytes = Some(size);
            task.status = DownloadStatus::Completed;
            emit(events, DownloadEvent::Complete);
            return Ok(task);
        }

        let _active = {
            let mut active = lock(&self.active);
            if active.contains_key(dest) {
                warn!("Download to {:?} is already in progress", dest);
                return Err(DownloadError::AlreadyInProgress(dest.to_path_buf()));
            }
            active.insert(dest.to_path_buf(), cancel_token.clone());
            ActiveDownload {
                active: &self.active,
                path: dest.to_path_buf(),
            }
        };

        info!("Starting download of {} into {:?}", url, dest);
        task.status = DownloadStatus::InProgress;

        match self.transfer(&mut task, events, &cancel_token).await {
            Ok(()) => {
                task.status = DownloadStatus::Completed;
                info!(
                    "Download complete: {:?} ({} bytes)",
                    dest, task.downloaded_bytes
                );
                emit(events, DownloadEvent::Complete);
                Ok(task)
            }
            Err(e) => {
                Self::cleanup(dest).await;
                if e == DownloadError::Cancelled {
                    info!("Download to {:?} cancelled", dest);
                    emit(events, DownloadEvent::Cancelled);
                } else {
                    error!("Download failed: {}", e);
                    emit(
                        events,
                        DownloadEvent::Error {
                            error: e.to_string(),
                        },
                    );
                }
                Err(e)
            }
        }
    }

    async fn transfer(
        &self,
        task: &mut DownloadTask,
        events: Option<&UnboundedSender<DownloadEvent>>,
        cancel_token: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let dest = task.target_path.clone();
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| DownloadError::InvalidDestination(dest.clone()))?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DownloadError::CreateDir {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        let response = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(DownloadError::Cancelled),
            sent = tokio::time::timeout(self.inactivity_timeout, self.client.get(&task.url).send()) => {
                sent.map_err(|_| DownloadError::Timeout(self.inactivity_timeout))?
                    .map_err(|e| DownloadError::Network(format!("Failed to start download: {}", e)))?
            }
        };

        if !response.status().is_success() {
            return Err(DownloadError::Http {
                status: response.status().as_u16(),
            });
        }

        task.total_bytes = response.content_length().filter(|len| *len > 0);
        emit(
            events,
            DownloadEvent::Started {
                total_bytes: task.total_bytes,
            },
        );

        let partial = partial_path(&dest);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&partial)
            .await
            .map_err(|e| DownloadError::Write(format!("Failed to create file: {}", e)))?;

        let mut file = tokio::io::BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut last_emit = Instant::now();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => return Err(DownloadError::Cancelled),
                next = tokio::time::timeout(self.inactivity_timeout, stream.next()) => {
                    next.map_err(|_| DownloadError::Timeout(self.inactivity_timeout))?
                }
            };

            let Some(chunk_result) = next else { break };
            let chunk = chunk_result.map_err(|e| DownloadError::Network(e.to_string()))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::Write(e.to_string()))?;
            task.downloaded_bytes += chunk.len() as u64;

            if last_emit.elapsed() >= PROGRESS_INTERVAL {
                Self::emit_progress(task, events);
                last_emit = Instant::now();
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::Write(format!("Failed to flush file: {}", e)))?;
        file.into_inner()
            .sync_all()
            .await
            .map_err(|e| DownloadError::Write(format!("Failed to sync file: {}", e)))?;

        if let Some(total) = task.total_bytes {
            if task.downloaded_bytes < total {
                return Err(DownloadError::Network(format!(
                    "Connection closed after {} of {} bytes",
                    task.downloaded_bytes, total
                )));
            }
        }

        // Final progress update
        Self::emit_progress(task, events);

        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|e| DownloadError::Write(format!("Failed to move file into place: {}", e)))?;

        Ok(())
    }

    fn emit_progress(task: &DownloadTask, events: Option<&UnboundedSender<DownloadEvent>>) {
        let (Some(total), Some(percentage)) = (task.total_bytes, task.percentage()) else {
            return;
        };

        debug!(
            "Download progress: {:.1}% ({}/{} bytes)",
            percentage, task.downloaded_bytes, total
        );

        emit(
            events,
            DownloadEvent::Progress {
                downloaded_bytes: task.downloaded_bytes,
                total_bytes: total,
                percentage,
            },
        );
    }

    /// Remove the destination directory tree so no half-written artifact
    /// survives to satisfy a later presence check.
    async fn cleanup(dest: &Path) {
        let Some(dir) = dest.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return;
        };

        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!("Removed {:?} after failed download", dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clean up {:?}: {}", dir, e),
        }
    }
}
