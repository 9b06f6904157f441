use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use super::request::Route;
use super::{BackendClient, BackendError, BackendRequest, ServiceSnapshot, Supervisor};
use crate::config::{AppSettings, BackendMode, ConfigError, LocalBackendConfig, ModelSettings};
use crate::models::{CHECKPOINTS_DIR, INTERNVIDEO2_CHECKPOINT};

/// Heavy Python imports make the first start slow
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Lines of backend stderr kept for startup failure reports
const STDERR_TAIL_LINES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEndpoint {
    /// A Python process this app spawns and owns
    Local(LocalBackendConfig),
    /// A service running elsewhere; we only reach and initialize it
    Remote { url: String },
}

/// Everything the supervisor needs, resolved from settings once at startup.
pub struct SupervisorConfig {
    pub endpoint: BackendEndpoint,
    pub store_directory: Option<PathBuf>,
    pub models: ModelSettings,
    pub api_key: Option<SecretString>,
    pub request_timeout: Duration,
    pub startup_timeout: Duration,
}

impl fmt::Debug for SupervisorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorConfig")
            .field("endpoint", &self.endpoint)
            .field("store_directory", &self.store_directory)
            .field("models", &self.models)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("startup_timeout", &self.startup_timeout)
            .finish()
    }
}

impl SupervisorConfig {
    pub fn from_settings(
        settings: &AppSettings,
        api_key: Option<SecretString>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;

        let endpoint = match settings.backend.mode {
            BackendMode::Local => BackendEndpoint::Local(settings.backend.local.clone()),
            BackendMode::Remote => BackendEndpoint::Remote {
                url: settings
                    .backend
                    .remote_url
                    .clone()
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            },
        };

        Ok(Self {
            endpoint,
            store_directory: settings.store_directory.clone(),
            models: settings.models.clone(),
            api_key,
            request_timeout: settings.request_timeout(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        })
    }

    pub fn base_url(&self) -> String {
        match &self.endpoint {
            BackendEndpoint::Local(local) => local.base_url(),
            BackendEndpoint::Remote { url } => url.clone(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.endpoint, BackendEndpoint::Remote { .. })
    }

    fn initialize_body(&self) -> Result<Value, BackendError> {
        let store = self
            .store_directory
            .as_ref()
            .ok_or(ConfigError::StorageNotConfigured)?;

        Ok(json!({
            "base_storage_path": store,
            "analysis_model": self.models.analysis_model,
            "processing_model": self.models.processing_model,
            "caption_model": self.models.caption_model,
            "asr_model": self.models.asr_model,
            "api_key": self.api_key.as_ref().map(|key| key.expose_secret().to_string()),
        }))
    }

    /// Checkpoint path as the backend should see it.
    ///
    /// A local backend shares our filesystem, so the file must be present
    /// before we ask it to load. A remote one resolves the relative path
    /// against its own store.
    fn model_path(&self) -> Result<PathBuf, BackendError> {
        if self.is_remote() {
            return Ok(PathBuf::from(CHECKPOINTS_DIR).join(INTERNVIDEO2_CHECKPOINT.file_name));
        }

        let store = self
            .store_directory
            .as_ref()
            .ok_or(ConfigError::StorageNotConfigured)?;
        let path = INTERNVIDEO2_CHECKPOINT.path_in(store);
        if path.is_file() {
            Ok(path)
        } else {
            Err(BackendError::ModelFilesMissing(path))
        }
    }
}

/// A spawned backend together with the tail of its stderr.
struct BackendProcess {
    child: Child,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    drain: Option<JoinHandle<()>>,
}

impl BackendProcess {
    fn spawn(local: &LocalBackendConfig) -> Result<Self, BackendError> {
        let mut command = Command::new(&local.program);
        command
            .args(&local.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &local.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| BackendError::Spawn {
            program: local.program.clone(),
            reason: e.to_string(),
        })?;

        info!(
            "Backend process started with PID {:?}: {} {}",
            child.id(),
            local.program,
            local.args.join(" ")
        );

        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
        let drain = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, Arc::clone(&stderr_tail))));

        Ok(Self {
            child,
            stderr_tail,
            drain,
        })
    }

    /// Collect stderr after the process has exited.
    async fn captured_stderr(&mut self) -> String {
        if let Some(drain) = self.drain.take() {
            // EOF follows exit; only a grandchild holding the pipe could stall this
            if tokio::time::timeout(Duration::from_secs(2), drain).await.is_err() {
                warn!("Timed out collecting backend stderr");
            }
        }

        let tail = self
            .stderr_tail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    async fn shutdown(mut self) {
        let pid = self.child.id();
        info!("Stopping backend process (PID {:?})...", pid);

        if let Err(e) = self.child.start_kill() {
            warn!("Failed to signal backend process: {}", e);
        }

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => info!("Backend process exited: {}", status),
            Ok(Err(e)) => warn!("Error waiting for backend process: {}", e),
            Err(_) => warn!("Backend process did not exit within {:?}", STOP_TIMEOUT),
        }

        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}

async fn drain_stderr(stderr: ChildStderr, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "backend", "{}", line);
        let mut buffer = tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if buffer.len() == STDERR_TAIL_LINES {
            buffer.pop_front();
        }
        buffer.push_back(line);
    }
}

/// Supervisor for the real backend, local or remote.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    client: BackendClient,
    process: tokio::sync::Mutex<Option<BackendProcess>>,
    poll_interval: Duration,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .as_ref()
            .map(|key| SecretString::from(key.expose_secret().to_string()));
        let client = BackendClient::new(&config.base_url(), api_key, config.request_timeout)?;

        Ok(Self {
            config,
            client,
            process: tokio::sync::Mutex::new(None),
            poll_interval: Duration::from_millis(500),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    /// Make sure our process is alive and answering HTTP.
    async fn ensure_process(&self, local: &LocalBackendConfig) -> Result<(), BackendError> {
        let mut guard = self.process.lock().await;

        if let Some(process) = guard.as_mut() {
            match process.child.try_wait() {
                Ok(None) => debug!("Backend process already running"),
                Ok(Some(status)) => {
                    warn!("Backend process exited earlier with status: {}", status);
                    *guard = None;
                }
                Err(e) => {
                    warn!("Failed to check backend process status: {}", e);
                    *guard = None;
                }
            }
        }

        if guard.is_none() {
            *guard = Some(BackendProcess::spawn(local)?);
        }

        let result = match guard.as_mut() {
            Some(process) => self.wait_until_reachable(process).await,
            None => Ok(()),
        };

        if result.is_err() {
            if let Some(process) = guard.take() {
                process.shutdown().await;
            }
        }

        result
    }

    async fn wait_until_reachable(&self, process: &mut BackendProcess) -> Result<(), BackendError> {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let exited = process.child.try_wait().map_err(|e| BackendError::Spawn {
                program: self.client.base_url().to_string(),
                reason: e.to_string(),
            })?;
            if let Some(status) = exited {
                let stderr = process.captured_stderr().await;
                error!("Backend process exited during startup: {}", status);
                return Err(BackendError::ProcessExited {
                    code: status.code(),
                    stderr,
                });
            }

            if self.client.is_reachable().await {
                info!(
                    "Backend reachable at {} after {:?}",
                    self.client.base_url(),
                    started.elapsed()
                );
                return Ok(());
            }

            if started.elapsed() >= self.config.startup_timeout {
                error!(
                    "Backend not reachable after {:?}",
                    self.config.startup_timeout
                );
                return Err(BackendError::StartupTimeout(self.config.startup_timeout));
            }

            if attempt == 1 {
                info!("Waiting for backend to start...");
            } else if attempt % 20 == 0 {
                debug!("Still waiting for backend (attempt {})", attempt);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn kill_process(&self) -> bool {
        let process = self.process.lock().await.take();
        match process {
            Some(process) => {
                process.shutdown().await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn start(&self) -> Result<String, BackendError> {
        if self.status().await.is_running {
            info!("Backend already running at {}", self.client.base_url());
            return Ok("Service is already running".to_string());
        }

        let body = self.config.initialize_body()?;

        if let BackendEndpoint::Local(local) = &self.config.endpoint {
            self.ensure_process(local).await?;
        }

        match self
            .client
            .execute(Route::initialize(body), self.config.request_timeout)
            .await
        {
            Ok(_) => {
                info!("Backend initialized at {}", self.client.base_url());
                if self.config.is_remote() {
                    Ok("Connected to remote service".to_string())
                } else {
                    Ok("Service started".to_string())
                }
            }
            Err(e) => {
                error!("Backend initialization failed: {}", e);
                if !self.config.is_remote() {
                    self.kill_process().await;
                }
                Err(e)
            }
        }
    }

    async fn stop(&self) -> Result<String, BackendError> {
        if self.config.is_remote() {
            info!("Disconnecting from remote backend {}", self.client.base_url());
            return Ok("Disconnected from remote service".to_string());
        }

        if self.kill_process().await {
            Ok("Service stopped".to_string())
        } else if self.client.is_reachable().await {
            warn!(
                "Backend at {} was not started by this app; leaving it running",
                self.client.base_url()
            );
            Err(BackendError::Rejected(format!(
                "The backend at {} was not started by this app. Stop it where it was launched.",
                self.client.base_url()
            )))
        } else {
            Ok("Service stopped".to_string())
        }
    }

    async fn status(&self) -> ServiceSnapshot {
        match self.client.probe().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Status probe failed, treating backend as stopped: {}", e);
                ServiceSnapshot::NOT_RUNNING
            }
        }
    }

    async fn load_model(&self) -> Result<(), BackendError> {
        let model_path = self.config.model_path()?;
        info!("Loading InternVideo2 from {:?}", model_path);

        self.client
            .execute(Route::load_model(&model_path), self.config.request_timeout)
            .await?;

        info!("InternVideo2 loaded");
        Ok(())
    }

    async fn release_model(&self) -> Result<(), BackendError> {
        self.client
            .execute(Route::release_model(), self.config.request_timeout)
            .await?;

        info!("InternVideo2 released");
        Ok(())
    }

    async fn forward(&self, request: BackendRequest) -> Result<Value, BackendError> {
        self.client.send(&request).await
    }
}
