use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use super::state::{ModelPhase, Operation, Phases, ServicePhase, StateConflict};
use super::{LoadingFlags, ServiceState};
use crate::downloads::{DownloadEvent, DownloadManager};
use crate::error::Error;
use crate::models::{check_model_files, ModelFilesStatus, INTERNVIDEO2_CHECKPOINT};
use crate::response::CommandResponse;
use crate::sessions::{OrderOperation, SessionStore, SessionSummary, StorageInfo};
use crate::supervisor::{BackendError, BackendRequest, ServiceSnapshot, Supervisor};

/// Believed state plus bookkeeping, always mutated under one lock.
#[derive(Debug)]
struct Lifecycle {
    phases: Phases,
    message: Option<String>,
    error: Option<String>,
    /// Bumped whenever a mutating transition begins or ends
    epoch: u64,
}

impl Lifecycle {
    fn service_state(&self) -> ServiceState {
        ServiceState {
            is_running: self.phases.is_running(),
            intern_video2_loaded: self.phases.is_model_loaded(),
            message: self.message.clone(),
            error: self.error.clone(),
        }
    }
}

/// Owns service and model state and serializes every transition.
///
/// Each mutating operation holds an [`InFlight`] token for its kind while
/// the supervisor works. A second request of the same kind is rejected
/// immediately. Status probes never take a token and only overwrite the
/// believed state when no transition ran while they were out.
pub struct LifecycleController {
    supervisor: Arc<dyn Supervisor>,
    downloads: Arc<DownloadManager>,
    sessions: Arc<SessionStore>,
    checkpoint_url: String,
    state: Mutex<Lifecycle>,
    probes: AtomicUsize,
    changes: watch::Sender<ServiceState>,
}

/// Token for one in-flight transition.
///
/// Dropping it without reporting an outcome (the caller's future was
/// cancelled) restores the phases the transition started from.
struct InFlight<'a> {
    controller: &'a LifecycleController,
    operation: Operation,
    prior: Phases,
    finished: bool,
}

impl InFlight<'_> {
    fn succeed(mut self, message: String) -> ServiceState {
        self.finished = true;
        let operation = self.operation;
        self.controller.update(|lifecycle| {
            lifecycle.phases = lifecycle.phases.complete(operation);
            lifecycle.message = Some(message);
            lifecycle.error = None;
            lifecycle.epoch += 1;
        })
    }

    fn fail(mut self, error: &Error) -> ServiceState {
        self.finished = true;
        let prior = self.prior;
        self.controller.update(|lifecycle| {
            lifecycle.phases = prior;
            lifecycle.message = None;
            lifecycle.error = Some(error.to_string());
            lifecycle.epoch += 1;
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        warn!("{} was interrupted before it finished", self.operation);
        let prior = self.prior;
        let operation = self.operation;
        self.controller.update(|lifecycle| {
            lifecycle.phases = prior;
            lifecycle.error = Some(format!("The {} request was interrupted", operation));
            lifecycle.epoch += 1;
        });
    }
}

/// Counts probes in flight for `LoadingFlags::checking_service`.
struct Probe<'a>(&'a AtomicUsize);

impl<'a> Probe<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Probe<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fold a lower-layer result into a response, logging failures with their kind.
fn respond<T, E: Into<Error>>(context: &str, result: Result<T, E>) -> CommandResponse<T> {
    match result {
        Ok(data) => CommandResponse::ok(data),
        Err(e) => {
            let e: Error = e.into();
            error!("{} failed ({}): {}", context, e.kind(), e);
            CommandResponse::err(e)
        }
    }
}

fn respond_done<E: Into<Error>>(context: &str, result: Result<(), E>) -> CommandResponse<()> {
    match result {
        Ok(()) => CommandResponse::done(),
        Err(e) => respond(context, Err(e)),
    }
}

impl LifecycleController {
    pub fn new(
        supervisor: Arc<dyn Supervisor>,
        downloads: Arc<DownloadManager>,
        sessions: Arc<SessionStore>,
        checkpoint_url: impl Into<String>,
    ) -> Self {
        let lifecycle = Lifecycle {
            phases: Phases::STOPPED,
            message: None,
            error: None,
            epoch: 0,
        };
        let (changes, _) = watch::channel(lifecycle.service_state());

        Self {
            supervisor,
            downloads,
            sessions,
            checkpoint_url: checkpoint_url.into(),
            state: Mutex::new(lifecycle),
            probes: AtomicUsize::new(0),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutate under the lock, then publish the new state to subscribers.
    fn update(&self, f: impl FnOnce(&mut Lifecycle)) -> ServiceState {
        let state = {
            let mut lifecycle = self.lock();
            f(&mut lifecycle);
            lifecycle.service_state()
        };
        self.changes.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
        state
    }

    // ===== Read-only accessors =====

    pub fn state(&self) -> ServiceState {
        self.lock().service_state()
    }

    pub fn loading_flags(&self) -> LoadingFlags {
        let phases = self.lock().phases;
        LoadingFlags {
            starting: phases.service == ServicePhase::Starting,
            stopping: phases.service == ServicePhase::Stopping,
            checking_service: self.probes.load(Ordering::SeqCst) > 0,
            loading_model: phases.model == ModelPhase::Loading,
            releasing_model: phases.model == ModelPhase::Releasing,
        }
    }

    /// Receive every change of the believed state.
    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.changes.subscribe()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ===== Lifecycle transitions =====

    fn begin(&self, operation: Operation) -> Result<InFlight<'_>, StateConflict> {
        let mut prior = Phases::STOPPED;
        let mut rejected = None;

        self.update(|lifecycle| match lifecycle.phases.begin(operation) {
            Ok(next) => {
                prior = lifecycle.phases;
                lifecycle.phases = next;
                lifecycle.epoch += 1;
            }
            Err(conflict) => rejected = Some(conflict),
        });

        if let Some(conflict) = rejected {
            warn!("Rejected {}: {}", operation, conflict);
            return Err(conflict);
        }

        info!("{} started", operation);
        Ok(InFlight {
            controller: self,
            operation,
            prior,
            finished: false,
        })
    }

    async fn transition<F, Fut>(&self, operation: Operation, call: F) -> CommandResponse<ServiceState>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, BackendError>>,
    {
        let flight = match self.begin(operation) {
            Ok(flight) => flight,
            Err(conflict) => return CommandResponse::err_with_data(conflict, self.state()),
        };

        match call().await {
            Ok(message) => {
                info!("{} succeeded: {}", operation, message);
                let state = flight.succeed(message.clone());
                CommandResponse::ok_with_message(message, state)
            }
            Err(e) => {
                let e = Error::from(e);
                error!("{} failed ({}): {}", operation, e.kind(), e);
                let state = flight.fail(&e);
                CommandResponse::err_with_data(e, state)
            }
        }
    }

    /// Accepted only from stopped. A concurrent start is rejected without
    /// contacting the supervisor.
    pub async fn start_service(&self) -> CommandResponse<ServiceState> {
        self.transition(Operation::Start, || self.supervisor.start())
            .await
    }

    /// Accepted only while running with no model operation in flight.
    pub async fn stop_service(&self) -> CommandResponse<ServiceState> {
        self.transition(Operation::Stop, || self.supervisor.stop())
            .await
    }

    pub async fn load_model(&self) -> CommandResponse<ServiceState> {
        self.transition(Operation::LoadModel, || async {
            self.supervisor
                .load_model()
                .await
                .map(|()| "InternVideo2 model loaded".to_string())
        })
        .await
    }

    pub async fn release_model(&self) -> CommandResponse<ServiceState> {
        self.transition(Operation::ReleaseModel, || async {
            self.supervisor
                .release_model()
                .await
                .map(|()| "InternVideo2 model released".to_string())
        })
        .await
    }

    // ===== Reconciliation =====

    /// Probe the backend and adopt what it reports.
    pub async fn check_service_status(&self) -> CommandResponse<ServiceState> {
        CommandResponse::ok(self.reconcile().await)
    }

    /// Same probe; the snapshot carries both dimensions.
    pub async fn check_model_status(&self) -> CommandResponse<ServiceState> {
        CommandResponse::ok(self.reconcile().await)
    }

    async fn reconcile(&self) -> ServiceState {
        let _probe = Probe::new(&self.probes);
        let epoch = self.lock().epoch;

        let snapshot = self.supervisor.status().await;

        self.update(|lifecycle| {
            if lifecycle.epoch != epoch || lifecycle.phases.is_transitioning() {
                debug!(
                    "Discarding status snapshot {:?}: a transition ran while probing",
                    snapshot
                );
                return;
            }

            let observed = phases_from_snapshot(snapshot);
            if observed != lifecycle.phases {
                info!(
                    "Reconciled service state: {:?} -> {:?}",
                    lifecycle.phases, observed
                );
                lifecycle.phases = observed;
                lifecycle.message = None;
                lifecycle.error = None;
            }
        })
    }

    // ===== Model files =====

    pub fn check_model_files(&self, store_dir: &Path) -> CommandResponse<ModelFilesStatus> {
        CommandResponse::ok(check_model_files(store_dir, &INTERNVIDEO2_CHECKPOINT))
    }

    /// Fetch the checkpoint into `<store_dir>/checkpoints`. Succeeds without
    /// network I/O when it is already there.
    pub async fn download_model(
        &self,
        store_dir: &Path,
        events: Option<&UnboundedSender<DownloadEvent>>,
    ) -> CommandResponse<()> {
        let dest = INTERNVIDEO2_CHECKPOINT.path_in(store_dir);
        let result = self
            .downloads
            .download(&self.checkpoint_url, &dest, events)
            .await
            .map(|task| info!("Model checkpoint ready ({} bytes)", task.downloaded_bytes));
        respond_done("Model download", result)
    }

    pub fn cancel_model_download(&self, store_dir: &Path) -> CommandResponse<()> {
        let dest = INTERNVIDEO2_CHECKPOINT.path_in(store_dir);
        respond_done("Cancel model download", self.downloads.cancel(&dest))
    }

    // ===== Chat sessions =====

    pub async fn load_session(&self, id: &str) -> CommandResponse<Value> {
        respond("Load session", self.sessions.load(id).await)
    }

    pub async fn save_session(&self, id: &str, data: Value) -> CommandResponse<()> {
        respond_done("Save session", self.sessions.save(id, data).await)
    }

    pub async fn list_sessions(&self) -> CommandResponse<Vec<SessionSummary>> {
        respond("List sessions", self.sessions.list().await)
    }

    pub async fn delete_session(&self, id: &str) -> CommandResponse<()> {
        respond_done("Delete session", self.sessions.delete(id).await)
    }

    pub async fn update_session_order(
        &self,
        ids: Vec<String>,
        operation: OrderOperation,
    ) -> CommandResponse<Vec<String>> {
        respond(
            "Update session order",
            self.sessions.update_order(ids, operation).await,
        )
    }

    pub fn storage_info(&self) -> CommandResponse<StorageInfo> {
        CommandResponse::ok(self.sessions.storage_info())
    }

    pub async fn ensure_storage_directory(&self) -> CommandResponse<StorageInfo> {
        respond(
            "Ensure storage directory",
            self.sessions.ensure_storage_directory().await,
        )
    }

    // ===== Pass-through =====

    /// Forward to the active backend. Not gated on lifecycle state.
    pub async fn forward(&self, request: BackendRequest) -> CommandResponse<Value> {
        respond("Backend request", self.supervisor.forward(request).await)
    }
}

fn phases_from_snapshot(snapshot: ServiceSnapshot) -> Phases {
    if !snapshot.is_running {
        return Phases::STOPPED;
    }

    Phases {
        service: ServicePhase::Running,
        model: if snapshot.intern_video2_loaded {
            ModelPhase::Loaded
        } else {
            ModelPhase::Unloaded
        },
    }
}
