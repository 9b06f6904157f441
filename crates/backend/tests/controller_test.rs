use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use vimo_backend::downloads::DownloadManager;
use vimo_backend::sessions::SessionStore;
use vimo_backend::supervisor::{BackendError, BackendRequest, ServiceSnapshot, Supervisor};
use vimo_backend::{LifecycleController, LoadingFlags};

/// Supervisor double that records calls and can hold `start`/`status` open.
#[derive(Default)]
struct FakeSupervisor {
    snapshot: Mutex<ServiceSnapshot>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    load_calls: AtomicUsize,
    forward_calls: AtomicUsize,
    hold_start: AtomicBool,
    hold_status: AtomicBool,
    entered: Notify,
    proceed: Notify,
    load_failure: Mutex<Option<BackendError>>,
}

impl FakeSupervisor {
    fn set_snapshot(&self, is_running: bool, intern_video2_loaded: bool) {
        *self.snapshot.lock().unwrap() = ServiceSnapshot {
            is_running,
            intern_video2_loaded,
        };
    }

    async fn gate(&self, held: &AtomicBool) {
        if held.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.proceed.notified().await;
        }
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn start(&self) -> Result<String, BackendError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(&self.hold_start).await;
        self.set_snapshot(true, false);
        Ok("Service started".to_string())
    }

    async fn stop(&self) -> Result<String, BackendError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.set_snapshot(false, false);
        Ok("Service stopped".to_string())
    }

    async fn status(&self) -> ServiceSnapshot {
        let snapshot = *self.snapshot.lock().unwrap();
        self.gate(&self.hold_status).await;
        snapshot
    }

    async fn load_model(&self) -> Result<(), BackendError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.load_failure.lock().unwrap().clone() {
            return Err(e);
        }
        self.set_snapshot(true, true);
        Ok(())
    }

    async fn release_model(&self) -> Result<(), BackendError> {
        self.set_snapshot(true, false);
        Ok(())
    }

    async fn forward(&self, request: BackendRequest) -> Result<Value, BackendError> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "success": true, "echo": serde_json::to_value(request).unwrap() }))
    }
}

fn controller(supervisor: &Arc<FakeSupervisor>) -> Arc<LifecycleController> {
    Arc::new(LifecycleController::new(
        supervisor.clone(),
        Arc::new(DownloadManager::new()),
        Arc::new(SessionStore::new()),
        "http://127.0.0.1:9/model.pt",
    ))
}

#[tokio::test]
async fn test_concurrent_start_reaches_supervisor_once() {
    let supervisor = Arc::new(FakeSupervisor::default());
    supervisor.hold_start.store(true, Ordering::SeqCst);
    let controller = controller(&supervisor);

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.start_service().await }
    });
    supervisor.entered.notified().await;
    assert!(controller.loading_flags().starting);

    let second = controller.start_service().await;
    assert!(!second.success);
    assert_eq!(
        second.error.as_deref(),
        Some("Another start request is already in progress")
    );
    assert_eq!(supervisor.start_calls.load(Ordering::SeqCst), 1);

    supervisor.proceed.notify_one();
    let first = first.await.unwrap();
    assert!(first.success);
    assert_eq!(first.message.as_deref(), Some("Service started"));
    assert!(first.data.unwrap().is_running);
    assert_eq!(controller.loading_flags(), LoadingFlags::default());
}

#[tokio::test]
async fn test_start_when_running_is_rejected() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let controller = controller(&supervisor);

    assert!(controller.start_service().await.success);
    let again = controller.start_service().await;
    assert!(!again.success);
    assert_eq!(
        again.error.as_deref(),
        Some("Cannot start while the service is running")
    );
    assert_eq!(supervisor.start_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_model_operations_require_running_service() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let controller = controller(&supervisor);

    let test_cases = vec![
        ("load", controller.load_model().await, "Cannot load model while the service is stopped"),
        (
            "release",
            controller.release_model().await,
            "Cannot release model while the service is stopped",
        ),
        ("stop", controller.stop_service().await, "Cannot stop while the service is stopped"),
    ];

    for (description, response, expected) in test_cases {
        assert!(!response.success, "{}", description);
        assert_eq!(response.error.as_deref(), Some(expected), "{}", description);
        assert_eq!(response.data, Some(controller.state()), "{}", description);
    }

    assert_eq!(supervisor.load_calls.load(Ordering::SeqCst), 0);
    assert_eq!(supervisor.stop_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_forces_model_unloaded() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let controller = controller(&supervisor);

    controller.start_service().await;
    let loaded = controller.load_model().await;
    assert!(loaded.success);
    assert!(loaded.data.unwrap().intern_video2_loaded);

    let stopped = controller.stop_service().await;
    assert!(stopped.success);
    let state = stopped.data.unwrap();
    assert!(!state.is_running);
    assert!(!state.intern_video2_loaded);
}

#[tokio::test]
async fn test_load_twice_is_rejected() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let controller = controller(&supervisor);

    controller.start_service().await;
    assert!(controller.load_model().await.success);

    let again = controller.load_model().await;
    assert!(!again.success);
    assert_eq!(supervisor.load_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_load_keeps_service_running() {
    let supervisor = Arc::new(FakeSupervisor::default());
    *supervisor.load_failure.lock().unwrap() =
        Some(BackendError::Rejected("CUDA out of memory".to_string()));
    let controller = controller(&supervisor);

    controller.start_service().await;
    let response = controller.load_model().await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("CUDA out of memory"));
    let state = response.data.unwrap();
    assert!(state.is_running);
    assert!(!state.intern_video2_loaded);
    assert_eq!(state.error.as_deref(), Some("CUDA out of memory"));

    // The next attempt is accepted again
    *supervisor.load_failure.lock().unwrap() = None;
    assert!(controller.load_model().await.success);
}

#[tokio::test]
async fn test_status_check_during_start_does_not_corrupt_state() {
    let supervisor = Arc::new(FakeSupervisor::default());
    supervisor.hold_start.store(true, Ordering::SeqCst);
    let controller = controller(&supervisor);

    let start = tokio::spawn({
        let controller = controller.clone();
        async move { controller.start_service().await }
    });
    supervisor.entered.notified().await;

    // The backend still reports stopped while the start is pending
    let checked = controller.check_service_status().await;
    assert!(checked.success);
    assert!(controller.loading_flags().starting);

    supervisor.proceed.notify_one();
    assert!(start.await.unwrap().success);
    assert!(controller.state().is_running);
}

#[tokio::test]
async fn test_stale_probe_is_discarded() {
    let supervisor = Arc::new(FakeSupervisor::default());
    supervisor.hold_status.store(true, Ordering::SeqCst);
    let controller = controller(&supervisor);

    // Probe reads "not running", then stalls
    let probe = tokio::spawn({
        let controller = controller.clone();
        async move { controller.check_service_status().await }
    });
    supervisor.entered.notified().await;
    assert!(controller.loading_flags().checking_service);

    supervisor.hold_status.store(false, Ordering::SeqCst);
    assert!(controller.start_service().await.success);

    supervisor.proceed.notify_one();
    probe.await.unwrap();

    assert!(controller.state().is_running, "stale snapshot must not win");
    assert!(!controller.loading_flags().checking_service);
}

#[tokio::test]
async fn test_reconcile_adopts_backend_state() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let controller = controller(&supervisor);

    supervisor.set_snapshot(true, true);
    let state = controller.check_model_status().await.data.unwrap();
    assert!(state.is_running);
    assert!(state.intern_video2_loaded);

    supervisor.set_snapshot(false, false);
    let state = controller.check_service_status().await.data.unwrap();
    assert!(!state.is_running);
    assert!(!state.intern_video2_loaded);
}

#[tokio::test]
async fn test_cancelled_start_restores_phases() {
    let supervisor = Arc::new(FakeSupervisor::default());
    supervisor.hold_start.store(true, Ordering::SeqCst);
    let controller = controller(&supervisor);

    let timed_out = tokio::time::timeout(Duration::from_millis(50), controller.start_service()).await;
    assert!(timed_out.is_err());

    let state = controller.state();
    assert!(!state.is_running);
    assert_eq!(state.error.as_deref(), Some("The start request was interrupted"));
    assert_eq!(controller.loading_flags(), LoadingFlags::default());

    supervisor.hold_start.store(false, Ordering::SeqCst);
    assert!(controller.start_service().await.success);
}

#[tokio::test]
async fn test_subscribers_see_state_changes() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let controller = controller(&supervisor);
    let mut changes = controller.subscribe();

    controller.start_service().await;
    assert!(changes.has_changed().unwrap());
    let state = changes.borrow_and_update().clone();
    assert!(state.is_running);
    assert_eq!(state.message.as_deref(), Some("Service started"));

    // Reconciling to the same state publishes nothing
    supervisor.set_snapshot(true, false);
    controller.check_service_status().await;
    assert!(!changes.has_changed().unwrap());
}

#[tokio::test]
async fn test_forward_is_not_gated_on_lifecycle() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let controller = controller(&supervisor);

    let response = controller.forward(BackendRequest::ListJobs).await;
    assert!(response.success);
    assert_eq!(response.data.unwrap()["echo"], json!({ "type": "listJobs" }));
    assert_eq!(supervisor.forward_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_model_files_and_download_control() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let controller = controller(&supervisor);
    let store = tempfile::tempdir().unwrap();

    let status = controller.check_model_files(store.path());
    assert!(status.success);
    assert!(!status.data.unwrap().model_present);

    let cancelled = controller.cancel_model_download(store.path());
    assert!(!cancelled.success, "nothing to cancel");
}

#[tokio::test]
async fn test_session_operations_without_storage() {
    let supervisor = Arc::new(FakeSupervisor::default());
    let controller = controller(&supervisor);

    let info = controller.storage_info().data.unwrap();
    assert!(!info.is_configured);

    let listed = controller.list_sessions().await;
    assert!(!listed.success);
    assert!(listed.error.is_some());
}
