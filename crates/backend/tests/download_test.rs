use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use vimo_backend::downloads::{DownloadError, DownloadEvent, DownloadManager, DownloadStatus};

const MODEL_SIZE: usize = 256 * 1024;

fn model_bytes() -> Vec<u8> {
    (0..MODEL_SIZE).map(|i| (i % 251) as u8).collect()
}

#[derive(Clone, Default)]
struct Hits(Arc<AtomicUsize>);

impl Hits {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

async fn serve_model(State(hits): State<Hits>) -> impl IntoResponse {
    hits.0.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::OK,
        [(header::CONTENT_LENGTH, MODEL_SIZE.to_string())],
        model_bytes(),
    )
}

async fn serve_error(State(hits): State<Hits>) -> impl IntoResponse {
    hits.0.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

/// Sends part of the body, then fails the stream.
async fn serve_broken() -> Response {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(vec![7u8; 4096])),
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")),
    ];
    Response::builder()
        .header(header::CONTENT_LENGTH, MODEL_SIZE.to_string())
        .body(Body::from_stream(stream::iter(chunks)))
        .unwrap()
}

/// Chunked body without a content length.
async fn serve_chunked() -> Response {
    let chunks: Vec<Result<Bytes, std::io::Error>> = model_bytes()
        .chunks(16 * 1024)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Response::builder()
        .body(Body::from_stream(stream::iter(chunks)))
        .unwrap()
}

/// Sends one chunk, then never another byte.
async fn serve_stall() -> Response {
    let first = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(vec![1u8; 1024]))]);
    Response::builder()
        .header(header::CONTENT_LENGTH, MODEL_SIZE.to_string())
        .body(Body::from_stream(first.chain(stream::pending())))
        .unwrap()
}

async fn start_server() -> (SocketAddr, Hits) {
    let hits = Hits::default();
    let app = Router::new()
        .route("/model.pt", get(serve_model))
        .route("/error.pt", get(serve_error))
        .route("/broken.pt", get(serve_broken))
        .route("/chunked.pt", get(serve_chunked))
        .route("/stall.pt", get(serve_stall))
        .with_state(hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn target(store: &Path) -> PathBuf {
    store.join("checkpoints").join("model.pt")
}

fn drain(rx: &mut mpsc::UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_download_completes() {
    let (addr, _hits) = start_server().await;
    let store = tempfile::tempdir().unwrap();
    let dest = target(store.path());

    let manager = DownloadManager::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = manager
        .download(&format!("http://{}/model.pt", addr), &dest, Some(&tx))
        .await
        .unwrap();

    assert_eq!(task.status, DownloadStatus::Completed);
    assert_eq!(task.downloaded_bytes, MODEL_SIZE as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), model_bytes());
    assert!(!dest.with_extension("pt.partial").exists());

    let events = drain(&mut rx);
    assert_eq!(
        events.first(),
        Some(&DownloadEvent::Started {
            total_bytes: Some(MODEL_SIZE as u64)
        })
    );
    assert_eq!(events.last(), Some(&DownloadEvent::Complete));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let final_progress = events
        .iter()
        .rev()
        .find_map(|e| match e {
            DownloadEvent::Progress {
                downloaded_bytes,
                total_bytes,
                percentage,
            } => Some((*downloaded_bytes, *total_bytes, *percentage)),
            _ => None,
        })
        .expect("at least the final progress event");
    assert_eq!(final_progress, (MODEL_SIZE as u64, MODEL_SIZE as u64, 100.0));
}

#[tokio::test]
async fn test_second_download_makes_no_requests() {
    let (addr, hits) = start_server().await;
    let store = tempfile::tempdir().unwrap();
    let dest = target(store.path());
    let url = format!("http://{}/model.pt", addr);

    let manager = DownloadManager::new();
    manager.download(&url, &dest, None).await.unwrap();
    assert_eq!(hits.count(), 1);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = manager.download(&url, &dest, Some(&tx)).await.unwrap();
    assert_eq!(task.status, DownloadStatus::Completed);
    assert_eq!(hits.count(), 1, "existing file must short-circuit");
    assert_eq!(drain(&mut rx), vec![DownloadEvent::Complete]);
}

#[tokio::test]
async fn test_http_error_removes_destination_directory() {
    let (addr, _hits) = start_server().await;
    let store = tempfile::tempdir().unwrap();
    let dest = target(store.path());

    // Something left over from an earlier attempt
    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
    std::fs::write(dest.with_extension("pt.partial"), b"stale").unwrap();

    let manager = DownloadManager::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let err = manager
        .download(&format!("http://{}/error.pt", addr), &dest, Some(&tx))
        .await
        .unwrap_err();

    assert_eq!(err, DownloadError::Http { status: 500 });
    assert!(!dest.parent().unwrap().exists());
    assert!(store.path().exists(), "only the destination tree is removed");
    assert!(matches!(drain(&mut rx).last(), Some(DownloadEvent::Error { .. })));
}

#[tokio::test]
async fn test_stream_failure_removes_destination_directory() {
    let (addr, _hits) = start_server().await;
    let store = tempfile::tempdir().unwrap();
    let dest = target(store.path());

    let manager = DownloadManager::new();
    let err = manager
        .download(&format!("http://{}/broken.pt", addr), &dest, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Network(_)), "{:?}", err);
    assert!(!dest.parent().unwrap().exists());
}

#[tokio::test]
async fn test_unknown_length_streams_without_progress() {
    let (addr, _hits) = start_server().await;
    let store = tempfile::tempdir().unwrap();
    let dest = target(store.path());

    let manager = DownloadManager::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = manager
        .download(&format!("http://{}/chunked.pt", addr), &dest, Some(&tx))
        .await
        .unwrap();

    assert_eq!(task.total_bytes, None);
    assert_eq!(std::fs::read(&dest).unwrap(), model_bytes());

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            DownloadEvent::Started { total_bytes: None },
            DownloadEvent::Complete
        ]
    );
}

#[tokio::test]
async fn test_inactivity_timeout_cleans_up() {
    let (addr, _hits) = start_server().await;
    let store = tempfile::tempdir().unwrap();
    let dest = target(store.path());

    let manager = DownloadManager::with_inactivity_timeout(Duration::from_millis(200));
    let err = manager
        .download(&format!("http://{}/stall.pt", addr), &dest, None)
        .await
        .unwrap_err();

    assert_eq!(err, DownloadError::Timeout(Duration::from_millis(200)));
    assert!(!dest.parent().unwrap().exists());
    assert!(!manager.is_downloading(&dest));
}

#[tokio::test]
async fn test_cancel_converges_on_cleanup() {
    let (addr, _hits) = start_server().await;
    let store = tempfile::tempdir().unwrap();
    let dest = target(store.path());

    let manager = Arc::new(DownloadManager::new());
    let mut handle = manager.spawn(format!("http://{}/stall.pt", addr), dest.clone());

    // Wait until the transfer is underway
    let started = handle.events.recv().await.unwrap();
    assert!(matches!(started, DownloadEvent::Started { .. }));
    assert!(manager.is_downloading(&dest));

    manager.cancel(&dest).unwrap();

    let mut rest = Vec::new();
    while let Some(event) = handle.events.recv().await {
        rest.push(event);
    }
    assert_eq!(rest.last(), Some(&DownloadEvent::Cancelled));

    assert_eq!(handle.finish().await.unwrap_err(), DownloadError::Cancelled);
    assert!(!dest.parent().unwrap().exists());
    assert!(!manager.is_downloading(&dest));
}

#[tokio::test]
async fn test_handle_cancel() {
    let (addr, _hits) = start_server().await;
    let store = tempfile::tempdir().unwrap();
    let dest = target(store.path());

    let manager = Arc::new(DownloadManager::new());
    let mut handle = manager.spawn(format!("http://{}/stall.pt", addr), dest.clone());
    handle.events.recv().await.unwrap();

    handle.cancel();
    assert_eq!(handle.finish().await.unwrap_err(), DownloadError::Cancelled);
    assert!(!dest.parent().unwrap().exists());
}

#[tokio::test]
async fn test_duplicate_download_is_rejected() {
    let (addr, _hits) = start_server().await;
    let store = tempfile::tempdir().unwrap();
    let dest = target(store.path());
    let url = format!("http://{}/stall.pt", addr);

    let manager = Arc::new(DownloadManager::new());
    let mut first = manager.spawn(url.clone(), dest.clone());
    first.events.recv().await.unwrap();

    let err = manager.download(&url, &dest, None).await.unwrap_err();
    assert_eq!(err, DownloadError::AlreadyInProgress(dest.clone()));

    first.cancel();
    assert_eq!(first.finish().await.unwrap_err(), DownloadError::Cancelled);
}

#[tokio::test]
async fn test_unrelated_downloads_proceed_independently() {
    let (addr, _hits) = start_server().await;
    let store_a = tempfile::tempdir().unwrap();
    let store_b = tempfile::tempdir().unwrap();
    let dest_a = target(store_a.path());
    let dest_b = target(store_b.path());

    let manager = Arc::new(DownloadManager::with_inactivity_timeout(Duration::from_millis(300)));

    // One download stalls and fails while the other completes
    let stalled = manager.spawn(format!("http://{}/stall.pt", addr), dest_a.clone());
    let healthy = manager.spawn(format!("http://{}/model.pt", addr), dest_b.clone());

    let healthy = healthy.finish().await.unwrap();
    assert_eq!(healthy.downloaded_bytes, MODEL_SIZE as u64);
    assert!(dest_b.is_file());

    assert!(matches!(
        stalled.finish().await,
        Err(DownloadError::Timeout(_))
    ));
    assert!(!dest_a.parent().unwrap().exists());
    assert!(dest_b.is_file());
}
