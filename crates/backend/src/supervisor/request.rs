use std::path::{Path, PathBuf};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::BackendError;

/// Video containers the backend can decode.
pub const SUPPORTED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

fn default_threshold() -> f64 {
    0.2
}

fn default_min_duration() -> f64 {
    5.0
}

fn default_max_duration() -> f64 {
    12.0
}

/// Everything the UI may forward to the backend without going through the
/// lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BackendRequest {
    // Session API (local and remote)
    UploadVideos {
        session_id: String,
        video_paths: Vec<PathBuf>,
        base_storage_path: PathBuf,
    },
    SessionStatus {
        session_id: String,
    },
    Query {
        session_id: String,
        query: String,
    },
    DeleteSession {
        session_id: String,
    },
    SystemStatus,

    // Job API (remote GPU service)
    UploadJobVideo {
        video_path: PathBuf,
        #[serde(default)]
        config: Value,
    },
    ProcessJob {
        job_id: String,
    },
    JobStatus {
        job_id: String,
    },
    QueryJob {
        job_id: String,
        query: String,
    },
    ListJobs,

    SceneDetection {
        video_path: PathBuf,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default = "default_min_duration")]
        min_duration: f64,
        #[serde(default = "default_max_duration")]
        max_duration: f64,
    },
    ModelsInfo,
    ModelsSetup {
        models_dir: PathBuf,
    },
    GetConfig,
    UpdateConfig {
        config: Value,
    },
    Progress {
        task_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Payload {
    Empty,
    Json(Value),
    /// Multipart upload: the file goes in part `video`, the JSON in part `config`
    Video { path: PathBuf, config: Value },
}

/// Method, path segments and body of one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Route {
    pub method: Method,
    pub segments: Vec<String>,
    pub payload: Payload,
}

impl Route {
    fn new(method: Method, segments: &[&str], payload: Payload) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            payload,
        }
    }

    pub fn status() -> Self {
        Self::new(Method::GET, &["api", "system", "status"], Payload::Empty)
    }

    pub fn initialize(config: Value) -> Self {
        Self::new(Method::POST, &["api", "initialize"], Payload::Json(config))
    }

    pub fn load_model(model_path: &Path) -> Self {
        Self::new(
            Method::POST,
            &["api", "load-internvideo2"],
            Payload::Json(json!({ "model_path": model_path })),
        )
    }

    pub fn release_model() -> Self {
        Self::new(
            Method::POST,
            &["api", "release-internvideo2"],
            Payload::Json(json!({})),
        )
    }

    /// Human-readable `METHOD /path` for logs.
    pub fn describe(&self) -> String {
        format!("{} /{}", self.method, self.segments.join("/"))
    }
}

fn check_video_extension(path: &Path) -> Result<(), BackendError> {
    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_VIDEO_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false);

    if supported {
        Ok(())
    } else {
        Err(BackendError::UnsupportedVideo(path.to_path_buf()))
    }
}

impl BackendRequest {
    /// Client-side checks that must pass before anything is sent.
    pub fn validate(&self) -> Result<(), BackendError> {
        match self {
            BackendRequest::UploadVideos { video_paths, .. } => {
                video_paths.iter().try_for_each(|p| check_video_extension(p))
            }
            BackendRequest::UploadJobVideo { video_path, .. }
            | BackendRequest::SceneDetection { video_path, .. } => check_video_extension(video_path),
            _ => Ok(()),
        }
    }

    pub(crate) fn route(&self) -> Route {
        use BackendRequest::*;

        match self {
            UploadVideos {
                session_id,
                video_paths,
                base_storage_path,
            } => Route::new(
                Method::POST,
                &["api", "sessions", session_id.as_str(), "videos", "upload"],
                Payload::Json(json!({
                    "video_path_list": video_paths,
                    "base_storage_path": base_storage_path,
                })),
            ),
            SessionStatus { session_id } => Route::new(
                Method::GET,
                &["api", "sessions", session_id.as_str(), "status"],
                Payload::Empty,
            ),
            Query { session_id, query } => Route::new(
                Method::POST,
                &["api", "sessions", session_id.as_str(), "query"],
                Payload::Json(json!({ "query": query })),
            ),
            DeleteSession { session_id } => Route::new(
                Method::DELETE,
                &["api", "sessions", session_id.as_str(), "delete"],
                Payload::Empty,
            ),
            SystemStatus => Route::status(),

            UploadJobVideo { video_path, config } => Route::new(
                Method::POST,
                &["api", "upload", "video"],
                Payload::Video {
                    path: video_path.clone(),
                    config: if config.is_null() { json!({}) } else { config.clone() },
                },
            ),
            ProcessJob { job_id } => Route::new(
                Method::POST,
                &["api", "jobs", job_id.as_str(), "process"],
                Payload::Json(json!({})),
            ),
            JobStatus { job_id } => {
                Route::new(Method::GET, &["api", "jobs", job_id.as_str()], Payload::Empty)
            }
            QueryJob { job_id, query } => Route::new(
                Method::POST,
                &["api", "jobs", job_id.as_str(), "query"],
                Payload::Json(json!({ "query": query })),
            ),
            ListJobs => Route::new(Method::GET, &["api", "jobs"], Payload::Empty),

            SceneDetection {
                video_path,
                threshold,
                min_duration,
                max_duration,
            } => Route::new(
                Method::POST,
                &["api", "scene-detection"],
                Payload::Json(json!({
                    "video_path": video_path,
                    "threshold": threshold,
                    "min_duration": min_duration,
                    "max_duration": max_duration,
                })),
            ),
            ModelsInfo => Route::new(Method::GET, &["api", "models", "info"], Payload::Empty),
            ModelsSetup { models_dir } => Route::new(
                Method::POST,
                &["api", "models", "setup"],
                Payload::Json(json!({ "models_dir": models_dir })),
            ),
            GetConfig => Route::new(Method::GET, &["api", "config", "get"], Payload::Empty),
            UpdateConfig { config } => Route::new(
                Method::POST,
                &["api", "config", "update"],
                Payload::Json(config.clone()),
            ),
            Progress { task_id } => Route::new(
                Method::GET,
                &["api", "progress", "get", task_id.as_str()],
                Payload::Empty,
            ),
        }
    }
}
