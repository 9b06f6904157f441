//! The façade the UI talks to: service and model lifecycle, model files,
//! chat sessions and pass-through backend requests.

mod lifecycle;
mod state;

pub use lifecycle::LifecycleController;
pub use state::{ModelPhase, Operation, ServicePhase, StateConflict};

use serde::{Deserialize, Serialize};

/// What the UI believes about the backend.
///
/// `intern_video2_loaded` is only ever true while `is_running` is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct ServiceState {
    pub is_running: bool,
    pub intern_video2_loaded: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Which operations are currently in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFlags {
    pub starting: bool,
    pub stopping: bool,
    /// Informational only: probes never block other operations
    pub checking_service: bool,
    pub loading_model: bool,
    pub releasing_model: bool,
}
