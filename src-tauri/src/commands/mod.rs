mod models;
mod registry;
mod service;
mod sessions;
mod settings;
mod videorag;

// Re-export all commands for convenience
pub use models::*;
pub use service::*;
pub use sessions::*;
pub use settings::*;
pub use videorag::*;

use std::sync::Arc;

use tauri::{AppHandle, Manager};
use vimo_backend::LifecycleController;

/// Owned handle to the controller, so async commands don't borrow `State`.
fn controller(app: &AppHandle) -> Arc<LifecycleController> {
    app.state::<Arc<LifecycleController>>().inner().clone()
}
