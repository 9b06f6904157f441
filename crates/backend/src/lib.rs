//! Backend lifecycle and model controller for the Vimo desktop app.
//!
//! The UI never talks to the video-understanding backend directly. It issues
//! commands against [`LifecycleController`], which owns the believed service
//! state, serializes start/stop/load/release requests, downloads the model
//! checkpoint, and persists chat sessions through [`sessions::SessionStore`].

pub mod config;
pub mod controller;
pub mod downloads;
mod error;
pub mod models;
pub mod response;
pub mod sessions;
pub mod supervisor;

pub use controller::{LifecycleController, LoadingFlags, ServiceState};
pub use error::{Error, ErrorKind};
pub use response::CommandResponse;
