//! Lifecycle state machine - single source of truth for valid transitions
//!
//! State diagram:
//! ```text
//! Service:  Stopped ──start──> Starting ──ok──> Running ──stop──> Stopping ──ok──> Stopped
//!              ^                  │                ^                  │
//!              └──────failed──────┘                └──────failed──────┘
//!
//! Model (only while Running):
//!           Unloaded ──load──> Loading ──ok──> Loaded ──release──> Releasing ──ok──> Unloaded
//! ```
//!
//! A failed or abandoned transition restores the phases it started from.

use serde::Serialize;

/// Service dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, specta::Type, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "lowercase")]
pub enum ServicePhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Model dimension, meaningful only while the service runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, specta::Type, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelPhase {
    Unloaded,
    Loading,
    Loaded,
    Releasing,
}

/// Mutating operations the controller serializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Operation {
    #[strum(serialize = "start")]
    Start,
    #[strum(serialize = "stop")]
    Stop,
    #[strum(serialize = "load model")]
    LoadModel,
    #[strum(serialize = "release model")]
    ReleaseModel,
}

/// Reason a request was rejected without reaching the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateConflict {
    #[error("Another {0} request is already in progress")]
    InProgress(Operation),
    #[error("Cannot {operation} while the service is {service}")]
    Service {
        operation: Operation,
        service: ServicePhase,
    },
    #[error("Cannot {operation} while the model is {model}")]
    Model {
        operation: Operation,
        model: ModelPhase,
    },
}

/// Pair of phases the controller believes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    pub service: ServicePhase,
    pub model: ModelPhase,
}

impl Phases {
    pub const STOPPED: Self = Self {
        service: ServicePhase::Stopped,
        model: ModelPhase::Unloaded,
    };

    /// Is a mutating transition in flight?
    pub fn is_transitioning(self) -> bool {
        matches!(
            self.service,
            ServicePhase::Starting | ServicePhase::Stopping
        ) || matches!(self.model, ModelPhase::Loading | ModelPhase::Releasing)
    }

    /// Still counts as running until a stop has actually succeeded.
    pub fn is_running(self) -> bool {
        matches!(self.service, ServicePhase::Running | ServicePhase::Stopping)
    }

    pub fn is_model_loaded(self) -> bool {
        self.is_running() && matches!(self.model, ModelPhase::Loaded | ModelPhase::Releasing)
    }

    /// Pure function: the in-flight phases for `operation`, or why it is refused.
    pub fn begin(self, operation: Operation) -> Result<Phases, StateConflict> {
        use ModelPhase as M;
        use ServicePhase as S;

        let service_conflict = StateConflict::Service {
            operation,
            service: self.service,
        };
        let model_conflict = StateConflict::Model {
            operation,
            model: self.model,
        };

        match operation {
            Operation::Start => match self.service {
                S::Stopped => Ok(Phases {
                    service: S::Starting,
                    model: M::Unloaded,
                }),
                S::Starting => Err(StateConflict::InProgress(operation)),
                _ => Err(service_conflict),
            },

            Operation::Stop => match (self.service, self.model) {
                (S::Running, M::Unloaded | M::Loaded) => Ok(Phases {
                    service: S::Stopping,
                    model: self.model,
                }),
                // Let the model operation finish first
                (S::Running, _) => Err(model_conflict),
                (S::Stopping, _) => Err(StateConflict::InProgress(operation)),
                _ => Err(service_conflict),
            },

            Operation::LoadModel => match (self.service, self.model) {
                (S::Running, M::Unloaded) => Ok(Phases {
                    service: S::Running,
                    model: M::Loading,
                }),
                (S::Running, M::Loading) => Err(StateConflict::InProgress(operation)),
                (S::Running, _) => Err(model_conflict),
                _ => Err(service_conflict),
            },

            Operation::ReleaseModel => match (self.service, self.model) {
                (S::Running, M::Loaded) => Ok(Phases {
                    service: S::Running,
                    model: M::Releasing,
                }),
                (S::Running, M::Releasing) => Err(StateConflict::InProgress(operation)),
                (S::Running, _) => Err(model_conflict),
                _ => Err(service_conflict),
            },
        }
    }

    /// Phases after `operation` succeeded.
    pub fn complete(self, operation: Operation) -> Phases {
        match operation {
            Operation::Start => Phases {
                service: ServicePhase::Running,
                model: ModelPhase::Unloaded,
            },
            // A stopped service cannot hold a loaded model
            Operation::Stop => Phases::STOPPED,
            Operation::LoadModel => Phases {
                service: self.service,
                model: ModelPhase::Loaded,
            },
            Operation::ReleaseModel => Phases {
                service: self.service,
                model: ModelPhase::Unloaded,
            },
        }
    }
}
