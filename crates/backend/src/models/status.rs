use std::path::Path;

use serde::{Deserialize, Serialize};

use super::catalog::ModelArtifact;

/// Runtime status of the checkpoint on disk - computed, not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct ModelFilesStatus {
    /// Does the final checkpoint file exist?
    pub model_present: bool,
}

/// Presence check only; a `.partial` sibling does not count.
pub fn check_model_files(store_dir: &Path, artifact: &ModelArtifact) -> ModelFilesStatus {
    ModelFilesStatus {
        model_present: artifact.path_in(store_dir).is_file(),
    }
}
