use std::path::{Path, PathBuf};

use crate::config::ModelSettings;

/// Directory under the store root that holds downloaded checkpoints
pub const CHECKPOINTS_DIR: &str = "checkpoints";

/// InternVideo2 stage-2 checkpoint the backend loads for video embeddings
pub const INTERNVIDEO2_CHECKPOINT: ModelArtifact = ModelArtifact {
    name: "internvideo2",
    file_name: "InternVideo2-stage2_1b-224p-f4.pt",
    url: "https://huggingface.co/OpenGVLab/InternVideo2-Stage2_1B-224p-f4/resolve/main/InternVideo2-stage2_1b-224p-f4.pt",
};

/// A single downloadable model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelArtifact {
    pub name: &'static str,
    pub file_name: &'static str,
    pub url: &'static str,
}

impl ModelArtifact {
    /// `<store_dir>/checkpoints`
    pub fn checkpoints_dir(store_dir: &Path) -> PathBuf {
        store_dir.join(CHECKPOINTS_DIR)
    }

    /// `<store_dir>/checkpoints/<file_name>`
    pub fn path_in(&self, store_dir: &Path) -> PathBuf {
        Self::checkpoints_dir(store_dir).join(self.file_name)
    }

    /// Download URL, honouring a user override from settings.
    pub fn resolve_url(&self, settings: &ModelSettings) -> String {
        settings
            .checkpoint_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(self.url)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let path = INTERNVIDEO2_CHECKPOINT.path_in(Path::new("/data/vimo"));
        assert_eq!(
            path,
            PathBuf::from("/data/vimo/checkpoints/InternVideo2-stage2_1b-224p-f4.pt")
        );
    }

    #[test]
    fn test_resolve_url() {
        let mut settings = ModelSettings::default();
        assert_eq!(
            INTERNVIDEO2_CHECKPOINT.resolve_url(&settings),
            INTERNVIDEO2_CHECKPOINT.url
        );

        settings.checkpoint_url = Some(" ".to_string());
        assert_eq!(
            INTERNVIDEO2_CHECKPOINT.resolve_url(&settings),
            INTERNVIDEO2_CHECKPOINT.url
        );

        settings.checkpoint_url = Some("http://mirror.local/iv2.pt".to_string());
        assert_eq!(
            INTERNVIDEO2_CHECKPOINT.resolve_url(&settings),
            "http://mirror.local/iv2.pt"
        );
    }
}
