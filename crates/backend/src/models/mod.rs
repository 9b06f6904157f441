//! Model checkpoint catalog and on-disk layout.
//!
//! Layout: `<storeDirectory>/checkpoints/<file_name>`. Presence of that exact
//! path is the only completeness signal; partial transfers never land there.

mod catalog;
mod status;

pub use catalog::{ModelArtifact, CHECKPOINTS_DIR, INTERNVIDEO2_CHECKPOINT};
pub use status::{check_model_files, ModelFilesStatus};
