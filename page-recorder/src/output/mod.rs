//! Post-processing of the encoder's output once it has exited.

mod s3;

pub use s3::S3Uploader;

use async_trait::async_trait;
use process_utils::ExitInfo;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::Result;
use crate::config::{OutputTarget, S3Target, STAGING_FILE};

/// Transfers a finished local file to object storage.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `local` to `target`, returning the object's location.
    async fn upload(&self, local: &Path, target: &S3Target) -> Result<String>;
}

/// Result of the staged upload step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { location: String },
    Failed { reason: String },
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }
}

/// Decides what happens to the encoder's output after it exits.
pub struct OutputRouter {
    uploader: Arc<dyn Uploader>,
    staging_path: PathBuf,
}

impl OutputRouter {
    pub fn new(uploader: Arc<dyn Uploader>) -> Self {
        Self {
            uploader,
            staging_path: PathBuf::from(STAGING_FILE),
        }
    }

    /// Read staged recordings from `path` instead of the working directory.
    pub fn with_staging_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_path = path.into();
        self
    }

    /// Run the post-exit step for `output`.
    ///
    /// Files and streams were written by the encoder itself and need nothing.
    /// A staged recording is uploaded exactly once; failure is logged and
    /// returned, never retried.
    pub async fn on_encoder_exit(
        &self,
        output: &OutputTarget,
        exit: &ExitInfo,
    ) -> Option<UploadOutcome> {
        let OutputTarget::StagedUpload(target) = output else {
            return None;
        };

        if !exit.success() && !exit.interrupted() {
            warn!(%exit, "Encoder did not exit cleanly, uploading whatever was staged");
        }

        info!(
            bucket = %target.bucket,
            key = %target.key,
            "Uploading {}",
            self.staging_path.display()
        );

        let outcome = match self.uploader.upload(&self.staging_path, target).await {
            Ok(location) => {
                info!(%location, "Recording uploaded");
                UploadOutcome::Uploaded { location }
            }
            Err(e) => {
                warn!(
                    bucket = %target.bucket,
                    key = %target.key,
                    "Upload failed, recording left at {}: {}",
                    self.staging_path.display(),
                    e
                );
                UploadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        Some(outcome)
    }
}
