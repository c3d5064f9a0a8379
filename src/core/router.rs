//! Routing of finished records into the output collections.
//!
//! Mono results are written to the mono collection (with their final path)
//! and synced before the file is moved out of the staging directory, so a
//! crash in between leaves a row pointing at a file still in staging rather
//! than a moved file with no row.
//!
//! The move is a rename when staging and mono share a filesystem, and a
//! copy followed by removal of the staged file when they do not.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::domain::{AudioType, CallRecord, ClassifiedResult, FailedRecord};

use super::collection::{CollectionError, OutputCollections};

/// Errors from routing a result
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error("Audio path has no file name: {0}")]
    MissingFileName(PathBuf),

    #[error("Failed to move {from} to {to}: {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes results to the right collection and moves mono files
pub struct OutputRouter {
    collections: Arc<OutputCollections>,
    mono_dir: PathBuf,
}

impl OutputRouter {
    pub fn new(collections: Arc<OutputCollections>, mono_dir: impl Into<PathBuf>) -> Self {
        Self {
            collections,
            mono_dir: mono_dir.into(),
        }
    }

    /// Route a classified result, returning it as written
    pub async fn route(&self, result: ClassifiedResult) -> Result<ClassifiedResult, RouteError> {
        match result.audio_type {
            AudioType::Dual => {
                self.collections.dual.append(&result).await?;
                Ok(result)
            }
            AudioType::Mono => {
                let file_name = result
                    .audio_path
                    .file_name()
                    .ok_or_else(|| RouteError::MissingFileName(result.audio_path.clone()))?;
                let target = self.mono_dir.join(file_name);
                let moved = result.relocated(&target);

                self.collections.mono.append_durable(&moved).await?;

                move_file(&result.audio_path, &target)
                    .await
                    .map_err(|source| RouteError::Relocate {
                        from: result.audio_path.clone(),
                        to: target.clone(),
                        source,
                    })?;

                debug!(
                    call_sid = %moved.call_sid,
                    path = %target.display(),
                    "Moved mono recording"
                );
                Ok(moved)
            }
        }
    }

    /// Record a call that has no recordings, verbatim
    pub async fn record_no_recording(&self, record: &CallRecord) -> Result<(), CollectionError> {
        self.collections.no_recording.append(record).await
    }

    /// Record a call whose recordings could not be listed
    pub async fn record_failure(&self, failed: &FailedRecord) -> Result<(), CollectionError> {
        self.collections.failed.append(failed).await
    }
}

/// Move a file, copying across filesystems where rename cannot
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    let Err(e) = fs::rename(from, to).await else {
        return Ok(());
    };
    if !fs::try_exists(from).await.unwrap_or(false) {
        return Err(e);
    }

    debug!(from = %from.display(), error = %e, "Rename failed, copying instead");
    copy_then_remove(from, to).await
}

async fn copy_then_remove(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Err(e) = fs::copy(from, to).await {
        let _ = fs::remove_file(to).await;
        return Err(e);
    }
    fs::File::open(to).await?.sync_all().await?;
    fs::remove_file(from).await
}
