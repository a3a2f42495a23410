//! Offline copies of course media: the queue, the worker that drains it
//! and the streaming downloader underneath.

pub mod downloader;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::app::{CoursewareError, Result};
use crate::domain::{CourseStructure, DownloadModel, VideoQuality};
use crate::store::Store;

pub use downloader::{DownloadResult, FileDownloader};
pub use worker::DownloadWorker;

/// Adds, lists and removes queued downloads.
pub struct DownloadQueue {
    store: Arc<dyn Store + Send + Sync>,
    download_dir: PathBuf,
    quality: VideoQuality,
}

impl DownloadQueue {
    pub fn new(
        store: Arc<dyn Store + Send + Sync>,
        download_dir: PathBuf,
        quality: VideoQuality,
    ) -> Self {
        Self {
            store,
            download_dir,
            quality,
        }
    }

    /// Queue every downloadable leaf under each of `block_ids`.
    ///
    /// Returns the models that were newly queued; blocks already in the
    /// queue are left alone.
    pub fn add_blocks(
        &self,
        structure: &CourseStructure,
        block_ids: &[String],
    ) -> Result<Vec<DownloadModel>> {
        let mut models: Vec<DownloadModel> = Vec::new();

        for block_id in block_ids {
            if structure.block(block_id).is_none() {
                return Err(CoursewareError::BlockNotFound(block_id.clone()));
            }
            for leaf in structure.leaves_under(block_id) {
                if models.iter().any(|m| m.id == leaf.id) {
                    continue;
                }
                let model =
                    DownloadModel::for_block(&structure.id, leaf, &self.download_dir, self.quality);
                if let Some(model) = model {
                    models.push(model);
                }
            }
        }

        let mut queued = Vec::new();
        for model in models {
            if self.store.get_download(&model.id)?.is_none() {
                queued.push(model);
            }
        }
        let added = self.store.add_downloads(&queued)?;
        info!("Queued {} download(s) from {}", added, structure.id);
        Ok(queued)
    }

    pub fn list(&self) -> Result<Vec<DownloadModel>> {
        self.store.get_all_downloads()
    }

    /// Drop a download and delete its file.
    pub fn remove(&self, id: &str) -> Result<DownloadModel> {
        let model = self
            .store
            .get_download(id)?
            .ok_or_else(|| CoursewareError::DownloadNotFound(id.to_string()))?;

        match std::fs::remove_file(&model.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", model.path.display(), e),
        }

        self.store.remove_download(id)?;
        Ok(model)
    }
}
