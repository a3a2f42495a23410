use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::{AppEvent, Notifier, Result};
use crate::domain::{DownloadModel, DownloadedState};
use crate::download::{DownloadResult, FileDownloader};
use crate::store::Store;

/// Minimum spacing between two progress events for the same download.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Works through the `waiting` downloads one at a time.
pub struct DownloadWorker {
    store: Arc<dyn Store + Send + Sync>,
    downloader: Arc<FileDownloader>,
    notifier: Notifier,
}

impl DownloadWorker {
    pub fn new(
        store: Arc<dyn Store + Send + Sync>,
        downloader: Arc<FileDownloader>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            downloader,
            notifier,
        }
    }

    /// Drain the queue. Returns how many downloads finished.
    ///
    /// Cancelling `cancel` stops the current download and leaves the rest of
    /// the queue `waiting` for the next run.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<usize> {
        self.requeue_interrupted()?;

        let mut finished = 0;
        let mut failed = Vec::new();

        while !cancel.is_cancelled() {
            let Some(model) = self.next_waiting()? else {
                break;
            };
            match self.process(model, &cancel.child_token()).await? {
                Outcome::Finished => finished += 1,
                Outcome::Canceled => {}
                Outcome::Failed(model) => failed.push(model),
            }
        }
        if cancel.is_cancelled() {
            info!("Download run canceled");
        }

        if !failed.is_empty() {
            warn!("{} download(s) failed", failed.len());
            self.notifier.send(AppEvent::DownloadFailed(failed));
        }

        info!("Download queue drained, {} finished", finished);
        Ok(finished)
    }

    /// Rows left `downloading` by a previous run that never finished.
    fn requeue_interrupted(&self) -> Result<()> {
        for mut model in self.store.get_downloads_by_state(DownloadedState::Downloading)? {
            debug!("Requeueing interrupted download {}", model.id);
            model.state = DownloadedState::Waiting;
            self.store.update_download(&model)?;
        }
        Ok(())
    }

    fn next_waiting(&self) -> Result<Option<DownloadModel>> {
        Ok(self
            .store
            .get_downloads_by_state(DownloadedState::Waiting)?
            .into_iter()
            .next())
    }

    /// Download one model. Canceled and failed models leave the queue.
    async fn process(
        &self,
        mut model: DownloadModel,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        model.state = DownloadedState::Downloading;
        self.store.update_download(&model)?;
        info!("Downloading {} ({})", model.title, model.url);

        let id = model.id.clone();
        let notifier = &self.notifier;
        let mut throttle = ProgressThrottle::default();

        let result = self
            .downloader
            .download(&model.url, &model.path, cancel, |value, size| {
                if !throttle.ready(Instant::now()) {
                    return;
                }
                notifier.send(AppEvent::DownloadProgress {
                    id: id.clone(),
                    value,
                    size,
                });
            })
            .await;

        match result {
            DownloadResult::Success => {
                model.size = tokio::fs::metadata(&model.path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(model.size);
                model.state = DownloadedState::Downloaded;
                model.last_modified = Some(Utc::now());
                self.store.update_download(&model)?;
                self.notifier.send(AppEvent::DownloadFinished { id: model.id });
                Ok(Outcome::Finished)
            }
            DownloadResult::Canceled => {
                debug!("Removing canceled download {}", model.id);
                self.store.remove_download(&model.id)?;
                Ok(Outcome::Canceled)
            }
            DownloadResult::Error(e) => {
                warn!("Removing failed download {}: {}", model.id, e);
                self.store.remove_download(&model.id)?;
                Ok(Outcome::Failed(model))
            }
        }
    }
}

enum Outcome {
    Finished,
    Canceled,
    Failed(DownloadModel),
}

/// Lets the first progress report through, then at most one per
/// [`PROGRESS_INTERVAL`].
#[derive(Default)]
struct ProgressThrottle {
    last: Option<Instant>,
}

impl ProgressThrottle {
    fn ready(&mut self, now: Instant) -> bool {
        if self
            .last
            .is_some_and(|t| now.saturating_duration_since(t) < PROGRESS_INTERVAL)
        {
            return false;
        }
        self.last = Some(now);
        true
    }
}
