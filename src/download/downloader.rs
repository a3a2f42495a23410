use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::{CoursewareError, Result};

#[derive(Debug)]
pub enum DownloadResult {
    Success,
    Canceled,
    Error(CoursewareError),
}

/// Streams a single URL to disk.
///
/// Each download is bound to a [`CancellationToken`]. Cancelling it stops the
/// download and its partial file is removed.
pub struct FileDownloader {
    client: Client,
}

impl FileDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("courseware/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Download `url` to `path`, replacing any existing file.
    ///
    /// `progress` receives `(bytes_read, content_length)` after every chunk;
    /// the length is 0 when the server does not announce one. A token that is
    /// already cancelled yields [`DownloadResult::Canceled`] without a request.
    pub async fn download<F>(
        &self,
        url: &str,
        path: &Path,
        cancel: &CancellationToken,
        mut progress: F,
    ) -> DownloadResult
    where
        F: FnMut(u64, u64) + Send,
    {
        match self.stream_to_file(url, path, cancel, &mut progress).await {
            Ok(true) => DownloadResult::Success,
            Ok(false) => {
                debug!("Download of {} canceled", url);
                remove_partial(path).await;
                DownloadResult::Canceled
            }
            Err(e) => {
                warn!("Download of {} failed: {}", url, e);
                remove_partial(path).await;
                DownloadResult::Error(e)
            }
        }
    }

    /// Returns `false` when canceled.
    async fn stream_to_file<F>(
        &self,
        url: &str,
        path: &Path,
        token: &CancellationToken,
        progress: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(u64, u64) + Send,
    {
        if token.is_cancelled() {
            return Ok(false);
        }
        let response = tokio::select! {
            _ = token.cancelled() => return Ok(false),
            response = self.client.get(url).send() => response?,
        };
        let response = response.error_for_status()?;
        let total = response.content_length().unwrap_or(0);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut read: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return Ok(false),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            read += chunk.len() as u64;
            progress(read, total);
        }

        file.flush().await?;
        Ok(true)
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial file {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader() -> FileDownloader {
        FileDownloader::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_download_writes_file_and_reports_progress() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("media").join("video.mp4");
        let mut last = (0, 0);

        let result = downloader()
            .download(
                &format!("{}/video.mp4", server.uri()),
                &target,
                &CancellationToken::new(),
                |read, total| last = (read, total),
            )
            .await;

        assert!(matches!(result, DownloadResult::Success));
        assert_eq!(std::fs::read(&target).unwrap(), body);
        assert_eq!(last, (body.len() as u64, body.len() as u64));
    }

    #[tokio::test]
    async fn test_download_replaces_existing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("new"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("page.html");
        std::fs::write(&target, "old content that is longer").unwrap();

        let result = downloader()
            .download(
                &format!("{}/page.html", server.uri()),
                &target,
                &CancellationToken::new(),
                |_, _| {},
            )
            .await;

        assert!(matches!(result, DownloadResult::Success));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_http_error_removes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("missing.mp4");

        let result = downloader()
            .download(
                &format!("{}/missing.mp4", server.uri()),
                &target,
                &CancellationToken::new(),
                |_, _| {},
            )
            .await;

        assert!(matches!(result, DownloadResult::Error(_)));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_cancel_deletes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 1024])
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("slow.mp4");
        std::fs::write(&target, "partial").unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = downloader()
            .download(&format!("{}/slow.mp4", server.uri()), &target, &cancel, |_, _| {})
            .await;

        assert!(matches!(result, DownloadResult::Canceled));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_cancel_before_start_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("data"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("early.mp4");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = downloader()
            .download(&format!("{}/early.mp4", server.uri()), &target, &cancel, |_, _| {})
            .await;

        assert!(matches!(result, DownloadResult::Canceled));
        assert!(!target.exists());
    }
}
