// Downloader: best-effort local copy of a post's video.
//
// Never fails. Every problem is logged and reported as `success = false`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use postrelay_common::{DownloadReport, PostRecord};

use crate::media;
use crate::store::Store;

/// Upper bound on one whole video download, body included.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn save(&self, record: &PostRecord) -> DownloadReport;
}

/// Save `record`'s video on a detached task and record the folder on the
/// Draft if it still holds the same post when the save finishes.
pub(crate) fn spawn_save(downloader: Arc<dyn Downloader>, store: Store, record: PostRecord) {
    tokio::spawn(async move {
        let report = downloader.save(&record).await;
        if !report.success {
            return;
        }
        let Some(folder) = report.folder_path else {
            return;
        };
        let write_back = store
            .update_draft_if(record.post_id.as_deref(), |draft| {
                draft.saved_folder_path = Some(folder.clone());
            })
            .await;
        match write_back {
            Ok(true) => info!(post_id = ?record.post_id, folder = folder.as_str(), "Draft updated with saved folder"),
            Ok(false) => debug!(post_id = ?record.post_id, "Draft changed before download finished"),
            Err(e) => warn!(error = %e, "Failed to record saved folder"),
        }
    });
}

/// Writes videos to `<root>/X_Posts/Tweet_<timestamp>/video.<ext>`.
pub struct FsDownloader {
    http: reqwest::Client,
    root: PathBuf,
}

impl FsDownloader {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_timeout(root, DOWNLOAD_TIMEOUT)
    }

    pub fn with_timeout(root: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            root: root.into(),
        })
    }

    async fn open(&self, url: &str) -> Result<Source> {
        if media::is_data_url(url) {
            return Ok(Source::Inline(media::decode_data_url(url)?.bytes));
        }
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("video request failed")?
            .error_for_status()
            .context("video host returned an error status")?;
        Ok(Source::Remote(response))
    }

    async fn write(&self, url: &str) -> Result<PathBuf> {
        let source = self.open(url).await?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        let folder = self.root.join("X_Posts").join(format!("Tweet_{timestamp}"));
        tokio::fs::create_dir_all(&folder)
            .await
            .with_context(|| format!("Failed to create {}", folder.display()))?;

        let path = folder.join(format!("video.{}", media::video_extension(url)));
        let written = match source {
            Source::Inline(bytes) => write_bytes(&path, &bytes).await,
            Source::Remote(response) => stream_to(&path, response).await,
        };
        let bytes = match written {
            Ok(n) => n,
            Err(e) => {
                // No half-written videos.
                let _ = tokio::fs::remove_dir_all(&folder).await;
                return Err(e);
            }
        };

        info!(path = %path.display(), bytes, "Video saved");
        Ok(folder)
    }
}

enum Source {
    Inline(Vec<u8>),
    Remote(reqwest::Response),
}

async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<u64> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(bytes.len() as u64)
}

/// Copy the response body to `path` chunk by chunk.
async fn stream_to(path: &Path, mut response: reqwest::Response) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.context("video body read failed")? {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl Downloader for FsDownloader {
    async fn save(&self, record: &PostRecord) -> DownloadReport {
        let Some(ref url) = record.video else {
            return DownloadReport::skipped("no_video");
        };
        if !media::is_fetchable(url) {
            warn!(url = url.as_str(), "Video URL is not fetchable, skipping download");
            return DownloadReport::skipped("unfetchable_url");
        }

        match self.write(url).await {
            Ok(folder) => DownloadReport::saved(folder.to_string_lossy()),
            Err(e) => {
                warn!(post_id = ?record.post_id, error = %e, "Video download failed");
                DownloadReport::skipped(format!("{e:#}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_video_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = FsDownloader::new(dir.path()).unwrap();
        let report = downloader.save(&PostRecord::default()).await;
        assert_eq!(report, DownloadReport::skipped("no_video"));
    }

    #[tokio::test]
    async fn blob_video_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = FsDownloader::new(dir.path()).unwrap();
        let record = PostRecord {
            video: Some("blob:https://x.com/123".into()),
            ..Default::default()
        };
        let report = downloader.save(&record).await;
        assert!(!report.success);
        assert_eq!(report.reason.as_deref(), Some("unfetchable_url"));
    }

    #[tokio::test]
    async fn inline_video_is_written_to_timestamped_folder() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = FsDownloader::new(dir.path()).unwrap();
        let record = PostRecord {
            video: Some("data:video/mp4;base64,AAECAw==".into()),
            ..Default::default()
        };

        let report = downloader.save(&record).await;

        assert!(report.success);
        let folder = PathBuf::from(report.folder_path.unwrap());
        assert!(folder.starts_with(dir.path().join("X_Posts")));
        let saved = std::fs::read(folder.join("video.mp4")).unwrap();
        assert_eq!(saved, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn malformed_inline_video_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = FsDownloader::new(dir.path()).unwrap();
        let record = PostRecord {
            video: Some("data:video/mp4;base64,@@@".into()),
            ..Default::default()
        };
        let report = downloader.save(&record).await;
        assert!(!report.success);
        assert!(report.folder_path.is_none());
    }

    /// Serve one canned HTTP response and return its URL.
    async fn serve_once(body: &'static [u8]) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/media/clip.mp4")
    }

    #[tokio::test]
    async fn remote_video_is_streamed_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = FsDownloader::new(dir.path()).unwrap();
        let record = PostRecord {
            post_id: Some("42".into()),
            video: Some(serve_once(b"remote video bytes").await),
            ..Default::default()
        };

        let report = downloader.save(&record).await;

        assert!(report.success, "{:?}", report.reason);
        let folder = PathBuf::from(report.folder_path.unwrap());
        let saved = std::fs::read(folder.join("video.mp4")).unwrap();
        assert_eq!(saved, b"remote video bytes");
    }

    #[tokio::test]
    async fn stalled_host_times_out_without_leaving_a_folder() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let dir = tempfile::tempdir().unwrap();
        let downloader =
            FsDownloader::with_timeout(dir.path(), Duration::from_millis(200)).unwrap();
        let record = PostRecord {
            video: Some(format!("http://{addr}/clip.mp4")),
            ..Default::default()
        };

        let report = tokio::time::timeout(Duration::from_secs(10), downloader.save(&record))
            .await
            .expect("save should give up on its own");

        assert!(!report.success);
        assert!(report.folder_path.is_none());
        assert!(!dir.path().join("X_Posts").exists());
    }
}
