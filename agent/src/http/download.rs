//! Streamed downloads into the scratch directory

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::http::client::HttpClient;
use crate::platform::{DownloadProgress, Downloader, ProgressFn};
use crate::utils::generate_uuid;

/// Downloads remote content chunk by chunk into `downloads/`
pub struct HttpDownloader {
    client: HttpClient,
    dir: Dir,
}

impl HttpDownloader {
    pub fn new(client: HttpClient, dir: Dir) -> Self {
        Self { client, dir }
    }

    async fn fetch_into(
        &self,
        url: &str,
        path: &PathBuf,
        on_progress: ProgressFn<'_>,
    ) -> Result<(), AgentError> {
        let mut response = self.client.get_stream(url).await?;
        let total = response.content_length().unwrap_or(0);
        let mut current = 0u64;
        let mut last_pct = None;

        let mut file = fs::File::create(path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            current += chunk.len() as u64;

            let progress = DownloadProgress::new(total, current);
            if last_pct != Some(progress.pct) {
                last_pct = Some(progress.pct);
                on_progress(progress);
            }
        }
        file.flush().await?;
        file.sync_all().await?;

        if total > 0 && current != total {
            return Err(AgentError::ValidationError(format!(
                "short download: {} of {} bytes",
                current, total
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download_to_temp(
        &self,
        url: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf, AgentError> {
        self.dir.create().await?;
        let path = self.dir.path().join(format!("{}.part", generate_uuid()));
        debug!("Downloading {} to {}", url, path.display());

        match self.fetch_into(url, &path, on_progress).await {
            Ok(()) => Ok(path),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&path).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {}: {}", path.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }
}
