use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("{context} ({}): {source}", path.display())]
    Io {
        context: &'static str,
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the failure looks like missing connectivity rather than a bad
    /// response or a local problem.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Http { source, .. } if source.is_connect() || source.is_timeout())
    }
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build an HTTP client whose requests, body included, are limited to
/// `timeout`. Connecting is limited separately to at most ten seconds so an
/// offline machine is noticed quickly even under a long `timeout`.
///
/// # Errors
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .user_agent(format!("pakhub/{}", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Streams remote files to disk through the shared HTTP client.
#[derive(Debug, Clone)]
pub struct FileDownloader {
    client: reqwest::Client,
}

impl FileDownloader {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `url` into `dest`, replacing any existing file. Returns the
    /// number of bytes written.
    ///
    /// # Errors
    /// Returns an error on connection failures, non-success statuses, or
    /// when the destination cannot be written.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        debug!("Downloading {url} to {}", dest.display());
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| DownloadError::http("download request failed", error))?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| {
                    DownloadError::io("failed to create download directory", parent, error)
                })?;
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|error| DownloadError::io("failed to create download file", dest, error))?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| DownloadError::http("download stream error", error))?;
            file.write_all(&chunk)
                .await
                .map_err(|error| DownloadError::io("failed to write download data", dest, error))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|error| DownloadError::io("failed to flush download file", dest, error))?;

        info!("Download complete: {downloaded} bytes from {url}");
        Ok(downloaded)
    }
}
