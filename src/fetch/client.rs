//! HTTP client wrapper used by every network-facing stage.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::error::{DownloadError, FilesystemError, NetworkError};
use crate::user_agent;

/// HTTP client for share pages, API calls and file bodies.
///
/// Create once and clone freely; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

/// Outcome of streaming a body to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedBody {
    /// Bytes written.
    pub bytes_written: u64,
    /// `Content-Length` of the response, when sent.
    pub content_length: Option<u64>,
    /// Lowercase hex SHA-256 of the written bytes.
    pub sha256: String,
}

/// Response headers of interest from a HEAD request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadInfo {
    /// `Content-Length`, when sent.
    pub content_length: Option<u64>,
    /// `Content-Type`, when sent.
    pub content_type: Option<String>,
}

impl Fetcher {
    /// Creates a client with default timeouts (30 s connect, 60 s idle read).
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` builder error when the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeouts in seconds.
    ///
    /// The read timeout applies between body chunks, so large files are not
    /// cut off as long as bytes keep flowing.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` builder error when the client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// GETs `url` and returns the body as text.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] on transport failure or non-success status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_text(&self, url: &str) -> Result<String, NetworkError> {
        let response = self.send(self.client.get(url), url).await?;
        response
            .text()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, &e))
    }

    /// Sends a HEAD request for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] on transport failure or non-success status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn head(&self, url: &str) -> Result<HeadInfo, NetworkError> {
        let response = self.send(self.client.head(url), url).await?;
        let headers = response.headers();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(HeadInfo {
            content_length,
            content_type,
        })
    }

    /// GETs `url` and streams the body into `file`, hashing as it goes.
    ///
    /// `on_progress` receives the running byte count after every chunk.
    /// The caller owns cleanup of `file` on error.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] for request or mid-body failures and
    /// [`DownloadError::Filesystem`] when writing fails.
    #[instrument(skip(self, file, on_progress), fields(url = %url, path = %path.display()))]
    pub async fn stream_to_file<F>(
        &self,
        url: &str,
        file: File,
        path: &Path,
        mut on_progress: F,
    ) -> Result<StreamedBody, DownloadError>
    where
        F: FnMut(u64) + Send,
    {
        let response = self.send(self.client.get(url), url).await?;
        let content_length = response.content_length();

        let mut writer = BufWriter::new(file);
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| NetworkError::from_reqwest(url, &e))?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FilesystemError::from_io(path, &e))?;
            hasher.update(&chunk);

            bytes_written += chunk.len() as u64;
            on_progress(bytes_written);
        }

        writer
            .flush()
            .await
            .map_err(|e| FilesystemError::from_io(path, &e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| FilesystemError::from_io(path, &e))?;

        debug!(bytes = bytes_written, "body streamed");

        Ok(StreamedBody {
            bytes_written,
            content_length,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, NetworkError> {
        let response = request
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(NetworkError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after,
            });
        }

        Ok(response)
    }
}
