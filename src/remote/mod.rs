//! Typed access to the hosting service's JSON API.
//!
//! [`MediaFireApi`] covers the three endpoints the engine needs: folder info,
//! chunked folder content (files or sub-folders) and single-file info. The
//! base URL is configurable so tests can point it at a mock server.

mod models;

use tracing::{debug, instrument};
use url::Url;

use crate::error::RemoteError;
use crate::fetch::Fetcher;

pub use models::{Chunk, FileLinks, FolderInfo, RemoteFile, RemoteFolder};
use models::{ApiResponse, Envelope};

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://www.mediafire.com";

const FOLDER_INFO_PATH: &str = "/api/1.4/folder/get_info.php";
const FOLDER_CONTENT_PATH: &str = "/api/1.4/folder/get_content.php";
const FILE_INFO_PATH: &str = "/api/file/get_info.php";

/// Which half of a folder's content to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentType {
    Files,
    Folders,
}

impl ContentType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Folders => "folders",
        }
    }
}

/// Client for the folder and file info endpoints.
#[derive(Debug, Clone)]
pub struct MediaFireApi {
    fetcher: Fetcher,
    base_url: String,
}

impl MediaFireApi {
    /// Creates a client against the production host.
    #[must_use]
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_base_url(fetcher, DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom host (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { fetcher, base_url }
    }

    /// The host all endpoints are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying HTTP client.
    #[must_use]
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Fetches a folder's name and key.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the request fails, the API reports an
    /// error, or `folder_info` is absent.
    #[instrument(skip(self))]
    pub async fn folder_info(&self, folder_key: &str) -> Result<FolderInfo, RemoteError> {
        let url = self.folder_url(FOLDER_INFO_PATH, "folder", folder_key, 1)?;
        let response = self.call(&url).await?;
        response.folder_info.ok_or(RemoteError::Missing {
            url,
            field: "folder_info",
        })
    }

    /// Lists one chunk of files directly inside a folder.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the request fails or the API reports an
    /// error.
    #[instrument(skip(self))]
    pub async fn folder_files(
        &self,
        folder_key: &str,
        chunk: u32,
    ) -> Result<Chunk<RemoteFile>, RemoteError> {
        let (content, more) = self.folder_content(folder_key, ContentType::Files, chunk).await?;
        Ok(Chunk {
            items: content.files,
            more,
        })
    }

    /// Lists one chunk of sub-folders directly inside a folder.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the request fails or the API reports an
    /// error.
    #[instrument(skip(self))]
    pub async fn folder_subfolders(
        &self,
        folder_key: &str,
        chunk: u32,
    ) -> Result<Chunk<RemoteFolder>, RemoteError> {
        let (content, more) = self
            .folder_content(folder_key, ContentType::Folders, chunk)
            .await?;
        Ok(Chunk {
            items: content.folders,
            more,
        })
    }

    /// Fetches metadata for a single file.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the request fails, the API reports an
    /// error, or `file_info` is absent.
    #[instrument(skip(self))]
    pub async fn file_info(&self, quick_key: &str) -> Result<RemoteFile, RemoteError> {
        let mut url = self.endpoint(FILE_INFO_PATH)?;
        url.query_pairs_mut()
            .append_pair("quick_key", quick_key)
            .append_pair("response_format", "json");
        let url = url.to_string();

        let response = self.call(&url).await?;
        response.file_info.ok_or(RemoteError::Missing {
            url,
            field: "file_info",
        })
    }

    async fn folder_content(
        &self,
        folder_key: &str,
        content_type: ContentType,
        chunk: u32,
    ) -> Result<(models::FolderContent, bool), RemoteError> {
        let url = self.folder_url(FOLDER_CONTENT_PATH, content_type.as_str(), folder_key, chunk)?;
        let response = self.call(&url).await?;
        let content = response.folder_content.ok_or(RemoteError::Missing {
            url,
            field: "folder_content",
        })?;
        let more = content.has_more();
        debug!(
            content_type = content_type.as_str(),
            chunk,
            files = content.files.len(),
            folders = content.folders.len(),
            more,
            "listed chunk"
        );
        Ok((content, more))
    }

    fn folder_url(
        &self,
        path: &str,
        content_type: &str,
        folder_key: &str,
        chunk: u32,
    ) -> Result<String, RemoteError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .append_pair("r", "utga")
            .append_pair("content_type", content_type)
            .append_pair("filter", "all")
            .append_pair("order_by", "name")
            .append_pair("order_direction", "asc")
            .append_pair("chunk", &chunk.to_string())
            .append_pair("version", "1.5")
            .append_pair("folder_key", folder_key)
            .append_pair("response_format", "json");
        Ok(url.to_string())
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        let raw = format!("{}{path}", self.base_url);
        Url::parse(&raw).map_err(|e| RemoteError::Decode {
            url: raw,
            message: format!("invalid API base URL: {e}"),
        })
    }

    async fn call(&self, url: &str) -> Result<ApiResponse, RemoteError> {
        let body = self.fetcher.get_text(url).await?;
        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| RemoteError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let response = envelope.response;
        if response.is_error() {
            return Err(RemoteError::Api {
                code: response.error.unwrap_or(0),
                message: response
                    .message
                    .unwrap_or_else(|| "unspecified API error".to_string()),
            });
        }
        Ok(response)
    }
}
