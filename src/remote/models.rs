//! Response types for the hosting service's JSON API.
//!
//! Every endpoint wraps its payload in a top-level `response` object. Numeric
//! fields are sent as strings by some API versions, so they go through
//! [`de_opt_u64`].

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Top-level wrapper around every API response.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub response: ApiResponse,
}

/// The `response` object. Only the payload relevant to the endpoint is set.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub error: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub folder_info: Option<FolderInfo>,
    #[serde(default)]
    pub folder_content: Option<FolderContent>,
    #[serde(default)]
    pub file_info: Option<RemoteFile>,
}

impl ApiResponse {
    pub(crate) fn is_error(&self) -> bool {
        self.result
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("error"))
    }
}

/// Folder metadata from `folder/get_info`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FolderInfo {
    /// Folder key.
    #[serde(rename = "folderkey")]
    pub key: String,
    /// Display name.
    pub name: String,
}

/// One chunk of `folder/get_content`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FolderContent {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(default)]
    pub folders: Vec<RemoteFolder>,
    #[serde(default)]
    pub more_chunks: Option<String>,
}

impl FolderContent {
    pub(crate) fn has_more(&self) -> bool {
        self.more_chunks
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("yes"))
    }
}

/// A file as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    /// Quick key identifying the file.
    #[serde(rename = "quickkey")]
    pub key: String,
    /// Published file name.
    #[serde(rename = "filename")]
    pub name: String,
    /// Size in bytes.
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub size: Option<u64>,
    /// Lowercase hex SHA-256.
    #[serde(default)]
    pub hash: Option<String>,
    /// Share page links.
    #[serde(default)]
    pub links: Option<FileLinks>,
}

impl RemoteFile {
    /// The share page URL, falling back to the canonical shape under `base_url`.
    #[must_use]
    pub fn share_url(&self, base_url: &str) -> String {
        self.links
            .as_ref()
            .and_then(|l| l.normal_download.as_deref())
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map_or_else(
                || format!("{}/file/{}/file", base_url.trim_end_matches('/'), self.key),
                ToString::to_string,
            )
    }
}

/// Link set attached to a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileLinks {
    /// Human-facing share page.
    #[serde(default)]
    pub normal_download: Option<String>,
}

/// A sub-folder as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFolder {
    /// Folder key.
    #[serde(rename = "folderkey")]
    pub key: String,
    /// Display name.
    pub name: String,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<T> {
    /// Items on this page, in API order.
    pub items: Vec<T>,
    /// Whether the API reported further pages.
    pub more: bool,
}

/// Accepts `123`, `"123"`, `""` and `null`.
fn de_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed.parse().map(Some).map_err(de::Error::custom)
            }
        }
    }
}
