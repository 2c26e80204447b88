//! Error taxonomy shared by the engine.
//!
//! Every per-entry error is `Clone` so it can be carried inside progress events
//! and [`DownloadResult`](crate::manifest::DownloadResult) values. Underlying
//! `reqwest` and `std::io` errors are flattened into messages at the boundary.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure to obtain a direct URL from a share page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// Neither extraction strategy found a direct link.
    #[error("direct download link not found in share page")]
    LinkNotFound,

    /// The share page reports the file as removed, expired or invalid.
    #[error("file has been removed from the hosting service")]
    SourceRemoved,

    /// The body is not a markup page at all (empty, truncated, binary).
    #[error("share page is malformed or empty")]
    MalformedPage,
}

/// Network-level failure for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// DNS, connect, TLS or mid-body transport failure.
    #[error("connection failed for {url}: {message}")]
    ConnectionFailed {
        /// The URL that failed.
        url: String,
        /// Rendered transport error.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },
}

impl NetworkError {
    /// Maps a transport error from `reqwest`.
    #[must_use]
    pub fn from_reqwest(url: impl Into<String>, error: &reqwest::Error) -> Self {
        let url = url.into();
        if error.is_timeout() {
            return Self::Timeout { url };
        }
        if let Some(status) = error.status() {
            return Self::HttpStatus {
                url,
                status: status.as_u16(),
                retry_after: None,
            };
        }
        Self::ConnectionFailed {
            url,
            message: error.to_string(),
        }
    }

    /// Creates an HTTP status error without a Retry-After value.
    #[must_use]
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// The URL involved in the failure.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url }
            | Self::ConnectionFailed { url, .. }
            | Self::HttpStatus { url, .. } => url,
        }
    }
}

/// Downloaded or existing content does not match the expected remote file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// SHA-256 digest differs from the one published by the remote.
    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        /// File that failed verification.
        path: PathBuf,
        /// Expected lowercase hex digest.
        expected: String,
        /// Actual lowercase hex digest.
        actual: String,
    },

    /// Byte count differs from the expected size (or nothing arrived).
    #[error("size mismatch for {path}: expected {}, got {actual} bytes", expected.map_or_else(|| "a non-empty body".to_string(), |b| format!("{b} bytes")))]
    SizeMismatch {
        /// File that failed verification.
        path: PathBuf,
        /// Expected size, when the remote published one.
        expected: Option<u64>,
        /// Bytes actually received.
        actual: u64,
    },
}

/// Local filesystem failure while placing a file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilesystemError {
    /// Missing write permission.
    #[error("permission denied writing {path}")]
    PermissionDenied {
        /// Path involved.
        path: PathBuf,
    },

    /// Path or name exceeds platform limits.
    #[error("path too long: {path}")]
    PathTooLong {
        /// Path involved.
        path: PathBuf,
    },

    /// No space left on the destination device.
    #[error("disk full writing {path}")]
    DiskFull {
        /// Path involved.
        path: PathBuf,
    },

    /// Any other IO failure.
    #[error("IO error at {path}: {message}")]
    Other {
        /// Path involved.
        path: PathBuf,
        /// Rendered IO error.
        message: String,
    },
}

#[cfg(unix)]
const ENAMETOOLONG: &[i32] = &[36, 63];
#[cfg(windows)]
const ENAMETOOLONG: &[i32] = &[206];
#[cfg(not(any(unix, windows)))]
const ENAMETOOLONG: &[i32] = &[];

#[cfg(unix)]
const ENOSPC: &[i32] = &[28];
#[cfg(windows)]
const ENOSPC: &[i32] = &[39, 112];
#[cfg(not(any(unix, windows)))]
const ENOSPC: &[i32] = &[];

impl FilesystemError {
    /// Classifies an IO error raised while touching `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: &io::Error) -> Self {
        let path = path.to_path_buf();
        let raw = error.raw_os_error();
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::StorageFull => Self::DiskFull { path },
            _ if raw.is_some_and(|code| ENOSPC.contains(&code)) => Self::DiskFull { path },
            _ if raw.is_some_and(|code| ENAMETOOLONG.contains(&code)) => Self::PathTooLong { path },
            _ => Self::Other {
                path,
                message: error.to_string(),
            },
        }
    }
}

/// Invalid run configuration. Always fatal for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The input is not a recognizable file or folder share link.
    #[error("invalid share link: {input}")]
    InvalidUrl {
        /// The rejected input.
        input: String,
    },

    /// The output path cannot be expanded or normalized.
    #[error("invalid output path {path:?}: {reason}")]
    InvalidOutputPath {
        /// The rejected path as supplied.
        path: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Failure talking to the hosting service's JSON API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request itself failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The API answered with `result == "Error"`.
    #[error("API error {code}: {message}")]
    Api {
        /// Service error code (0 when absent).
        code: u64,
        /// Service error message.
        message: String,
    },

    /// The body was not the JSON shape expected.
    #[error("undecodable API response from {url}: {message}")]
    Decode {
        /// Endpoint URL.
        url: String,
        /// Decoder message.
        message: String,
    },

    /// A required object was absent from an otherwise successful response.
    #[error("API response from {url} is missing `{field}`")]
    Missing {
        /// Endpoint URL.
        url: String,
        /// Name of the absent field.
        field: &'static str,
    },
}

/// Terminal or retryable failure of a single manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// Link extraction failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Request failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Verification failed.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Writing to disk failed.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

impl DownloadError {
    /// Short machine-friendly label used in logs and summaries.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Extract(ExtractError::LinkNotFound) => "link_not_found",
            Self::Extract(ExtractError::SourceRemoved) => "source_removed",
            Self::Extract(ExtractError::MalformedPage) => "malformed_page",
            Self::Network(NetworkError::Timeout { .. }) => "timeout",
            Self::Network(NetworkError::ConnectionFailed { .. }) => "connection_failed",
            Self::Network(NetworkError::HttpStatus { .. }) => "http_status",
            Self::Integrity(IntegrityError::HashMismatch { .. }) => "hash_mismatch",
            Self::Integrity(IntegrityError::SizeMismatch { .. }) => "size_mismatch",
            Self::Filesystem(FilesystemError::PermissionDenied { .. }) => "permission_denied",
            Self::Filesystem(FilesystemError::PathTooLong { .. }) => "path_too_long",
            Self::Filesystem(FilesystemError::DiskFull { .. }) => "disk_full",
            Self::Filesystem(FilesystemError::Other { .. }) => "io",
        }
    }
}
