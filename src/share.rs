//! Share link classification.
//!
//! A [`ShareLink`] is derived once from the URL shape, before any network call.
//! Only `mediafire.com/file/<key>`, `mediafire.com/file_premium/<key>` and
//! `mediafire.com/folder/<key>` are accepted.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::ConfigError;

static SHARE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)mediafire\.com/(folder|file_premium|file)/([a-zA-Z0-9]+)")
});

#[allow(clippy::expect_used)]
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static share link regex must compile")
}

/// Whether a share link points at a single file or a folder tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareKind {
    /// A single file (`/file/` or `/file_premium/`).
    File,
    /// A folder, walked recursively.
    Folder,
}

impl fmt::Display for ShareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Folder => f.write_str("folder"),
        }
    }
}

/// A classified share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    /// File or folder.
    pub kind: ShareKind,
    /// Remote key (quick key for files, folder key for folders).
    pub key: String,
    /// The input exactly as supplied.
    pub raw: String,
}

impl ShareLink {
    /// Classifies a share URL.
    ///
    /// The scheme is optional (`mediafire.com/file/abc` is accepted) but the host
    /// and path shape are not.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] when the input does not look like a
    /// file or folder share link.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        let captures = SHARE_LINK_RE
            .captures(trimmed)
            .ok_or_else(|| ConfigError::InvalidUrl {
                input: trimmed.to_string(),
            })?;

        let kind = match captures[1].to_ascii_lowercase().as_str() {
            "folder" => ShareKind::Folder,
            _ => ShareKind::File,
        };
        let key = captures[2].to_string();
        debug!(%kind, key = %key, "classified share link");

        Ok(Self {
            kind,
            key,
            raw: trimmed.to_string(),
        })
    }

    /// True for folder links.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == ShareKind::Folder
    }
}
