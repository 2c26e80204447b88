//! Path component normalization and collision handling for manifests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Normalizes a remote file or folder name into one safe path component.
///
/// Characters other than alphanumerics and `-`, `_`, `.`, space become `-`.
/// Empty results and the `.`/`..` segments are rewritten so the component can
/// never escape its parent.
#[must_use]
pub fn sanitize_component(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim();

    if trimmed.is_empty() {
        return "_".to_string();
    }
    if trimmed.chars().all(|c| c == '.') {
        return trimmed.replace('.', "_");
    }
    trimmed.to_string()
}

/// Tracks claimed relative paths and hands out unique ones.
///
/// Comparison ignores case, Unicode included, so `Ärger.txt` and `ärger.txt`
/// do not land on the same file on case-insensitive filesystems.
#[derive(Debug, Default)]
pub struct PathRegistry {
    claimed: HashSet<String>,
}

impl PathRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `parent/name`, appending `_2`, `_3`, ... before the extension on
    /// collision.
    ///
    /// Example: `file.pdf`, then `file_2.pdf`, `file_3.pdf`, ...
    pub fn claim(&mut self, parent: &Path, name: &str) -> PathBuf {
        let candidate = parent.join(name);
        if self.claimed.insert(registry_key(&candidate)) {
            return candidate;
        }

        let (stem, ext) = split_extension(name);
        let mut suffix = 2usize;
        loop {
            let candidate = parent.join(format!("{stem}_{suffix}{ext}"));
            if self.claimed.insert(registry_key(&candidate)) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Number of claimed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    /// True when nothing has been claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

fn registry_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Splits `name` into stem and extension (with the dot). Leading-dot names
/// such as `.env` have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}
