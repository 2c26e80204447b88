//! Extension and filename denylists applied before scheduling.
//!
//! Extensions match as a case-insensitive suffix of the display name, so
//! `mp4`, `.MP4` and multi-part entries such as `Thumbs.db` all work. Names
//! match exactly, or as a glob when the pattern contains `*`, `?` or `[`.

use glob::Pattern;
use tracing::warn;

use crate::manifest::ManifestEntry;

/// Junk extensions skipped unless the user supplies their own list.
pub const DEFAULT_IGNORE_EXTENSIONS: &[&str] = &[".pyc", ".pyo", ".pyd", ".DS_Store", "Thumbs.db"];

/// Junk names skipped unless the user supplies their own list.
pub const DEFAULT_IGNORE_NAMES: &[&str] = &["__pycache__", "desktop.ini"];

#[derive(Debug, Clone)]
enum NameRule {
    Exact(String),
    Glob(Pattern),
}

impl NameRule {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.contains(['*', '?', '[']) {
            match Pattern::new(trimmed) {
                Ok(pattern) => return Some(Self::Glob(pattern)),
                Err(e) => warn!(pattern = trimmed, error = %e, "invalid glob, matching literally"),
            }
        }
        Some(Self::Exact(trimmed.to_string()))
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == name,
            Self::Glob(pattern) => pattern.matches(name),
        }
    }
}

/// Denylists deciding which manifest entries are scheduled.
#[derive(Debug, Clone)]
pub struct FilterRules {
    extensions: Vec<String>,
    names: Vec<NameRule>,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self::new(
            DEFAULT_IGNORE_EXTENSIONS.iter().copied(),
            DEFAULT_IGNORE_NAMES.iter().copied(),
        )
    }
}

impl FilterRules {
    /// Builds rules from raw user lists. Blank items are ignored.
    pub fn new<E, N>(extensions: E, names: N) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .filter_map(|e| normalize_extension(e.as_ref()))
            .collect();
        let names = names
            .into_iter()
            .filter_map(|n| NameRule::parse(n.as_ref()))
            .collect();
        Self { extensions, names }
    }

    /// Rules that let everything through.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            extensions: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Replaces the default extensions with a user list, keeping name rules.
    #[must_use]
    pub fn with_extensions<E>(mut self, extensions: E) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .filter_map(|e| normalize_extension(e.as_ref()))
            .collect();
        self
    }

    /// Replaces the default names with a user list, keeping extension rules.
    #[must_use]
    pub fn with_names<N>(mut self, names: N) -> Self
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        self.names = names
            .into_iter()
            .filter_map(|n| NameRule::parse(n.as_ref()))
            .collect();
        self
    }

    /// True when the entry should be downloaded.
    #[must_use]
    pub fn should_include(&self, entry: &ManifestEntry) -> bool {
        self.should_include_name(&entry.display_name)
    }

    /// Name-only form of [`should_include`](Self::should_include).
    #[must_use]
    pub fn should_include_name(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        if self.extensions.iter().any(|ext| lowered.ends_with(ext.as_str())) {
            return false;
        }
        !self.names.iter().any(|rule| rule.matches(name))
    }
}

/// Lowercases and adds the leading dot; `Thumbs.db`-style entries that
/// already contain a dot keep their text.
fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered.contains('.') {
        Some(lowered)
    } else {
        Some(format!(".{lowered}"))
    }
}
