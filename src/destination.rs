//! Output root selection.
//!
//! With an explicit path, `~`, `$VAR`, `${VAR}` and `%VAR%` are expanded, the
//! result is made absolute against the working directory and normalized
//! lexically. Without one, a file link downloads into the working directory
//! and a folder link into [`FOLDER_DEFAULT_DIR`] beneath it.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::share::ShareKind;

/// Subdirectory used for folder links when no output path is given.
pub const FOLDER_DEFAULT_DIR: &str = "TXAM-F";

/// Decides the output root for one run.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidOutputPath`] for an empty path, an unknown
/// environment variable, or a `~` when no home directory is known.
pub fn resolve_destination(
    kind: ShareKind,
    output: Option<&str>,
    cwd: &Path,
) -> Result<PathBuf, ConfigError> {
    resolve_with(kind, output, cwd, |name| std::env::var(name).ok(), dirs::home_dir)
}

fn resolve_with<L, H>(
    kind: ShareKind,
    output: Option<&str>,
    cwd: &Path,
    lookup: L,
    home: H,
) -> Result<PathBuf, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    H: FnOnce() -> Option<PathBuf>,
{
    let resolved = match output {
        None => match kind {
            ShareKind::File => normalize(cwd),
            ShareKind::Folder => normalize(&cwd.join(FOLDER_DEFAULT_DIR)),
        },
        Some(raw) => {
            let expanded = expand(raw, &lookup, home)?;
            let path = PathBuf::from(expanded);
            if path.is_absolute() {
                normalize(&path)
            } else {
                normalize(&cwd.join(path))
            }
        }
    };
    debug!(destination = %resolved.display(), %kind, "destination resolved");
    Ok(resolved)
}

fn invalid(raw: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidOutputPath {
        path: raw.to_string(),
        reason: reason.into(),
    }
}

fn expand<L, H>(raw: &str, lookup: &L, home: H) -> Result<String, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    H: FnOnce() -> Option<PathBuf>,
{
    if raw.trim().is_empty() {
        return Err(invalid(raw, "path is empty"));
    }

    let mut rest = raw;
    let mut out = String::with_capacity(raw.len());

    if let Some(after) = rest.strip_prefix('~')
        && (after.is_empty() || after.starts_with(['/', '\\']))
    {
        let home = home().ok_or_else(|| invalid(raw, "home directory is unknown"))?;
        out.push_str(&home.to_string_lossy());
        rest = after;
    }

    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '$' => {
                let tail = &rest[i + 1..];
                if let Some(braced) = tail.strip_prefix('{') {
                    let end = braced
                        .find('}')
                        .ok_or_else(|| invalid(raw, "unterminated ${...}"))?;
                    let name = &braced[..end];
                    out.push_str(&lookup_var(raw, name, lookup)?);
                    skip(&mut chars, name.chars().count() + 2);
                } else {
                    let len = identifier_len(tail);
                    if len == 0 {
                        out.push('$');
                    } else {
                        out.push_str(&lookup_var(raw, &tail[..len], lookup)?);
                        skip(&mut chars, len);
                    }
                }
            }
            '%' => {
                let tail = &rest[i + 1..];
                let len = identifier_len(tail);
                if len > 0 && tail[len..].starts_with('%') {
                    out.push_str(&lookup_var(raw, &tail[..len], lookup)?);
                    skip(&mut chars, len + 1);
                } else {
                    out.push('%');
                }
            }
            other => out.push(other),
        }
    }

    if out.trim().is_empty() {
        return Err(invalid(raw, "path expands to an empty string"));
    }
    Ok(out)
}

fn lookup_var<L>(raw: &str, name: &str, lookup: &L) -> Result<String, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    if name.is_empty() {
        return Err(invalid(raw, "empty variable name"));
    }
    lookup(name).ok_or_else(|| invalid(raw, format!("unknown variable {name}")))
}

/// Byte length of the leading `[A-Za-z_][A-Za-z0-9_]*` run.
fn identifier_len(s: &str) -> usize {
    let mut len = 0;
    for (i, c) in s.char_indices() {
        let ok = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };
        if !ok {
            break;
        }
        len = i + c.len_utf8();
    }
    len
}

/// Advances past `count` characters.
fn skip<I: Iterator>(chars: &mut I, count: usize) {
    for _ in 0..count {
        chars.next();
    }
}

/// Resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
