//! Content verification for files already on disk.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::FilesystemError;

/// Lowercase hex SHA-256 of a local file, computed on the blocking pool.
///
/// # Errors
///
/// Returns [`FilesystemError`] when the file cannot be read.
pub async fn sha256_file(path: &Path) -> Result<String, FilesystemError> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_blocking(&owned))
        .await
        .map_err(|e| FilesystemError::Other {
            path: path.to_path_buf(),
            message: format!("hashing task failed: {e}"),
        })?
}

fn hash_blocking(path: &Path) -> Result<String, FilesystemError> {
    let mut file = File::open(path).map_err(|e| FilesystemError::from_io(path, &e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| FilesystemError::from_io(path, &e))?;
    Ok(hex::encode(hasher.finalize()))
}
