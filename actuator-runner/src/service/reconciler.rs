//! Content-addressed file replacement
//!
//! A rendered document replaces the installed one only when their content
//! hashes differ. The comparison happens before anything is written, so a
//! run with nothing to change leaves the directory untouched. A change is
//! written to a sibling temporary file and renamed over the target, so the
//! final path never shows a partial write.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::JobError;

/// SHA-256 of `bytes`, hex encoded
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Replaces files whose rendered content changed
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigReconciler;

impl ConfigReconciler {
    /// Makes `path` hold exactly `rendered`
    ///
    /// Returns `true` if the file was created or replaced, `false` if it
    /// already carried the same content.
    pub fn reconcile(&self, path: &Path, rendered: &[u8]) -> Result<bool, JobError> {
        let target_hash = content_hash(rendered);

        match fs::read(path) {
            Ok(current) if content_hash(&current) == target_hash => {
                info!("{} unchanged ({})", path.display(), &target_hash[..12]);
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(JobError::fs("read", path, e)),
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| JobError::fs("create", parent, e))?;
        }

        let tmp = temp_path(path);
        if let Err(e) = fs::write(&tmp, rendered) {
            let _ = fs::remove_file(&tmp);
            return Err(JobError::fs("write", &tmp, e));
        }

        fs::rename(&tmp, path).map_err(|e| JobError::fs("rename", path, e))?;

        info!("Replaced {} ({})", path.display(), &target_hash[..12]);
        Ok(true)
    }
}

/// `<file>.tmp` next to the target
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
