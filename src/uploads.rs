//! Staging area for uploaded files.
//!
//! Uploads land in their own root, outside the library, under a sanitized
//! and timestamped name. They are read back through the `__temp__/` prefix.

use crate::error::{ReaderError, Result};
use crate::sandbox::{PathSandbox, validate_filename};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Read-path prefix that routes to the upload root.
pub const TEMP_PREFIX: &str = "__temp__/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedUpload {
    /// Name on disk inside the upload root.
    pub filename: String,
    /// Path to hand back to `Library::read`.
    pub read_path: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct TempUploads {
    sandbox: PathSandbox,
    max_bytes: u64,
}

impl TempUploads {
    /// Open (creating if needed) the upload directory.
    pub fn open(dir: &Path, max_bytes: u64) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|err| ReaderError::io(dir, err))?;
        Ok(Self::new(PathSandbox::new(dir)?, max_bytes))
    }

    pub fn new(sandbox: PathSandbox, max_bytes: u64) -> Self {
        Self { sandbox, max_bytes }
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Write `bytes` under a unique safe name derived from `original_name`.
    pub fn stage(&self, original_name: &str, bytes: &[u8]) -> Result<StagedUpload> {
        if !validate_filename(original_name) {
            warn!(name = original_name, "Rejected upload with invalid filename");
            return Err(ReaderError::UploadRejected(format!(
                "invalid filename: {original_name}"
            )));
        }
        let safe = sanitize_filename(original_name);
        if safe.is_empty() {
            warn!(name = original_name, "Upload name has no usable characters");
            return Err(ReaderError::UploadRejected(format!(
                "filename has no usable characters: {original_name}"
            )));
        }
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            warn!(name = original_name, size, limit = self.max_bytes, "Upload too large");
            return Err(ReaderError::UploadRejected(format!(
                "{size} bytes exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let (stem, ext) = split_extension(&safe);
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut filename = format!("{stem}_{stamp}{ext}");
        let mut attempt = 1;
        let mut file = loop {
            let target = self.sandbox.root().join(&filename);
            match OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(file) => break file,
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    filename = format!("{stem}_{stamp}_{attempt}{ext}");
                    attempt += 1;
                }
                Err(err) => return Err(ReaderError::io(&target, err)),
            }
        };
        let target = self.sandbox.root().join(&filename);
        file.write_all(bytes)
            .map_err(|err| ReaderError::io(&target, err))?;
        info!(file = %filename, size, "Staged upload");
        Ok(StagedUpload {
            read_path: format!("{TEMP_PREFIX}{filename}"),
            filename,
            size_bytes: size,
        })
    }

    /// Delete regular files older than `max_age`. Returns how many went.
    pub fn cleanup(&self, max_age: Duration) -> Result<usize> {
        let root = self.sandbox.root();
        let entries = fs::read_dir(root).map_err(|err| ReaderError::io(root, err))?;
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %root.display(), "Skipping unreadable upload entry: {err}");
                    continue;
                }
            };
            let path = entry.path();
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let expired = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age);
            if !expired {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed expired upload");
                    removed += 1;
                }
                Err(err) => warn!(path = %path.display(), "Could not remove upload: {err}"),
            }
        }
        info!(removed, "Upload cleanup finished");
        Ok(removed)
    }
}

/// Reduce a name to ASCII alphanumerics, `-`, `_` and `.`. Spaces become
/// underscores, anything else is dropped, and leading dots are stripped.
pub fn sanitize_filename(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
            _ => None,
        })
        .collect();
    kept.trim_start_matches('.').to_string()
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
