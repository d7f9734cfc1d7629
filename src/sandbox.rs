//! Sandboxed path resolution.
//!
//! Every user-supplied path goes through [`PathSandbox`] before touching the
//! filesystem. The user string is cleaned lexically first (no `..`, no
//! backslashes, no leading or trailing separators), joined onto the root and
//! then canonicalized, so symlinks that point outside the root are caught as
//! well as plain traversal.
//!
//! Two policies are offered. [`PathSandbox::resolve`] hard-fails and is what
//! reads, downloads and comic page fetches use. [`PathSandbox::resolve_or_root`]
//! falls back to the root and is only meant for directory listings.

use crate::error::{ReaderError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Characters and sequences never allowed in a listed or uploaded filename.
const FORBIDDEN_FILENAME_PARTS: [&str; 9] = ["..", "\\", ":", "*", "?", "\"", "<", ">", "|"];
const MAX_FILENAME_CHARS: usize = 255;

#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// Create a sandbox over an existing directory. The root is stored in its
    /// canonical form so later prefix checks compare like with like.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root).map_err(|err| ReaderError::io(root, err))?;
        if !canonical.is_dir() {
            return Err(ReaderError::NotADirectory(canonical));
        }
        debug!(root = %canonical.display(), "Sandbox root ready");
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `user_path` inside the root or fail.
    ///
    /// An empty (or fully stripped) path resolves to the root itself.
    pub fn resolve(&self, user_path: &str) -> Result<PathBuf> {
        let components = clean_components(user_path);
        if components.is_empty() {
            return Ok(self.root.clone());
        }

        let joined = components
            .iter()
            .fold(self.root.clone(), |acc, part| acc.join(part));
        let canonical = fs::canonicalize(&joined).map_err(|err| ReaderError::io(&joined, err))?;

        if !canonical.starts_with(&self.root) {
            warn!(
                requested = user_path,
                resolved = %canonical.display(),
                "Path traversal attempt detected"
            );
            return Err(ReaderError::PathEscape(user_path.to_string()));
        }
        Ok(canonical)
    }

    /// Resolve `user_path`, answering the root on any failure.
    pub fn resolve_or_root(&self, user_path: &str) -> PathBuf {
        match self.resolve(user_path) {
            Ok(path) => path,
            Err(err) => {
                debug!(requested = user_path, "Falling back to sandbox root: {err}");
                self.root.clone()
            }
        }
    }

    /// Path of `absolute` relative to the root, with `/` separators.
    pub fn relative(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

fn clean_components(user_path: &str) -> Vec<String> {
    user_path
        .replace("..", "")
        .replace('\\', "/")
        .trim_matches('/')
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .map(str::to_string)
        .collect()
}

/// Reject names that could smuggle separators, traversal or shell/OS
/// reserved characters, and names longer than 255 characters.
pub fn validate_filename(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if FORBIDDEN_FILENAME_PARTS
        .iter()
        .any(|forbidden| name.contains(forbidden))
    {
        return false;
    }
    name.chars().count() <= MAX_FILENAME_CHARS
}
