use crate::cache::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) const DEFAULT_ROOT_DIR: &str = "filesystem";
pub(crate) const DEFAULT_TEMP_DIR: &str = "temp_uploads";
pub(crate) const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub(crate) const DEFAULT_TEMP_MAX_AGE_HOURS: u64 = 24;
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";

/// Flat runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    /// Library root; every user path resolves beneath it.
    pub root_dir: PathBuf,
    /// Where uploaded files are staged.
    pub temp_dir: PathBuf,
    pub file_info_cache_capacity: usize,
    pub max_upload_bytes: u64,
    pub temp_max_age_hours: u64,
    /// Indent prose paragraphs in `.md` and `.txt` files.
    pub cjk_indent: bool,
    pub log_level: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            file_info_cache_capacity: DEFAULT_CAPACITY,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            temp_max_age_hours: DEFAULT_TEMP_MAX_AGE_HOURS,
            cjk_indent: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ReaderConfig {
    /// Age after which staged uploads are removed. Saturates instead of
    /// overflowing on absurd hour counts.
    pub fn temp_max_age(&self) -> Duration {
        Duration::from_secs(self.temp_max_age_hours.saturating_mul(3600))
    }
}
