//! Sectioned TOML layout, the form written back to disk.

use super::models::{
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_ROOT_DIR, DEFAULT_TEMP_DIR,
    DEFAULT_TEMP_MAX_AGE_HOURS, ReaderConfig,
};
use crate::cache::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigTables {
    #[serde(default)]
    library: LibraryTable,
    #[serde(default)]
    cache: CacheTable,
    #[serde(default)]
    uploads: UploadsTable,
    #[serde(default)]
    text: TextTable,
    #[serde(default)]
    logging: LoggingTable,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
struct LibraryTable {
    root_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
struct CacheTable {
    file_info_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
struct UploadsTable {
    temp_dir: PathBuf,
    max_bytes: u64,
    max_age_hours: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
struct TextTable {
    cjk_indent: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
struct LoggingTable {
    level: String,
}

impl Default for LibraryTable {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
        }
    }
}

impl Default for CacheTable {
    fn default() -> Self {
        Self {
            file_info_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Default for UploadsTable {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_age_hours: DEFAULT_TEMP_MAX_AGE_HOURS,
        }
    }
}

impl Default for TextTable {
    fn default() -> Self {
        Self { cjk_indent: true }
    }
}

impl Default for LoggingTable {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl From<ConfigTables> for ReaderConfig {
    fn from(tables: ConfigTables) -> Self {
        Self {
            root_dir: tables.library.root_dir,
            temp_dir: tables.uploads.temp_dir,
            file_info_cache_capacity: tables.cache.file_info_capacity,
            max_upload_bytes: tables.uploads.max_bytes,
            temp_max_age_hours: tables.uploads.max_age_hours,
            cjk_indent: tables.text.cjk_indent,
            log_level: tables.logging.level,
        }
    }
}

impl From<&ReaderConfig> for ConfigTables {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            library: LibraryTable {
                root_dir: config.root_dir.clone(),
            },
            cache: CacheTable {
                file_info_capacity: config.file_info_cache_capacity,
            },
            uploads: UploadsTable {
                temp_dir: config.temp_dir.clone(),
                max_bytes: config.max_upload_bytes,
                max_age_hours: config.temp_max_age_hours,
            },
            text: TextTable {
                cjk_indent: config.cjk_indent,
            },
            logging: LoggingTable {
                level: config.log_level.clone(),
            },
        }
    }
}
