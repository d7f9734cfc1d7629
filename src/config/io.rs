use super::models::ReaderConfig;
use super::tables::ConfigTables;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "conf/config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ConfigInput {
    Tables(ConfigTables),
    Flat(ReaderConfig),
}

/// Read the config at `path`. A missing or malformed file is logged and the
/// built-in defaults are returned.
pub fn load_config(path: &Path) -> ReaderConfig {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path = %path.display(), "Config unreadable, using defaults: {err}");
            return ReaderConfig::default();
        }
    };

    parse_config(&contents)
        .inspect(|cfg| {
            info!(
                path = %path.display(),
                root = %cfg.root_dir.display(),
                "Loaded reader config"
            );
        })
        .unwrap_or_else(|err| {
            warn!(path = %path.display(), "Invalid config TOML, using defaults: {err}");
            ReaderConfig::default()
        })
}

/// Accepts either the sectioned layout or flat top-level keys.
pub fn parse_config(contents: &str) -> Result<ReaderConfig, toml::de::Error> {
    match toml::from_str::<ConfigInput>(contents)? {
        ConfigInput::Tables(tables) => {
            debug!("Config uses the sectioned layout");
            Ok(tables.into())
        }
        ConfigInput::Flat(flat) => {
            debug!("Config uses flat keys");
            Ok(flat)
        }
    }
}

/// Render `config` in the sectioned layout.
pub fn serialize_config(config: &ReaderConfig) -> Result<String, toml::ser::Error> {
    toml::to_string(&ConfigTables::from(config))
}
