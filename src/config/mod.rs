//! Reader configuration: defaults, TOML tables and file loading.

mod io;
mod models;
mod tables;

pub use io::{DEFAULT_CONFIG_PATH, load_config, parse_config, serialize_config};
pub use models::ReaderConfig;
