//! Configuration loading
//!
//! Settings come from three layers, later ones winning:
//! - built-in defaults
//! - `vaultsync.toml` in the working directory (or an explicit `--config` file)
//! - command line flags, applied by the CLI

pub mod parser;
pub mod schema;

pub use parser::{CONFIG_FILE_NAME, load_config, parse_config, parse_config_str};
pub use schema::{
    DEFAULT_ARCHIVE_NAME, DEFAULT_DELAY_MS, DEFAULT_PACKMGR_PATH, DEFAULT_TARGET, RetryConfig,
    SyncConfig, default_excludes,
};
