//! Configuration file parsing for Portage Demon
//!
//! Supports:
//! - `/etc/pdemon/config.toml` - Daemon settings

pub mod settings;
pub mod types;

pub use settings::{init_config, load_settings, save_settings, DEFAULT_CONFIG_PATH};
pub use types::*;
