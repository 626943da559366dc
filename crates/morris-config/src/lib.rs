//! Server configuration.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line. Every section tolerates missing and unknown fields so config
//! files survive upgrades in either direction.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE, Config, DebugConfig, ServerConfig, default_config_dir};
pub use error::ConfigError;
