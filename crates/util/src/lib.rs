//! Process-level configuration for the HRIS service.

pub mod config;

use std::path::PathBuf;

pub use config::{AppConfig, ConfigError, Environment, DEFAULT_BIND_ADDR};

/// Loads variables from a `.env` file, returning its path when one was found.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}
