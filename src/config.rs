//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to deserialize environment variables into a type-safe struct.

use std::path::PathBuf;

use serde::Deserialize;

use crate::services::key_service::PrunePolicy;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `API_TOKEN` (required): bearer token for the admin and bot routes
/// - `KEYS_FILE` (optional): path of the key store, defaults to `keys.json`
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 5000
/// - `PRUNE_INTERVAL_SECS` (optional): seconds between prune passes, defaults to 3600
/// - `PRUNE_POLICY` (optional): `all` (default) or `keep_redeemed`
/// - `SCRIPT_PATH` (optional): file served to authorized keys
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_token: String,

    #[serde(default = "default_keys_file")]
    pub keys_file: PathBuf,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,

    #[serde(default)]
    pub prune_policy: PrunePolicy,

    pub script_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

fn default_keys_file() -> PathBuf {
    PathBuf::from("keys.json")
}

fn default_port() -> u16 {
    5000
}

fn default_prune_interval() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., API_TOKEN)
    /// - Environment variable values cannot be parsed into expected types
    /// - Values are out of range (empty token, zero prune interval)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        // Field names are converted automatically: keys_file -> KEYS_FILE
        let config = envy::from_iter::<_, Config>(vars)?;

        if config.api_token.trim().is_empty() {
            return Err(ConfigError::Invalid("API_TOKEN must not be empty"));
        }
        if config.prune_interval_secs == 0 {
            return Err(ConfigError::Invalid("PRUNE_INTERVAL_SECS must be positive"));
        }

        Ok(config)
    }
}
