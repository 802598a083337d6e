//! Daemon settings from environment variables
//!
//! Secrets and deployment-specific locations come from the environment; the
//! pipeline itself is configured by the TOML file SKYCAST_CONFIG points at.

use anyhow::{Context, Result};
use skycast_config::AppConfig;
use std::env;
use std::path::PathBuf;

#[derive(Clone)]
pub struct DaemonConfig {
    /// Path of the TOML pipeline configuration
    pub config_path: PathBuf,

    /// OpenWeather API key (WEATHER_API_KEY)
    pub api_key: Option<String>,

    /// Postgres connection URL for the `postgres` store
    pub database_url: Option<String>,

    /// Database file for the `sqlite` store
    pub sqlite_path: Option<PathBuf>,
}

impl std::fmt::Debug for DaemonConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonConfig")
            .field("config_path", &self.config_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("sqlite_path", &self.sqlite_path)
            .finish()
    }
}

impl DaemonConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            config_path: non_empty("SKYCAST_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("skycast.toml")),
            api_key: non_empty("WEATHER_API_KEY"),
            database_url: non_empty("DATABASE_URL"),
            sqlite_path: non_empty("SKYCAST_SQLITE").map(PathBuf::from),
        }
    }

    /// Load and validate the pipeline configuration
    pub fn load_app_config(&self) -> Result<AppConfig> {
        AppConfig::load_from(&self.config_path)
            .with_context(|| format!("Invalid configuration in {}", self.config_path.display()))
    }
}
