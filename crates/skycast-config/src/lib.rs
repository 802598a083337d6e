use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use skycast_core::Location;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    OpenWeather,
    Simulator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub url: String,
    pub units: String,
    /// Samples requested per location and ingestion run
    pub forecast_horizon: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::OpenWeather,
            url: "https://api.openweathermap.org/data/2.5/forecast".to_string(),
            units: "metric".to_string(),
            forecast_horizon: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub processed_file: PathBuf,
    pub models_dir: PathBuf,
    pub predictions_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_file: PathBuf::from("data/processed/historical_weather.csv"),
            models_dir: PathBuf::from("models"),
            predictions_dir: PathBuf::from("data/predictions"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub ingest_every_minutes: u64,
    /// Daily prediction time, HH:MM UTC
    pub predict_at: String,
    pub train_weekday: String,
    /// Weekly training time, HH:MM UTC
    pub train_at: String,
    pub tick_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ingest_every_minutes: 60,
            predict_at: "06:00".to_string(),
            train_weekday: "Sunday".to_string(),
            train_at: "02:00".to_string(),
            tick_seconds: 60,
        }
    }
}

impl ScheduleConfig {
    pub fn predict_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_time("schedule.predict_at", &self.predict_at)
    }

    pub fn train_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_time("schedule.train_at", &self.train_at)
    }

    pub fn train_weekday(&self) -> Result<Weekday, ConfigError> {
        self.train_weekday.parse::<Weekday>().map_err(|_| {
            ConfigError::Invalid(format!(
                "schedule.train_weekday: unknown weekday {:?}",
                self.train_weekday
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Share of the newest rows held out for evaluation
    pub validation_fraction: f64,
    pub ridge_alpha: f64,
    /// Retrained models above this held-out MAE are not published
    pub max_holdout_mae: Option<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            ridge_alpha: 1.0,
            max_holdout_mae: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub bind: Option<String>,
    /// Selectable locations; must name exactly the ingestion locations
    pub locations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub locations: Vec<Location>,
    pub paths: PathsConfig,
    pub schedule: ScheduleConfig,
    pub model: ModelConfig,
    pub dashboard: DashboardConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            locations: vec![
                Location::new("New York", 40.7128, -74.0060),
                Location::new("London", 51.5074, -0.1278),
            ],
            paths: PathsConfig::default(),
            schedule: ScheduleConfig::default(),
            model: ModelConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Dashboard locations differ from ingestion locations (missing: {missing:?}, unknown: {unknown:?})")]
    LocationMismatch {
        missing: Vec<String>,
        unknown: Vec<String>,
    },
}

impl AppConfig {
    /// Load configuration from SKYCAST_CONFIG path (TOML) if present, with reasonable defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SKYCAST_CONFIG").unwrap_or_else(|_| "skycast.toml".to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load and validate `path`; a missing file means defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let cfg = if path.exists() {
            let s = fs::read_to_string(path)?;
            Self::from_toml_str(&s)?
        } else {
            AppConfig::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<AppConfig>(s)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.locations.is_empty() {
            return Err(ConfigError::Invalid("at least one location is required".into()));
        }
        let mut names = BTreeSet::new();
        for loc in &self.locations {
            if loc.name.trim().is_empty() {
                return Err(ConfigError::Invalid("location name must not be empty".into()));
            }
            if !names.insert(loc.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate location {:?}", loc.name)));
            }
            if !(-90.0..=90.0).contains(&loc.lat) || !(-180.0..=180.0).contains(&loc.lon) {
                return Err(ConfigError::Invalid(format!(
                    "location {:?} has out-of-range coordinates ({}, {})",
                    loc.name, loc.lat, loc.lon
                )));
            }
        }

        if self.source.forecast_horizon == 0 {
            return Err(ConfigError::Invalid("source.forecast_horizon must be positive".into()));
        }
        if self.schedule.ingest_every_minutes == 0 || self.schedule.tick_seconds == 0 {
            return Err(ConfigError::Invalid(
                "schedule intervals must be positive".into(),
            ));
        }
        self.schedule.predict_time()?;
        self.schedule.train_time()?;
        self.schedule.train_weekday()?;

        let fraction = self.model.validation_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "model.validation_fraction must be in (0, 1), got {}",
                fraction
            )));
        }
        if !(self.model.ridge_alpha >= 0.0) {
            return Err(ConfigError::Invalid("model.ridge_alpha must be non-negative".into()));
        }
        if let Some(max) = self.model.max_holdout_mae {
            if !(max > 0.0) {
                return Err(ConfigError::Invalid("model.max_holdout_mae must be positive".into()));
            }
        }

        if let Some(selectable) = &self.dashboard.locations {
            let selectable: BTreeSet<&str> = selectable.iter().map(String::as_str).collect();
            let missing: Vec<String> = names.difference(&selectable).map(|s| s.to_string()).collect();
            let unknown: Vec<String> = selectable.difference(&names).map(|s| s.to_string()).collect();
            if !missing.is_empty() || !unknown.is_empty() {
                return Err(ConfigError::LocationMismatch { missing, unknown });
            }
        }
        Ok(())
    }

    /// Names of the forecastable locations, in configuration order
    pub fn location_names(&self) -> Vec<String> {
        self.locations.iter().map(|l| l.name.clone()).collect()
    }

    /// Get HTTP bind address (default 0.0.0.0:8080)
    pub fn http_bind(&self) -> String {
        self.dashboard
            .bind
            .clone()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
    }
}

fn parse_time(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ConfigError::Invalid(format!("{}: expected HH:MM, got {:?}", field, value)))
}
