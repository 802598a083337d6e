//! Core data types for weather observations, historical records and forecasts

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A configured collection point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }
}

/// Identity of a record: at most one record may exist per key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// Base features carried by every record, in column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Temperature,
    Humidity,
    WindSpeed,
    WindDirection,
    Pressure,
    Precipitation,
    CloudCoverage,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::Temperature,
        Feature::Humidity,
        Feature::WindSpeed,
        Feature::WindDirection,
        Feature::Pressure,
        Feature::Precipitation,
        Feature::CloudCoverage,
    ];

    /// The forecast target
    pub const TARGET: Feature = Feature::Temperature;

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Temperature => "temperature",
            Feature::Humidity => "humidity",
            Feature::WindSpeed => "wind_speed",
            Feature::WindDirection => "wind_direction",
            Feature::Pressure => "pressure",
            Feature::Precipitation => "precipitation",
            Feature::CloudCoverage => "cloud_coverage",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw observation as flattened from the upstream source.
///
/// Numeric readings are optional because the upstream may omit any of them;
/// the cleaner decides what to do with incomplete records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub pressure: Option<f64>,
    pub precipitation: Option<f64>,
    pub cloud_coverage: Option<f64>,
    pub weather_condition: Option<String>,
}

impl Observation {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            location: self.location.clone(),
            timestamp: self.timestamp,
        }
    }

    pub fn value(&self, feature: Feature) -> Option<f64> {
        let value = match feature {
            Feature::Temperature => self.temperature,
            Feature::Humidity => self.humidity,
            Feature::WindSpeed => self.wind_speed,
            Feature::WindDirection => self.wind_direction,
            Feature::Pressure => self.pressure,
            Feature::Precipitation => self.precipitation,
            Feature::CloudCoverage => self.cloud_coverage,
        };
        // NaN and infinities are as unusable as a missing reading
        value.filter(|v| v.is_finite())
    }
}

/// A validated observation with derived calendar fields.
///
/// This is the row type of the cumulative historical dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalRecord {
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub pressure: f64,
    pub precipitation: f64,
    pub cloud_coverage: f64,
    pub weather_condition: Option<String>,
    pub hour_of_day: u32,
    pub day_of_year: u32,
}

impl HistoricalRecord {
    /// Build a record from an observation, or `None` if any base feature is missing
    pub fn from_observation(obs: &Observation) -> Option<Self> {
        let (hour_of_day, day_of_year) = calendar_fields(obs.timestamp);
        Some(Self {
            location: obs.location.clone(),
            timestamp: obs.timestamp,
            temperature: obs.value(Feature::Temperature)?,
            humidity: obs.value(Feature::Humidity)?,
            wind_speed: obs.value(Feature::WindSpeed)?,
            wind_direction: obs.value(Feature::WindDirection)?,
            pressure: obs.value(Feature::Pressure)?,
            precipitation: obs.value(Feature::Precipitation)?,
            cloud_coverage: obs.value(Feature::CloudCoverage)?,
            weather_condition: obs.weather_condition.clone(),
            hour_of_day,
            day_of_year,
        })
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            location: self.location.clone(),
            timestamp: self.timestamp,
        }
    }

    pub fn value(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Temperature => self.temperature,
            Feature::Humidity => self.humidity,
            Feature::WindSpeed => self.wind_speed,
            Feature::WindDirection => self.wind_direction,
            Feature::Pressure => self.pressure,
            Feature::Precipitation => self.precipitation,
            Feature::CloudCoverage => self.cloud_coverage,
        }
    }
}

/// Hour of day (0-23) and day of year (1-366) for a timestamp
pub fn calendar_fields(timestamp: DateTime<Utc>) -> (u32, u32) {
    (timestamp.hour(), timestamp.ordinal())
}

/// One forecast emitted by a prediction run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub location: String,
    /// The time the forecast value refers to
    pub prediction_timestamp: DateTime<Utc>,
    pub forecast_value: f64,
    pub forecast_metric_name: String,
    /// Wall-clock time of the prediction run
    pub generated_at: DateTime<Utc>,
    pub model_version: u64,
}
