//! OpenWeather 5-day/3-hour forecast source

use crate::{IngestError, IngestResult, WeatherSource};
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use skycast_core::{Location, Observation};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// Forecast endpoint response (only the fields we use)
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    pub list: Vec<ForecastEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastEntry {
    /// Unix timestamp of the time bucket
    pub dt: i64,
    pub main: Option<MainBlock>,
    pub wind: Option<WindBlock>,
    pub rain: Option<RainBlock>,
    pub clouds: Option<CloudsBlock>,
    #[serde(default)]
    pub weather: Vec<ConditionBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainBlock {
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindBlock {
    pub speed: Option<f64>,
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RainBlock {
    #[serde(rename = "3h")]
    pub three_hours: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudsBlock {
    pub all: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionBlock {
    pub main: String,
}

/// Flatten a forecast response into one observation per time bucket.
///
/// Absent rain means no rain. Any other absent reading stays missing.
pub fn flatten_forecast(location: &str, response: ForecastResponse) -> Vec<Observation> {
    response
        .list
        .into_iter()
        .filter_map(|entry| {
            let timestamp = DateTime::from_timestamp(entry.dt, 0)?;
            let main = entry.main.as_ref();
            let wind = entry.wind.as_ref();
            Some(Observation {
                location: location.to_string(),
                timestamp,
                temperature: main.and_then(|m| m.temp),
                humidity: main.and_then(|m| m.humidity),
                wind_speed: wind.and_then(|w| w.speed),
                wind_direction: wind.and_then(|w| w.deg),
                pressure: main.and_then(|m| m.pressure),
                precipitation: Some(entry.rain.and_then(|r| r.three_hours).unwrap_or(0.0)),
                cloud_coverage: entry.clouds.and_then(|c| c.all),
                weather_condition: entry.weather.into_iter().next().map(|c| c.main),
            })
        })
        .collect()
}

pub struct OpenWeatherSource {
    client: Client,
    url: String,
    api_key: String,
    units: String,
    count: usize,
}

impl OpenWeatherSource {
    /// `count` is the number of time buckets requested per location
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, count: usize) -> IngestResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(IngestError::SourceError("missing API key".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IngestError::SourceError(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
            units: "metric".to_string(),
            count,
        })
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }
}

#[async_trait::async_trait]
impl WeatherSource for OpenWeatherSource {
    fn name(&self) -> &str {
        "openweather"
    }

    async fn fetch_location(&self, location: &Location) -> IngestResult<Vec<Observation>> {
        let count = self.count.to_string();
        let lat = location.lat.to_string();
        let lon = location.lon.to_string();
        let resp = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
                ("cnt", count.as_str()),
            ])
            .send()
            .await
            .map_err(|source| IngestError::Http {
                location: location.name.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(IngestError::HttpStatus {
                location: location.name.clone(),
                status: resp.status(),
            });
        }

        let body: ForecastResponse = resp.json().await.map_err(|e| IngestError::Decode {
            location: location.name.clone(),
            message: e.to_string(),
        })?;
        debug!("{} forecast buckets for {}", body.list.len(), location.name);

        Ok(flatten_forecast(&location.name, body))
    }
}
