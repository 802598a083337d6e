//! Simulated weather source for development and testing

use crate::{IngestError, IngestResult, WeatherSource};
use chrono::{DateTime, Duration, DurationRound, Utc};
use skycast_core::{Location, Observation};
use std::collections::HashSet;
use std::f64::consts::PI;

/// Source that generates a deterministic diurnal cycle per location
pub struct SimulatorSource {
    count: usize,
    step: Duration,
    anchor: Option<DateTime<Utc>>,
    failing: HashSet<String>,
}

impl SimulatorSource {
    /// Create a simulator emitting `count` hourly samples per fetch
    pub fn new(count: usize) -> Self {
        Self {
            count,
            step: Duration::hours(1),
            anchor: None,
            failing: HashSet::new(),
        }
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Pin the newest generated sample instead of using the current hour
    pub fn with_anchor(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Make fetches for `location` fail
    pub fn failing_for(mut self, location: impl Into<String>) -> Self {
        self.failing.insert(location.into());
        self
    }

    fn latest(&self) -> DateTime<Utc> {
        let now = Utc::now();
        self.anchor
            .unwrap_or_else(|| now.duration_trunc(self.step).unwrap_or(now))
    }

    /// Sample for `location` at `timestamp`; identical inputs give identical output
    pub fn generate_observation(location: &Location, timestamp: DateTime<Utc>) -> Observation {
        let hours = timestamp.timestamp() as f64 / 3600.0;
        let phase = 2.0 * PI * (hours - 9.0) / 24.0;
        let base_temp = 25.0 - 0.3 * location.lat.abs();
        let wobble = (hours / 7.0 + location.lon).sin();

        Observation {
            location: location.name.clone(),
            timestamp,
            temperature: Some(base_temp + 5.0 * phase.sin() + wobble),
            humidity: Some(65.0 - 10.0 * phase.sin()),
            wind_speed: Some(4.0 + 2.0 * wobble.abs()),
            wind_direction: Some((hours * 3.0).rem_euclid(360.0)),
            pressure: Some(1013.25 + 4.0 * wobble),
            precipitation: Some(if wobble > 0.8 { 0.5 } else { 0.0 }),
            cloud_coverage: Some(50.0 + 40.0 * wobble),
            weather_condition: Some(if wobble > 0.8 { "Rain" } else { "Clouds" }.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl WeatherSource for SimulatorSource {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn fetch_location(&self, location: &Location) -> IngestResult<Vec<Observation>> {
        if self.failing.contains(&location.name) {
            return Err(IngestError::SourceError(format!(
                "simulated outage for {}",
                location.name
            )));
        }

        let latest = self.latest();
        let steps = self.count as i32;
        Ok((0..steps)
            .rev()
            .map(|i| Self::generate_observation(location, latest - self.step * i))
            .collect())
    }
}
