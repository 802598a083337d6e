use crate::{SinkError, SinkResult};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use skycast_core::{HistoricalRecord, Prediction, Sink};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS weather_data (
    location TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    temperature REAL NOT NULL,
    humidity REAL NOT NULL,
    wind_speed REAL NOT NULL,
    wind_direction REAL NOT NULL,
    pressure REAL NOT NULL,
    precipitation REAL NOT NULL,
    cloud_coverage REAL NOT NULL,
    weather_condition TEXT,
    hour_of_day INTEGER NOT NULL,
    day_of_year INTEGER NOT NULL,
    PRIMARY KEY (location, timestamp)
);
CREATE TABLE IF NOT EXISTS weather_predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    location TEXT NOT NULL,
    prediction_timestamp TEXT NOT NULL,
    forecast_value REAL NOT NULL,
    forecast_metric_name TEXT NOT NULL,
    generated_at TEXT NOT NULL,
    model_version INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS weather_predictions_location
    ON weather_predictions (location, prediction_timestamp);
";

/// SQLite-backed `weather_data` / `weather_predictions` tables.
///
/// Timestamps are stored as fixed-width RFC 3339 UTC text, so text order is
/// time order.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> SinkResult<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> SinkResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SinkResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> SinkResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SinkError::Poisoned)
    }

    /// Insert or replace records by (location, timestamp)
    pub fn upsert_records(&self, records: &[HistoricalRecord]) -> SinkResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO weather_data (location, timestamp, temperature, humidity, wind_speed,
                    wind_direction, pressure, precipitation, cloud_coverage, weather_condition,
                    hour_of_day, day_of_year)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT (location, timestamp) DO UPDATE SET
                    temperature = excluded.temperature,
                    humidity = excluded.humidity,
                    wind_speed = excluded.wind_speed,
                    wind_direction = excluded.wind_direction,
                    pressure = excluded.pressure,
                    precipitation = excluded.precipitation,
                    cloud_coverage = excluded.cloud_coverage,
                    weather_condition = excluded.weather_condition,
                    hour_of_day = excluded.hour_of_day,
                    day_of_year = excluded.day_of_year",
            )?;
            for r in records {
                stmt.execute(params![
                    r.location,
                    ts(r.timestamp),
                    r.temperature,
                    r.humidity,
                    r.wind_speed,
                    r.wind_direction,
                    r.pressure,
                    r.precipitation,
                    r.cloud_coverage,
                    r.weather_condition,
                    r.hour_of_day,
                    r.day_of_year,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    pub fn insert_predictions(&self, predictions: &[Prediction]) -> SinkResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO weather_predictions (location, prediction_timestamp, forecast_value,
                    forecast_metric_name, generated_at, model_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for p in predictions {
                stmt.execute(params![
                    p.location,
                    ts(p.prediction_timestamp),
                    p.forecast_value,
                    p.forecast_metric_name,
                    ts(p.generated_at),
                    p.model_version as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(predictions.len())
    }

    /// Records of `location` with `start <= timestamp <= end`, oldest first
    pub fn weather_between(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SinkResult<Vec<HistoricalRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT location, timestamp, temperature, humidity, wind_speed, wind_direction,
                    pressure, precipitation, cloud_coverage, weather_condition,
                    hour_of_day, day_of_year
             FROM weather_data
             WHERE location = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![location, ts(start), ts(end)], |row| {
            Ok(HistoricalRecord {
                location: row.get(0)?,
                timestamp: parse_ts(row, 1)?,
                temperature: row.get(2)?,
                humidity: row.get(3)?,
                wind_speed: row.get(4)?,
                wind_direction: row.get(5)?,
                pressure: row.get(6)?,
                precipitation: row.get(7)?,
                cloud_coverage: row.get(8)?,
                weather_condition: row.get(9)?,
                hour_of_day: row.get(10)?,
                day_of_year: row.get(11)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Newest predictions of `location` by prediction time, at most `limit`
    pub fn latest_predictions(&self, location: &str, limit: usize) -> SinkResult<Vec<Prediction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT location, prediction_timestamp, forecast_value, forecast_metric_name,
                    generated_at, model_version
             FROM weather_predictions
             WHERE location = ?1
             ORDER BY prediction_timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![location, limit as i64], |row| {
            Ok(Prediction {
                location: row.get(0)?,
                prediction_timestamp: parse_ts(row, 1)?,
                forecast_value: row.get(2)?,
                forecast_metric_name: row.get(3)?,
                generated_at: parse_ts(row, 4)?,
                model_version: row.get::<_, i64>(5)? as u64,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

/// Fixed-width text so keys round-trip exactly and sort chronologically
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[async_trait::async_trait]
impl Sink for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn emit_records(&mut self, records: &[HistoricalRecord]) -> Result<()> {
        self.upsert_records(records)?;
        Ok(())
    }

    async fn emit_predictions(&mut self, predictions: &[Prediction]) -> Result<()> {
        self.insert_predictions(predictions)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn record(location: &str, hour: i64, temperature: f64) -> HistoricalRecord {
        let timestamp = start() + Duration::hours(hour);
        let (hour_of_day, day_of_year) = skycast_core::calendar_fields(timestamp);
        HistoricalRecord {
            location: location.to_string(),
            timestamp,
            temperature,
            humidity: 55.0,
            wind_speed: 3.0,
            wind_direction: 270.0,
            pressure: 1015.0,
            precipitation: 0.2,
            cloud_coverage: 75.0,
            weather_condition: Some("Rain".to_string()),
            hour_of_day,
            day_of_year,
        }
    }

    fn prediction(location: &str, hour: i64, version: u64) -> Prediction {
        Prediction {
            location: location.to_string(),
            prediction_timestamp: start() + Duration::hours(hour),
            forecast_value: 12.0 + hour as f64,
            forecast_metric_name: "temperature".to_string(),
            generated_at: start(),
            model_version: version,
        }
    }

    #[test]
    fn upsert_keeps_one_row_per_key() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert_records(&[record("New York", 0, 10.0), record("New York", 1, 11.0)])
            .unwrap();
        store
            .upsert_records(&[record("New York", 1, 12.0), record("New York", 2, 13.0)])
            .unwrap();

        let rows = store
            .weather_between("New York", start(), start() + Duration::hours(5))
            .unwrap();
        let temps: Vec<f64> = rows.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![10.0, 12.0, 13.0]);
        assert_eq!(rows[1], record("New York", 1, 12.0));
    }

    #[test]
    fn weather_between_filters_location_and_range() {
        let store = SqliteStore::in_memory().unwrap();
        let records: Vec<_> = (0..10)
            .map(|h| record("London", h, h as f64))
            .chain(std::iter::once(record("Paris", 3, 99.0)))
            .collect();
        store.upsert_records(&records).unwrap();

        let rows = store
            .weather_between("London", start() + Duration::hours(2), start() + Duration::hours(4))
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.location == "London"));
        assert_eq!(rows[0].timestamp, start() + Duration::hours(2));
    }

    #[test]
    fn latest_predictions_newest_first_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("skycast.db")).unwrap();
        store
            .insert_predictions(&[
                prediction("London", 1, 1),
                prediction("London", 3, 1),
                prediction("London", 2, 1),
                prediction("New York", 9, 1),
            ])
            .unwrap();

        let latest = store.latest_predictions("London", 2).unwrap();
        let hours: Vec<_> = latest
            .iter()
            .map(|p| (p.prediction_timestamp - start()).num_hours())
            .collect();
        assert_eq!(hours, vec![3, 2]);
        assert_eq!(latest[0], prediction("London", 3, 1));
    }

    #[test]
    fn sub_second_timestamps_stay_distinct() {
        let store = SqliteStore::in_memory().unwrap();
        let mut late = record("London", 0, 11.0);
        late.timestamp = start() + Duration::milliseconds(500);
        store
            .upsert_records(&[record("London", 0, 10.0), late.clone(), record("London", 1, 12.0)])
            .unwrap();

        let rows = store
            .weather_between("London", start(), start() + Duration::hours(1))
            .unwrap();
        let temps: Vec<f64> = rows.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![10.0, 11.0, 12.0]);
        assert_eq!(rows[1].timestamp, late.timestamp);
    }

    #[tokio::test]
    async fn implements_sink() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.emit_records(&[record("Tokyo", 0, 20.0)]).await.unwrap();
        store.emit_predictions(&[prediction("Tokyo", 1, 4)]).await.unwrap();

        assert_eq!(store.weather_between("Tokyo", start(), start()).unwrap().len(), 1);
        assert_eq!(store.latest_predictions("Tokyo", 24).unwrap()[0].model_version, 4);
    }
}
