#![cfg(feature = "postgres")]
use crate::SinkResult;
use anyhow::Result;
use chrono::{DateTime, Utc};
use skycast_core::{HistoricalRecord, Prediction, Sink};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

/// Postgres-backed `weather_data` / `weather_predictions` tables
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    pub async fn new(url: &str) -> SinkResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS weather_data (
                location TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                temperature DOUBLE PRECISION NOT NULL,
                humidity DOUBLE PRECISION NOT NULL,
                wind_speed DOUBLE PRECISION NOT NULL,
                wind_direction DOUBLE PRECISION NOT NULL,
                pressure DOUBLE PRECISION NOT NULL,
                precipitation DOUBLE PRECISION NOT NULL,
                cloud_coverage DOUBLE PRECISION NOT NULL,
                weather_condition TEXT,
                hour_of_day INTEGER NOT NULL,
                day_of_year INTEGER NOT NULL,
                PRIMARY KEY (location, timestamp)
            );",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS weather_predictions (
                id BIGSERIAL PRIMARY KEY,
                location TEXT NOT NULL,
                prediction_timestamp TIMESTAMPTZ NOT NULL,
                forecast_value DOUBLE PRECISION NOT NULL,
                forecast_metric_name TEXT NOT NULL,
                generated_at TIMESTAMPTZ NOT NULL,
                model_version BIGINT NOT NULL
            );",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub async fn upsert_records(&self, records: &[HistoricalRecord]) -> SinkResult<usize> {
        let mut tx = self.pool.begin().await?;
        for r in records {
            sqlx::query(
                "INSERT INTO weather_data (location, timestamp, temperature, humidity, wind_speed,
                    wind_direction, pressure, precipitation, cloud_coverage, weather_condition,
                    hour_of_day, day_of_year)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                 ON CONFLICT (location, timestamp) DO UPDATE SET
                    temperature = EXCLUDED.temperature,
                    humidity = EXCLUDED.humidity,
                    wind_speed = EXCLUDED.wind_speed,
                    wind_direction = EXCLUDED.wind_direction,
                    pressure = EXCLUDED.pressure,
                    precipitation = EXCLUDED.precipitation,
                    cloud_coverage = EXCLUDED.cloud_coverage,
                    weather_condition = EXCLUDED.weather_condition,
                    hour_of_day = EXCLUDED.hour_of_day,
                    day_of_year = EXCLUDED.day_of_year",
            )
            .bind(&r.location)
            .bind(r.timestamp)
            .bind(r.temperature)
            .bind(r.humidity)
            .bind(r.wind_speed)
            .bind(r.wind_direction)
            .bind(r.pressure)
            .bind(r.precipitation)
            .bind(r.cloud_coverage)
            .bind(&r.weather_condition)
            .bind(r.hour_of_day as i32)
            .bind(r.day_of_year as i32)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    pub async fn insert_predictions(&self, predictions: &[Prediction]) -> SinkResult<usize> {
        let mut tx = self.pool.begin().await?;
        for p in predictions {
            sqlx::query(
                "INSERT INTO weather_predictions (location, prediction_timestamp, forecast_value,
                    forecast_metric_name, generated_at, model_version)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&p.location)
            .bind(p.prediction_timestamp)
            .bind(p.forecast_value)
            .bind(&p.forecast_metric_name)
            .bind(p.generated_at)
            .bind(p.model_version as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(predictions.len())
    }

    pub async fn weather_between(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SinkResult<Vec<HistoricalRecord>> {
        let rows = sqlx::query(
            "SELECT location, timestamp, temperature, humidity, wind_speed, wind_direction,
                    pressure, precipitation, cloud_coverage, weather_condition,
                    hour_of_day, day_of_year
             FROM weather_data
             WHERE location = $1 AND timestamp >= $2 AND timestamp <= $3
             ORDER BY timestamp ASC",
        )
        .bind(location)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(record_from_row).collect::<Result<_, _>>()?)
    }

    pub async fn latest_predictions(&self, location: &str, limit: usize) -> SinkResult<Vec<Prediction>> {
        let rows = sqlx::query(
            "SELECT location, prediction_timestamp, forecast_value, forecast_metric_name,
                    generated_at, model_version
             FROM weather_predictions
             WHERE location = $1
             ORDER BY prediction_timestamp DESC, id DESC
             LIMIT $2",
        )
        .bind(location)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                Ok(Prediction {
                    location: row.try_get("location")?,
                    prediction_timestamp: row.try_get("prediction_timestamp")?,
                    forecast_value: row.try_get("forecast_value")?,
                    forecast_metric_name: row.try_get("forecast_metric_name")?,
                    generated_at: row.try_get("generated_at")?,
                    model_version: row.try_get::<i64, _>("model_version")? as u64,
                })
            })
            .collect::<Result<_, sqlx::Error>>()?)
    }
}

fn record_from_row(row: &PgRow) -> Result<HistoricalRecord, sqlx::Error> {
    Ok(HistoricalRecord {
        location: row.try_get("location")?,
        timestamp: row.try_get("timestamp")?,
        temperature: row.try_get("temperature")?,
        humidity: row.try_get("humidity")?,
        wind_speed: row.try_get("wind_speed")?,
        wind_direction: row.try_get("wind_direction")?,
        pressure: row.try_get("pressure")?,
        precipitation: row.try_get("precipitation")?,
        cloud_coverage: row.try_get("cloud_coverage")?,
        weather_condition: row.try_get("weather_condition")?,
        hour_of_day: row.try_get::<i32, _>("hour_of_day")? as u32,
        day_of_year: row.try_get::<i32, _>("day_of_year")? as u32,
    })
}

#[async_trait::async_trait]
impl Sink for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn emit_records(&mut self, records: &[HistoricalRecord]) -> Result<()> {
        self.upsert_records(records).await?;
        Ok(())
    }

    async fn emit_predictions(&mut self, predictions: &[Prediction]) -> Result<()> {
        self.insert_predictions(predictions).await?;
        Ok(())
    }
}
