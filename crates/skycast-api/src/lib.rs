//! Read-only HTTP surface for the dashboard.
//!
//! Serves the historical dataset and the prediction table of the configured
//! locations; nothing here writes back into the pipeline.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Duration;
use opentelemetry::metrics::{Counter, MeterProvider};
use opentelemetry::KeyValue;
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use skycast_archive::HistoricalStore;
use skycast_config::AppConfig;
use skycast_core::{HistoricalRecord, Prediction};
use skycast_sinks::FsSink;

pub const DEFAULT_DAYS: i64 = 7;
pub const MAX_DAYS: i64 = 30;

/// What the API serves and from where
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Forecastable locations; anything else is 404
    pub locations: Vec<String>,
    /// Maximum predictions returned per location
    pub forecast_horizon: usize,
    pub processed_file: PathBuf,
    pub predictions_dir: PathBuf,
}

impl From<&AppConfig> for ApiConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            locations: cfg.location_names(),
            forecast_horizon: cfg.source.forecast_horizon,
            processed_file: cfg.paths.processed_file.clone(),
            predictions_dir: cfg.paths.predictions_dir.clone(),
        }
    }
}

pub struct AppState {
    ready: AtomicBool,
    registry: Registry,
    #[allow(dead_code)]
    provider: SdkMeterProvider,
    requests_total: Counter<u64>,
    locations: Vec<String>,
    forecast_horizon: usize,
    historical: HistoricalStore,
    predictions: FsSink,
}

pub fn build_app(config: ApiConfig) -> Result<(Router, Arc<AppState>)> {
    // Prometheus exporter via OpenTelemetry
    let registry = Registry::new();
    let reader = exporter().with_registry(registry.clone()).build()?;
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    let meter = provider.meter("skycast-api");

    let requests_total = meter
        .u64_counter("skycast_requests_total")
        .with_description("Total HTTP requests served")
        .init();

    let state = Arc::new(AppState {
        ready: AtomicBool::new(false),
        registry,
        provider,
        requests_total,
        locations: config.locations,
        forecast_horizon: config.forecast_horizon,
        historical: HistoricalStore::new(config.processed_file),
        predictions: FsSink::new(config.predictions_dir)?,
    });

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/locations", get(locations))
        .route("/api/v1/weather", get(weather))
        .route("/api/v1/predictions", get(predictions))
        .with_state(Arc::clone(&state));

    Ok((router, state))
}

pub fn set_ready(state: &Arc<AppState>, is_ready: bool) {
    state.ready.store(is_ready, Ordering::Relaxed);
}

impl AppState {
    fn count(&self, route: &'static str) {
        self.requests_total.add(1, &[KeyValue::new("route", route)]);
    }

    fn is_known(&self, location: &str) -> bool {
        self.locations.iter().any(|l| l == location)
    }
}

fn not_found(location: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("unknown location {:?}", location) })),
    )
        .into_response()
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    tracing::error!(error = %e, "failed to read store");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "store unavailable" })),
    )
        .into_response()
}

async fn healthz(State(state): State<Arc<AppState>>) -> StatusCode {
    state.count("healthz");
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics(
    State(state): State<Arc<AppState>>,
) -> (
    [(axum::http::header::HeaderName, axum::http::HeaderValue); 1],
    String,
) {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::warn!(error=?e, "failed to encode metrics");
    }
    let body = String::from_utf8(buf).unwrap_or_default();
    let header = (
        header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    ([header], body)
}

async fn locations(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    state.count("locations");
    Json(state.locations.clone())
}

#[derive(Deserialize)]
struct WeatherQuery {
    location: String,
    days: Option<i64>,
}

/// Records of the newest `days` days of one location, oldest first
pub fn weather_window(records: Vec<HistoricalRecord>, location: &str, days: i64) -> Vec<HistoricalRecord> {
    let mut records: Vec<HistoricalRecord> = records
        .into_iter()
        .filter(|r| r.location == location)
        .collect();
    records.sort_by_key(|r| r.timestamp);

    let Some(newest) = records.last().map(|r| r.timestamp) else {
        return records;
    };
    let cutoff = newest - Duration::days(days.clamp(1, MAX_DAYS));
    records.retain(|r| r.timestamp >= cutoff);
    records
}

async fn weather(State(state): State<Arc<AppState>>, Query(q): Query<WeatherQuery>) -> Response {
    state.count("weather");
    if !state.is_known(&q.location) {
        return not_found(&q.location);
    }
    match state.historical.load() {
        Ok(records) => {
            let days = q.days.unwrap_or(DEFAULT_DAYS);
            (StatusCode::OK, Json(weather_window(records, &q.location, days))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
struct PredictionQuery {
    location: String,
}

/// Predictions of one location by prediction time, newest first, at most `limit`
pub fn newest_predictions(history: Vec<Prediction>, location: &str, limit: usize) -> Vec<Prediction> {
    // later emissions win ties on prediction time
    let mut predictions: Vec<Prediction> = history
        .into_iter()
        .rev()
        .filter(|p| p.location == location)
        .collect();
    predictions.sort_by(|a, b| b.prediction_timestamp.cmp(&a.prediction_timestamp));
    predictions.truncate(limit);
    predictions
}

async fn predictions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PredictionQuery>,
) -> Response {
    state.count("predictions");
    if !state.is_known(&q.location) {
        return not_found(&q.location);
    }
    match state.predictions.read_history() {
        Ok(history) => (
            StatusCode::OK,
            Json(newest_predictions(history, &q.location, state.forecast_horizon)),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn prediction(location: &str, hours: i64, version: u64) -> Prediction {
        Prediction {
            location: location.to_string(),
            prediction_timestamp: at(hours),
            forecast_value: hours as f64,
            forecast_metric_name: "temperature".to_string(),
            generated_at: at(0),
            model_version: version,
        }
    }

    #[test]
    fn newest_predictions_orders_and_limits() {
        let history = vec![
            prediction("London", 1, 1),
            prediction("London", 5, 1),
            prediction("Paris", 9, 1),
            prediction("London", 5, 2),
            prediction("London", 3, 2),
        ];

        let newest = newest_predictions(history, "London", 2);

        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].prediction_timestamp, at(5));
        assert_eq!(newest[0].model_version, 2);
        assert_eq!(newest[1].model_version, 1);
    }
}
