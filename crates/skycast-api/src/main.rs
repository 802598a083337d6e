use std::net::SocketAddr;

use anyhow::{Context, Result};
use skycast_api::ApiConfig;
use skycast_obs::LogFormat;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Observability
    skycast_obs::init("skycast-api", LogFormat::from_env());

    // Config
    let cfg = skycast_config::AppConfig::load().context("Failed to load configuration")?;
    let http_bind = cfg.http_bind();

    let (app, state) = skycast_api::build_app(ApiConfig::from(&cfg))?;

    let addr: SocketAddr = http_bind
        .parse()
        .with_context(|| format!("Invalid HTTP bind address {:?}", http_bind))?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    // Mark ready just before serving
    skycast_api::set_ready(&state, true);

    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
