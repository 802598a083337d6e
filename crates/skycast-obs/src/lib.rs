use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,skycast=debug";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line, for log collectors
    #[default]
    Json,
    /// Human-readable lines for local runs
    Pretty,
}

impl LogFormat {
    /// Read SKYCAST_LOG_FORMAT ("json" or "pretty"); anything else means JSON
    pub fn from_env() -> Self {
        match std::env::var("SKYCAST_LOG_FORMAT").as_deref() {
            Ok("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Initialize logging.
/// - RUST_LOG respected; default to "info,skycast=debug"
/// - Safe to call more than once; later calls are no-ops
pub fn init(service_name: &str, format: LogFormat) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let registry = tracing_subscriber::registry().with(EnvFilter::new(env_filter));

    let installed = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if installed.is_ok() {
        tracing::info!(service = %service_name, ?format, "Observability initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        init("skycast-test", LogFormat::Pretty);
        init("skycast-test", LogFormat::Json);
    }
}
