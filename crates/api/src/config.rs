//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default depends on the service)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for plain text
/// - `ORDER_SERVICE_URL` / `SALES_SERVICE_URL`: participant endpoints
/// - `DATABASE_URL`: PostgreSQL; unset means in-memory stores with demo data
/// - `NATS_URL`: NATS server; unset means an in-process bus
/// - `OUTBOX_POLL_INTERVAL_MS`, `OUTBOX_BACKOFF_MS`: outbox relay timing
/// - `STEP_TIMEOUT_MS`: bound on every participant call
/// - `WORKFLOW_RETENTION_SECS`, `WORKFLOW_SWEEP_INTERVAL_SECS`: workflow pruning
///
/// Durations must be positive; zero or unparseable values use the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub order_service_url: String,
    pub sales_service_url: String,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub outbox_poll_interval: Duration,
    pub outbox_backoff: Duration,
    pub step_timeout: Duration,
    pub workflow_retention: Duration,
    pub workflow_sweep_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env(default_port: u16) -> Self {
        Self::from_lookup(default_port, |key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(default_port: u16, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::with_port(default_port);
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: Duration| {
            var(key)
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let secs = |key: &str, default: Duration| {
            var(key)
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(default_port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT") {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            order_service_url: var("ORDER_SERVICE_URL").unwrap_or(defaults.order_service_url),
            sales_service_url: var("SALES_SERVICE_URL").unwrap_or(defaults.sales_service_url),
            database_url: var("DATABASE_URL"),
            nats_url: var("NATS_URL"),
            outbox_poll_interval: millis("OUTBOX_POLL_INTERVAL_MS", defaults.outbox_poll_interval),
            outbox_backoff: millis("OUTBOX_BACKOFF_MS", defaults.outbox_backoff),
            step_timeout: millis("STEP_TIMEOUT_MS", defaults.step_timeout),
            workflow_retention: secs("WORKFLOW_RETENTION_SECS", defaults.workflow_retention),
            workflow_sweep_interval: secs(
                "WORKFLOW_SWEEP_INTERVAL_SECS",
                defaults.workflow_sweep_interval,
            ),
        }
    }

    /// Default configuration listening on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            order_service_url: "http://localhost:8080".to_string(),
            sales_service_url: "http://localhost:3000".to_string(),
            database_url: None,
            nats_url: None,
            outbox_poll_interval: Duration::from_millis(2000),
            outbox_backoff: Duration::from_millis(5000),
            step_timeout: Duration::from_millis(10_000),
            workflow_retention: Duration::from_secs(86_400),
            workflow_sweep_interval: Duration::from_secs(60),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
