//! Inspector configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Top-level inspector configuration.
///
/// Loaded once at startup via [`InspectorConfig::from_env`].
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Base URL of the Jupyter Server hosting the sessions.
    pub jupyter_url: String,

    /// Jupyter Server API token, if the server requires one.
    pub jupyter_token: Option<String>,

    /// Capacity of each handler's update broadcast channel.
    pub update_bus_capacity: usize,

    /// Default row limit for matrix inspections.
    pub matrix_max_rows: usize,

    /// How long to wait for a kernel to answer `kernel_info_request`.
    pub kernel_ready_timeout: Duration,

    /// Delay before a handler retries a failed init script.
    pub init_retry_delay: Duration,

    /// Timeout of REST calls to the Jupyter Server (`reqwest` client only).
    pub http_timeout: Duration,

    /// Log output format.
    pub log_format: LogFormat,
}

impl InspectorConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8765".to_string())
            .parse()?;

        let jupyter_url = std::env::var("JUPYTER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8888".to_string())
            .trim_end_matches('/')
            .to_string();

        let jupyter_token = std::env::var("JUPYTER_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            jupyter_url,
            jupyter_token,
            update_bus_capacity: parse_env("UPDATE_BUS_CAPACITY", 64),
            matrix_max_rows: parse_env("MATRIX_MAX_ROWS", 100_000),
            kernel_ready_timeout: Duration::from_secs(parse_env("KERNEL_READY_TIMEOUT_SECS", 30)),
            init_retry_delay: Duration::from_millis(parse_env("INIT_RETRY_DELAY_MS", 1_000)),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 10)),
            log_format,
        })
    }
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            jupyter_url: "http://127.0.0.1:8888".to_string(),
            jupyter_token: None,
            update_bus_capacity: 64,
            matrix_max_rows: 100_000,
            kernel_ready_timeout: Duration::from_secs(30),
            init_retry_delay: Duration::from_secs(1),
            http_timeout: Duration::from_secs(10),
            log_format: LogFormat::Text,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
