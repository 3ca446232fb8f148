//! Configuration loading and types for RecycleGate.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, the upstream storage service, the recycle grace
//! periods, logging, and observability.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream storage service settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Recycle grace periods.
    #[serde(default)]
    pub recycle: RecycleConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probe).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Upstream storage service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Backend type: `http` or `memory`.
    ///
    /// `memory` runs a self-contained in-process store for development and
    /// tests; production deployments point `http` at the real storage
    /// service.
    #[serde(default = "default_upstream_backend")]
    pub backend: String,

    /// HTTP upstream configuration.
    #[serde(default)]
    pub http: HttpUpstreamConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            backend: default_upstream_backend(),
            http: HttpUpstreamConfig::default(),
        }
    }
}

/// HTTP upstream endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpUpstreamConfig {
    /// Base URL of the storage service, without a trailing slash.
    #[serde(default = "default_upstream_endpoint")]
    pub endpoint: String,

    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for HttpUpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_upstream_endpoint(),
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Recycle grace periods, in seconds.  Zero means immediately eligible.
#[derive(Debug, Clone, Deserialize)]
pub struct RecycleConfig {
    /// Seconds a marked account must wait before DELETE is accepted.
    #[serde(default = "default_account_recycled_seconds")]
    pub account_recycled_seconds: u64,

    /// Seconds after marking until the service auto-expires an object.
    #[serde(default = "default_object_recycled_seconds")]
    pub object_recycled_seconds: u64,
}

impl Default for RecycleConfig {
    fn default() -> Self {
        Self {
            account_recycled_seconds: default_account_recycled_seconds(),
            object_recycled_seconds: default_object_recycled_seconds(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_upstream_backend() -> String {
    "http".to_string()
}

fn default_upstream_endpoint() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    60
}

fn default_account_recycled_seconds() -> u64 {
    2_592_000 // 30 days
}

fn default_object_recycled_seconds() -> u64 {
    604_800 // 7 days
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

// -- Tests --------------------------------------------------------------------
