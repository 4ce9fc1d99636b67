//! Configuration management for penaltybox.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::http::HeaderName;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PenaltyBoxError, Result};
use crate::ratelimit::LimiterSettings;

/// Prefix for environment overrides, e.g. `PENALTYBOX__RATE_LIMITING__MAX_REQUESTS`.
const ENV_PREFIX: &str = "PENALTYBOX";

/// Main configuration for the penaltybox service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PenaltyBoxConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Request header carrying the client identifier
    #[serde(default = "default_client_header")]
    pub client_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            client_header: default_client_header(),
        }
    }
}

impl ServerConfig {
    /// The client identifier header as a typed header name.
    pub fn client_header_name(&self) -> Result<HeaderName> {
        HeaderName::try_from(self.client_header.as_str()).map_err(|e| {
            PenaltyBoxError::Config(format!(
                "invalid client header {:?}: {}",
                self.client_header, e
            ))
        })
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_client_header() -> String {
    "x-forwarded-for".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum admitted requests per client within the window
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Counting window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Blacklist backoff in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Ledger sweep interval in milliseconds (0 disables sweeping)
    #[serde(default)]
    pub sweep_interval_ms: u64,

    /// Lock per client instead of one lock for all clients
    #[serde(default)]
    pub sharded: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            backoff_ms: default_backoff_ms(),
            sweep_interval_ms: 0,
            sharded: false,
        }
    }
}

impl RateLimitingConfig {
    /// Limiter parameters described by this configuration.
    pub fn settings(&self) -> LimiterSettings {
        LimiterSettings::new(
            self.max_requests,
            Duration::from_millis(self.window_ms),
            Duration::from_millis(self.backoff_ms),
        )
    }

    /// Sweep interval, if sweeping is enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }
}

fn default_max_requests() -> usize {
    5
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_backoff_ms() -> u64 {
    30_000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PenaltyBoxConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `PENALTYBOX__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let config: PenaltyBoxConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PenaltyBoxConfig = serde_yaml::from_str(yaml)
            .map_err(|e| PenaltyBoxError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.max_requests == 0 {
            return Err(PenaltyBoxError::Config(
                "rate_limiting.max_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limiting.window_ms == 0 {
            return Err(PenaltyBoxError::Config(
                "rate_limiting.window_ms must be positive".to_string(),
            ));
        }
        self.server.client_header_name()?;
        Ok(())
    }
}
