//! Configuration management
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `CALLWATCH__SECTION__KEY` environment variables.

use crate::domain::quality::BitrateBounds;
use crate::domain::shared::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "CALLWATCH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Setup-phase sessions older than this are failed
    pub ringing_timeout_seconds: u64,
    /// How long terminal sessions stay queryable
    pub terminal_retention_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    /// Fixed device-side latency added to RTT/2
    pub device_latency_ms: f64,
    /// Period of the timeout and eviction sweeps
    pub sweep_interval_seconds: u64,
    /// Period of `system_metrics` snapshots on the metrics topic
    pub metrics_interval_seconds: u64,
    /// Outbound queue depth per subscriber connection
    pub subscriber_queue_capacity: usize,
    pub bitrate_bounds: BitrateBounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address for the Prometheus scrape endpoint; disabled when unset
    pub prometheus_listen: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            engine: EngineConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            metrics: MetricsConfig {
                prometheus_listen: None,
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ringing_timeout_seconds: 60,
            terminal_retention_seconds: 300,
            heartbeat_interval_seconds: 30,
            device_latency_ms: 0.0,
            sweep_interval_seconds: 1,
            metrics_interval_seconds: 5,
            subscriber_queue_capacity: 256,
            bitrate_bounds: BitrateBounds::default(),
        }
    }
}

impl EngineConfig {
    pub fn ringing_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ringing_timeout_seconds as i64)
    }

    pub fn terminal_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.terminal_retention_seconds as i64)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("ringing_timeout_seconds", self.ringing_timeout_seconds),
            ("terminal_retention_seconds", self.terminal_retention_seconds),
            ("heartbeat_interval_seconds", self.heartbeat_interval_seconds),
            ("sweep_interval_seconds", self.sweep_interval_seconds),
            ("metrics_interval_seconds", self.metrics_interval_seconds),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(EngineError::Config(format!("engine.{} must be positive", name)));
            }
        }
        if !self.device_latency_ms.is_finite() || self.device_latency_ms < 0.0 {
            return Err(EngineError::Config(
                "engine.device_latency_ms must be a non-negative number".to_string(),
            ));
        }
        if self.subscriber_queue_capacity == 0 {
            return Err(EngineError::Config(
                "engine.subscriber_queue_capacity must be positive".to_string(),
            ));
        }
        self.bitrate_bounds.validate()
    }
}

impl Config {
    /// Load defaults, then `path` (if any), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Config::default()).map_err(config_error)?;
        let mut builder = ::config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn config_error(e: ::config::ConfigError) -> EngineError {
    EngineError::Config(e.to_string())
}
