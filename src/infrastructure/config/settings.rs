//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all client settings.
//! Configuration is loaded from a TOML file; every section is optional and
//! falls back to its defaults.
//!
//! # Example
//!
//! ```no_run
//! use modelet_admin::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("modelet-admin.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```
//!
//! A minimal file:
//!
//! ```toml
//! [registry]
//! admin_timeout_ms = 10000
//!
//! [clusters]
//! "/cells/us-east" = "10.0.0.7:14001"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::logging::LoggingConfig;
use super::registry::RegistryConfig;
use super::retry::RetryConfig;
use crate::error::{ConfigError, Result};

/// Main client configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Registry timeouts and address-watch pacing.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Backoff between attempts of a registry operation.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Static table of cluster identifier to registry address.
    ///
    /// Consumed by [`StaticResolver`](crate::adapter::outbound::resolver::StaticResolver).
    #[serde(default)]
    pub clusters: BTreeMap<String, String>,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        let registry = &self.registry;
        if registry.admin_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "admin_timeout_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if registry.dial_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dial_timeout_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if registry.watch_retry_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch_retry_delay_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if registry.watch_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch_channel_capacity",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        let retry = &self.retry;
        if retry.initial_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "initial_delay_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_delay_ms",
                reason: "must be >= initial_delay_ms".to_string(),
            }
            .into());
        }
        if retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier",
                reason: "must be >= 1.0".to_string(),
            }
            .into());
        }

        for (cluster, address) in &self.clusters {
            if cluster.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "clusters",
                    reason: "cluster identifier must not be empty".to_string(),
                }
                .into());
            }
            if address.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "clusters",
                    reason: format!("address for {cluster} must not be empty"),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
