//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use crate::infrastructure::config::registry::RegistryConfig;
use crate::infrastructure::config::retry::RetryConfig;

/// Millisecond-scale backoff so retry tests finish quickly.
pub fn retry() -> RetryConfig {
    RetryConfig {
        initial_delay_ms: 1,
        max_delay_ms: 10,
        backoff_multiplier: 2.0,
    }
}

/// Registry settings with short timeouts and a small watch channel.
pub fn registry() -> RegistryConfig {
    RegistryConfig {
        admin_timeout_ms: 2_000,
        dial_timeout_ms: 1_000,
        watch_retry_delay_ms: 10,
        watch_channel_capacity: 16,
    }
}
