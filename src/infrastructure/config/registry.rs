//! Registry connection and address-watch settings.

use std::time::Duration;

use serde::Deserialize;

/// Timeouts and pacing for talking to a cluster's registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Deadline for each administrative call, retries included (milliseconds).
    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: u64,
    /// Deadline for opening a registry connection (milliseconds).
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    /// Pause after a failed address subscription before resubscribing
    /// from scratch (milliseconds).
    #[serde(default = "default_watch_retry_delay_ms")]
    pub watch_retry_delay_ms: u64,
    /// Diff batches buffered between a model's watcher and its replica.
    #[serde(default = "default_watch_channel_capacity")]
    pub watch_channel_capacity: usize,
}

const fn default_admin_timeout_ms() -> u64 {
    10_000
}

const fn default_dial_timeout_ms() -> u64 {
    10_000
}

const fn default_watch_retry_delay_ms() -> u64 {
    1_000
}

const fn default_watch_channel_capacity() -> usize {
    64
}

impl RegistryConfig {
    #[must_use]
    pub const fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.admin_timeout_ms)
    }

    #[must_use]
    pub const fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    #[must_use]
    pub const fn watch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.watch_retry_delay_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            admin_timeout_ms: default_admin_timeout_ms(),
            dial_timeout_ms: default_dial_timeout_ms(),
            watch_retry_delay_ms: default_watch_retry_delay_ms(),
            watch_channel_capacity: default_watch_channel_capacity(),
        }
    }
}
