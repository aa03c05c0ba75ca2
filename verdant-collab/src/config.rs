//! Session configuration.

use std::time::Duration;

use verdant_core::DEFAULT_HISTORY_LIMIT;

/// Reconnect schedule for the push channel.
///
/// The delay doubles with each consecutive failed attempt, starting from
/// `base_delay` and never exceeding `max_delay`. A successful open resets the
/// count. After `max_attempts` consecutive failures the channel gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 8,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnecting after `failures` consecutive failures.
    /// A drop of an open connection (zero failures) waits `base_delay`.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

/// Everything a [`Session`](crate::Session) needs besides the project id.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// HTTP(S) root of the API; the socket URL is derived from it.
    pub base_url: String,
    /// Undo checkpoints kept.
    pub history_limit: usize,
    pub reconnect: ReconnectPolicy,
    /// Timeout for each REST request.
    pub request_timeout: Duration,
    /// Capacity of the channel event and command queues.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            reconnect: ReconnectPolicy::default(),
            request_timeout: Duration::from_secs(10),
            event_buffer: 256,
        }
    }
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Short delays and few attempts, for tests against a local server.
    pub fn for_testing(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            history_limit: 10,
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(40),
                max_attempts: 3,
            },
            request_timeout: Duration::from_secs(2),
            event_buffer: 64,
        }
    }
}
