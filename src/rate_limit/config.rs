//! Rate limiter tuning.

use std::time::Duration;

/// Delay bounds and backoff factors for board servers.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Spacing between requests to one host when it is healthy.
    pub base_delay: Duration,
    /// Ceiling for backoff.
    pub max_delay: Duration,
    /// Applied to the delay on 429/503.
    pub backoff_multiplier: f64,
    /// Applied to the delay on other 5xx.
    pub server_error_multiplier: f64,
    /// Applied to the delay after `recovery_threshold` straight successes.
    pub recovery_multiplier: f64,
    pub recovery_threshold: u32,
}

impl RateLimitConfig {
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            server_error_multiplier: 1.5,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
        }
    }
}
