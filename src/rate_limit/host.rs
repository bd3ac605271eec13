//! Pacing state for one board server.

use std::time::{Duration, Instant};

/// How a response should move a host's delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 429 or 503.
    Throttled,
    /// Any other 5xx.
    ServerError,
    /// 2xx or 3xx.
    Healthy,
    /// 4xx other than 429; says nothing about load.
    Neutral,
}

impl ResponseClass {
    pub fn of(status: u16) -> Self {
        match status {
            429 | 503 => Self::Throttled,
            500..=599 => Self::ServerError,
            200..=399 => Self::Healthy,
            _ => Self::Neutral,
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct HostState {
    pub delay: Duration,
    pub last_request: Option<Instant>,
    pub healthy_streak: u32,
    pub backing_off: bool,
    pub requests: u64,
    pub throttled: u64,
}

impl HostState {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_request: None,
            healthy_streak: 0,
            backing_off: false,
            requests: 0,
            throttled: 0,
        }
    }

    pub fn wait(&self) -> Duration {
        self.last_request
            .map(|last| self.delay.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn stats(&self) -> HostStats {
        HostStats {
            delay: self.delay,
            backing_off: self.backing_off,
            requests: self.requests,
            throttled: self.throttled,
        }
    }
}

/// Snapshot of one host's pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStats {
    pub delay: Duration,
    pub backing_off: bool,
    pub requests: u64,
    pub throttled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_classes() {
        assert_eq!(ResponseClass::of(429), ResponseClass::Throttled);
        assert_eq!(ResponseClass::of(503), ResponseClass::Throttled);
        assert_eq!(ResponseClass::of(502), ResponseClass::ServerError);
        assert_eq!(ResponseClass::of(301), ResponseClass::Healthy);
        assert_eq!(ResponseClass::of(404), ResponseClass::Neutral);
    }

    #[test]
    fn test_fresh_host_needs_no_wait() {
        assert_eq!(HostState::new(Duration::from_secs(5)).wait(), Duration::ZERO);
    }
}
