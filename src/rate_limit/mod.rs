//! Adaptive per-host request pacing.
//!
//! Board servers throttle aggressive clients, so requests to one host are
//! spaced by a delay that grows on 429/503 (or a Retry-After hint), grows
//! mildly on other 5xx, and shrinks back after a run of healthy responses.

mod config;
mod host;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

pub use config::RateLimitConfig;
pub use host::{HostStats, ResponseClass};
use host::HostState;

/// Shared per-host pacing. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    hosts: Arc<Mutex<HashMap<String, HostState>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            hosts: Arc::default(),
        }
    }

    pub fn host_of(url: &str) -> Option<String> {
        Url::parse(url).ok()?.host_str().map(str::to_string)
    }

    /// Wait for the host's turn and claim it. Returns the host, or None for
    /// URLs without one (those are not paced).
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let host = Self::host_of(url)?;

        loop {
            let wait = {
                let mut hosts = self.hosts.lock().await;
                let state = hosts
                    .entry(host.clone())
                    .or_insert_with(|| HostState::new(self.config.base_delay));
                let wait = state.wait();
                if wait.is_zero() {
                    state.last_request = Some(Instant::now());
                    state.requests += 1;
                    return Some(host);
                }
                wait
            };
            debug!("Pacing {}: waiting {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Adjust the host's delay from a response status.
    pub async fn record(&self, host: &str, status: u16, retry_after: Option<Duration>) {
        let mut hosts = self.hosts.lock().await;
        let Some(state) = hosts.get_mut(host) else {
            return;
        };

        match ResponseClass::of(status) {
            ResponseClass::Throttled => {
                state.throttled += 1;
                state.healthy_streak = 0;
                state.backing_off = true;
                let backed_off = self.scaled(state.delay, self.config.backoff_multiplier);
                state.delay = retry_after
                    .map_or(backed_off, |hint| backed_off.max(hint))
                    .min(self.config.max_delay);
                warn!(
                    "Throttled by {} (HTTP {}), spacing requests {:?}",
                    host, status, state.delay
                );
            }
            ResponseClass::ServerError => {
                state.healthy_streak = 0;
                state.delay = self.scaled(state.delay, self.config.server_error_multiplier);
                debug!("HTTP {} from {}, delay now {:?}", status, host, state.delay);
            }
            ResponseClass::Healthy if state.backing_off => {
                state.healthy_streak += 1;
                if state.healthy_streak >= self.config.recovery_threshold {
                    state.healthy_streak = 0;
                    state.delay = self.scaled(state.delay, self.config.recovery_multiplier);
                    if state.delay <= self.config.base_delay {
                        state.delay = self.config.base_delay;
                        state.backing_off = false;
                        info!("{} recovered from backoff", host);
                    }
                }
            }
            ResponseClass::Healthy | ResponseClass::Neutral => {}
        }
    }

    pub async fn stats(&self, host: &str) -> Option<HostStats> {
        self.hosts.lock().await.get(host).map(HostState::stats)
    }

    fn scaled(&self, delay: Duration, factor: f64) -> Duration {
        delay.mul_f64(factor).min(self.config.max_delay)
    }
}
