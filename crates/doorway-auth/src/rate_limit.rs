//! Sliding-window rate limiter for magic-link requests.
//!
//! Each key (an email address or a source address) keeps a log of the
//! instants it was admitted. A request is admitted only if every one of
//! its keys has fewer than `max` entries inside the trailing window.
//! Checking and recording happen under one lock, so concurrent requests
//! for the same key cannot both slip past the limit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use doorway_core::clock::Clock;

use crate::config::AuthConfig;
use crate::error::AuthError;

pub struct RateLimiter {
    max: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    log: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max", &self.max)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max,
            window,
            clock,
            log: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter for magic-link requests as configured.
    pub fn for_magic_links(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.magic_link_rate_limit_max,
            Duration::seconds(config.magic_link_rate_limit_window_secs as i64),
            clock,
        )
    }

    /// Admit one request counted against every key, or reject it without
    /// recording anything.
    pub fn check(&self, keys: &[String]) -> Result<(), AuthError> {
        let now = self.clock.now();
        let horizon = now - self.window;

        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());

        for key in keys {
            if let Some(entries) = log.get_mut(key) {
                prune(entries, horizon);
                if entries.len() >= self.max {
                    tracing::warn!(key = %key, "magic link rate limit exceeded");
                    return Err(AuthError::RateLimited);
                }
            }
        }

        for key in keys {
            log.entry(key.clone()).or_default().push_back(now);
        }
        Ok(())
    }

    /// Requests still admissible for `key` in the current window.
    pub fn remaining(&self, key: &str) -> usize {
        let horizon = self.clock.now() - self.window;
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let used = log.get_mut(key).map_or(0, |entries| {
            prune(entries, horizon);
            entries.len()
        });
        self.max.saturating_sub(used)
    }

    /// Drop keys with no admissions inside the window.
    pub fn cleanup(&self) {
        let horizon = self.clock.now() - self.window;
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.retain(|_, entries| {
            prune(entries, horizon);
            !entries.is_empty()
        });
    }
}

fn prune(entries: &mut VecDeque<DateTime<Utc>>, horizon: DateTime<Utc>) {
    while entries.front().is_some_and(|at| *at <= horizon) {
        entries.pop_front();
    }
}

/// Keys a magic-link request is counted against.
pub fn magic_link_keys(email_address: &str, ip_address: Option<&str>) -> Vec<String> {
    let mut keys = vec![format!("email:{email_address}")];
    if let Some(ip) = ip_address {
        keys.push(format!("ip:{ip}"));
    }
    keys
}
