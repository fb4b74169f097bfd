//! Fixed-window request limiting keyed by client IP.
//!
//! State lives in a [`RateLimitStore`]; the default [`MemoryStore`] is
//! process-local, so several instances behind a balancer each enforce their
//! own budget. Expired entries are removed when a request is denied and, if
//! configured, by [`spawn_sweeper`] on a fixed period.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use time::{Duration, OffsetDateTime};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

pub mod clock;
pub mod extractors;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use extractors::ClientIp;
pub use store::{MemoryStore, RateLimitEntry, RateLimitStore};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: OffsetDateTime,
    /// Whole seconds until `reset_at`, never below one.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(
            X_RATELIMIT_RESET,
            HeaderValue::from(self.reset_at.unix_timestamp()),
        );
        if !self.allowed {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after_secs));
        }
    }
}

/// Longest window honoured; larger configured values are clamped to it.
pub const MAX_WINDOW: Duration = Duration::days(365);

/// Shortest period [`spawn_sweeper`] will tick at.
pub const MIN_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    max_requests: u32,
    // serialises get/set pairs so concurrent requests cannot both read the same count
    gate: Mutex<()>,
}

impl RateLimiter {
    pub fn new(cfg: &RateLimitConfig, store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            window: Duration::try_from(cfg.window)
                .unwrap_or(MAX_WINDOW)
                .min(MAX_WINDOW),
            max_requests: cfg.max_requests.max(1),
            gate: Mutex::new(()),
        }
    }

    pub fn in_memory(cfg: &RateLimitConfig) -> Self {
        Self::new(cfg, Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Counts one request against `key` and reports whether it may proceed.
    pub async fn check_and_consume(&self, key: &str) -> RateLimitDecision {
        let _guard = self.gate.lock().await;
        let now = self.clock.now();

        let existing = match self.store.get(key).await {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "rate limit store read failed; admitting request");
                return self.fresh_decision(now);
            }
        };

        match existing {
            Some(entry) if !entry.is_expired(now) => {
                if entry.count < self.max_requests {
                    let updated = RateLimitEntry {
                        count: entry.count + 1,
                        reset_at: entry.reset_at,
                    };
                    self.write(key, updated).await;
                    self.decision(true, self.max_requests - updated.count, updated.reset_at, now)
                } else {
                    match self.store.sweep(now).await {
                        Ok(removed) if removed > 0 => debug!(removed, "swept expired rate limit entries"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "rate limit sweep failed"),
                    }
                    self.decision(false, 0, entry.reset_at, now)
                }
            }
            _ => {
                let entry = RateLimitEntry {
                    count: 1,
                    reset_at: self.window_end(now),
                };
                self.write(key, entry).await;
                self.decision(true, self.max_requests - 1, entry.reset_at, now)
            }
        }
    }

    /// Current standing of `key` without counting a request against it.
    pub async fn peek(&self, key: &str) -> RateLimitDecision {
        let _guard = self.gate.lock().await;
        let now = self.clock.now();

        match self.store.get(key).await {
            Ok(Some(entry)) if !entry.is_expired(now) => self.decision(
                entry.count < self.max_requests,
                self.max_requests.saturating_sub(entry.count),
                entry.reset_at,
                now,
            ),
            Ok(_) => self.decision(true, self.max_requests, self.window_end(now), now),
            Err(e) => {
                warn!(error = %e, "rate limit store read failed");
                self.decision(true, self.max_requests, self.window_end(now), now)
            }
        }
    }

    /// Removes expired entries; used by the periodic sweeper.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let _guard = self.gate.lock().await;
        self.store.sweep(self.clock.now()).await
    }

    async fn write(&self, key: &str, entry: RateLimitEntry) {
        if let Err(e) = self.store.set(key, entry).await {
            warn!(error = %e, "rate limit store write failed");
        }
    }

    fn fresh_decision(&self, now: OffsetDateTime) -> RateLimitDecision {
        self.decision(true, self.max_requests - 1, self.window_end(now), now)
    }

    fn window_end(&self, now: OffsetDateTime) -> OffsetDateTime {
        now.checked_add(self.window).unwrap_or(now)
    }

    fn decision(
        &self,
        allowed: bool,
        remaining: u32,
        reset_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> RateLimitDecision {
        let left = reset_at - now;
        let mut secs = left.whole_seconds().max(0) as u64;
        if left.subsec_nanoseconds() > 0 {
            secs += 1;
        }
        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining,
            reset_at,
            retry_after_secs: secs.max(1),
        }
    }
}

/// Runs [`RateLimiter::sweep`] every `every` until the task is aborted.
/// Periods below [`MIN_SWEEP_INTERVAL`] are raised to it.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: std::time::Duration) -> JoinHandle<()> {
    let every = every.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match limiter.sweep().await {
                Ok(removed) if removed > 0 => debug!(removed, "periodic rate limit sweep"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "periodic rate limit sweep failed"),
            }
        }
    })
}
