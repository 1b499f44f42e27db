//! Per-client token bucket admission control.
//!
//! A [`RateLimiter`] owns one bucket per client key behind a single lock.
//! [`RateLimiter::allow`] is the only decision-producing operation; it also
//! evicts idle buckets whenever a cleanup interval has passed since the last
//! sweep, so no background task is required. [`RateLimiter::start_cleanup_task`]
//! adds a timer-driven sweep for quiet periods.

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::rate_limit_config::LimiterConfig;
use crate::token_bucket::TokenBucket;

/// Shared, cheaply cloneable token bucket limiter keyed by client id.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<LimiterConfig>,
    store: Arc<RwLock<LimiterStore>>,
}

struct LimiterStore {
    buckets: HashMap<String, TokenBucket>,
    last_cleanup: Instant,
}

impl LimiterStore {
    /// Remove buckets idle for longer than `threshold`, returning how many went.
    fn evict_idle(&mut self, now: Instant, threshold: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_idle(now, threshold));
        self.last_cleanup = now;
        before - self.buckets.len()
    }
}

/// Point-in-time view of a limiter, for the debug endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterSnapshot {
    pub total_clients: usize,
    pub current_time: String,
    pub clients: BTreeMap<String, ClientSnapshot>,
    pub config: SnapshotConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    /// Tokens the client would hold right now, refill included
    pub tokens: u32,
    pub last_update: String,
    pub time_since_last_update_ms: u64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
    #[serde(with = "humantime_serde")]
    pub inactive_threshold: Duration,
    pub inactive_threshold_minutes: f64,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        let config = config.with_default_durations();
        debug!(
            requests_per_second = config.requests_per_second,
            burst_size = config.burst_size,
            cleanup_interval = ?config.cleanup_interval,
            inactive_threshold = ?config.inactive_threshold,
            "Creating token bucket rate limiter"
        );

        Self {
            config: Arc::new(config),
            store: Arc::new(RwLock::new(LimiterStore {
                buckets: HashMap::new(),
                last_cleanup: Instant::now(),
            })),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Decide whether a request from `client_id` is admitted, consuming one
    /// token if so. A denial leaves the bucket in place.
    pub fn allow(&self, client_id: &str) -> bool {
        self.allow_at(client_id, Instant::now())
    }

    pub(crate) fn allow_at(&self, client_id: &str, now: Instant) -> bool {
        let rate = self.config.requests_per_second;
        let capacity = self.config.burst_size;
        let inactive_threshold = self.config.inactive_threshold;

        let mut store = self.write_store();

        if now.saturating_duration_since(store.last_cleanup) > self.config.cleanup_interval {
            let evicted = store.evict_idle(now, inactive_threshold);
            if evicted > 0 {
                debug!(evicted, remaining = store.buckets.len(), "Evicted idle rate limit buckets");
            }
        }

        let bucket = match store.buckets.entry(client_id.to_string()) {
            Entry::Occupied(entry) => {
                let bucket = entry.into_mut();
                if bucket.is_idle(now, inactive_threshold) {
                    bucket.reset(capacity, now);
                }
                bucket
            }
            Entry::Vacant(entry) => {
                // a zero rate can never admit anyone, so don't track the client
                if rate == 0 {
                    return false;
                }
                entry.insert(TokenBucket::full(capacity, now))
            }
        };

        bucket.refill(now, rate, capacity);
        bucket.try_consume()
    }

    /// Evict idle buckets now, regardless of when the last sweep ran.
    pub fn cleanup(&self) -> usize {
        let evicted = self
            .write_store()
            .evict_idle(Instant::now(), self.config.inactive_threshold);
        if evicted > 0 {
            debug!(evicted, "Evicted idle rate limit buckets");
        }
        evicted
    }

    /// Number of clients currently holding a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.read_store().buckets.len()
    }

    /// Read-only view of every tracked client. Never mutates a bucket.
    pub fn snapshot(&self) -> LimiterSnapshot {
        self.snapshot_at(Instant::now(), SystemTime::now())
    }

    pub(crate) fn snapshot_at(&self, now: Instant, wall_now: SystemTime) -> LimiterSnapshot {
        let config = &*self.config;
        let store = self.read_store();

        let clients = store
            .buckets
            .iter()
            .map(|(client_id, bucket)| {
                let since = bucket.idle_for(now);
                let last_update = wall_now.checked_sub(since).unwrap_or(wall_now);
                let state = ClientSnapshot {
                    tokens: bucket.tokens_at(now, config.requests_per_second, config.burst_size),
                    last_update: humantime::format_rfc3339_millis(last_update).to_string(),
                    time_since_last_update_ms: u64::try_from(since.as_millis()).unwrap_or(u64::MAX),
                    is_active: since < config.inactive_threshold,
                };
                (client_id.clone(), state)
            })
            .collect();

        LimiterSnapshot {
            total_clients: store.buckets.len(),
            current_time: humantime::format_rfc3339_millis(wall_now).to_string(),
            clients,
            config: SnapshotConfig {
                requests_per_second: config.requests_per_second,
                burst_size: config.burst_size,
                inactive_threshold: config.inactive_threshold,
                inactive_threshold_minutes: config.inactive_threshold.as_secs_f64() / 60.0,
            },
        }
    }

    /// Spawn a tokio task sweeping idle buckets every cleanup interval.
    ///
    /// The task holds a clone of the limiter and runs until aborted or the
    /// runtime shuts down.
    pub fn start_cleanup_task(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        let period = self.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                limiter.cleanup();
            }
        })
    }

    // Bucket state is consistent between statements, so a panic elsewhere
    // while holding the lock leaves nothing half-written.
    fn write_store(&self) -> RwLockWriteGuard<'_, LimiterStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_store(&self) -> RwLockReadGuard<'_, LimiterStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }
}
