use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interval between idle-bucket sweeps when none is configured
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Idle time after which a bucket is evicted or reset when none is configured
pub const DEFAULT_INACTIVE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Token bucket parameters shared by every client of one limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Tokens granted per elapsed second. Zero denies every request.
    pub requests_per_second: u32,
    /// Maximum tokens a bucket holds, also the grant for a new client.
    pub burst_size: u32,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub inactive_threshold: Duration,
}

impl LimiterConfig {
    /// Build a config; zero durations fall back to the defaults.
    pub fn new(
        requests_per_second: u32,
        burst_size: u32,
        cleanup_interval: Duration,
        inactive_threshold: Duration,
    ) -> Self {
        Self {
            requests_per_second,
            burst_size,
            cleanup_interval,
            inactive_threshold,
        }
        .with_default_durations()
    }

    /// Config with default cleanup interval and inactive threshold.
    pub fn with_rate(requests_per_second: u32, burst_size: u32) -> Self {
        Self::new(requests_per_second, burst_size, Duration::ZERO, Duration::ZERO)
    }

    /// Limits guarding the operational `/debug/` routes.
    pub fn debug_default() -> Self {
        Self::with_rate(100, 200)
    }

    pub(crate) fn with_default_durations(mut self) -> Self {
        if self.cleanup_interval.is_zero() {
            self.cleanup_interval = DEFAULT_CLEANUP_INTERVAL;
        }
        if self.inactive_threshold.is_zero() {
            self.inactive_threshold = DEFAULT_INACTIVE_THRESHOLD;
        }
        self
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::with_rate(20, 20)
    }
}
