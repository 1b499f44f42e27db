use std::time::{Duration, Instant};

/// Per-client bucket state.
///
/// Tokens are whole admission credits. Refill grants `floor(elapsed * rate)`
/// tokens and always moves `last_update` forward, so fractional progress
/// between two calls is dropped rather than carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBucket {
    tokens: u32,
    last_update: Instant,
}

impl TokenBucket {
    /// A bucket holding `capacity` tokens, last updated at `now`.
    pub fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    /// Time since the last recomputation, zero if `now` is earlier.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_update)
    }

    pub fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        self.idle_for(now) > threshold
    }

    /// Token count this bucket would hold at `now`, without mutating it.
    pub fn tokens_at(&self, now: Instant, refill_rate: u32, capacity: u32) -> u32 {
        let elapsed = self.idle_for(now).as_secs_f64();
        // float to int casts saturate, so a huge elapsed time cannot wrap
        let grant = (elapsed * f64::from(refill_rate)).floor() as u64;
        let tokens = u64::from(self.tokens).saturating_add(grant);
        tokens.min(u64::from(capacity)) as u32
    }

    /// Recompute the token count at `now` and move `last_update` to `now`.
    pub fn refill(&mut self, now: Instant, refill_rate: u32, capacity: u32) {
        self.tokens = self.tokens_at(now, refill_rate, capacity);
        self.last_update = now;
    }

    /// Drop back to a full bucket, as if first seen at `now`.
    pub fn reset(&mut self, capacity: u32, now: Instant) {
        self.tokens = capacity;
        self.last_update = now;
    }

    /// Take one token if any is available.
    pub fn try_consume(&mut self) -> bool {
        match self.tokens.checked_sub(1) {
            Some(remaining) => {
                self.tokens = remaining;
                true
            }
            None => false,
        }
    }
}
