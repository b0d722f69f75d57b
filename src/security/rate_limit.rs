//! Single-client token bucket.
//!
//! # Design Decisions
//! - Token accounting is integral: each consult refills `floor(rate * elapsed)`
//!   whole tokens and resets the refill clock, so fractional progress between
//!   consults is dropped. Clients polling faster than `1 / rate` therefore never
//!   refill until they back off.
//! - Each bucket owns its own mutex; buckets for different clients never contend.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::{Duration, Instant};

/// Error type for limiter construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LimiterError {
    /// Rate or burst is not strictly positive.
    #[error("invalid limiter parameters: rate={rate}, burst={burst} (both must be positive)")]
    InvalidParameter { rate: f64, burst: u32 },
}

/// Validated `(rate, burst)` pair shared by every bucket of a registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketParams {
    rate: f64,
    burst: u32,
}

impl BucketParams {
    /// Validate limiter parameters. NaN and infinite rates are rejected too.
    pub fn new(rate: f64, burst: u32) -> Result<Self, LimiterError> {
        if !(rate > 0.0 && rate.is_finite()) || burst == 0 {
            return Err(LimiterError::InvalidParameter { rate, burst });
        }
        Ok(Self { rate, burst })
    }

    /// Tokens added per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// A token bucket guarding one client key.
#[derive(Debug)]
pub struct TokenBucket {
    params: BucketParams,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(rate: f64, burst: u32) -> Result<Self, LimiterError> {
        Ok(Self::with_params(BucketParams::new(rate, burst)?, Instant::now()))
    }

    /// Create a full bucket from pre-validated parameters, refill clock starting at `now`.
    pub fn with_params(params: BucketParams, now: Instant) -> Self {
        Self {
            params,
            state: Mutex::new(BucketState {
                tokens: params.burst,
                last_refill: now,
            }),
        }
    }

    /// Consult the bucket at the current time.
    pub fn consult(&self) -> bool {
        self.consult_at(Instant::now())
    }

    /// Refill for the time elapsed since the last consult, then try to take one token.
    ///
    /// A `now` earlier than the last refill counts as zero elapsed time.
    pub fn consult_at(&self, now: Instant) -> bool {
        let mut state = self.lock();

        let elapsed = now.saturating_duration_since(state.last_refill);
        state.last_refill = now;

        let refill = (self.params.rate * elapsed.as_secs_f64()).floor() as u64;
        let capacity = u64::from(self.params.burst);
        state.tokens = u64::from(state.tokens).saturating_add(refill).min(capacity) as u32;

        if state.tokens > 0 {
            state.tokens -= 1;
            tracing::trace!(remaining = state.tokens, "Token consumed");
            true
        } else {
            tracing::trace!("Bucket empty");
            false
        }
    }

    /// Tokens currently held (as of the last consult).
    pub fn available_tokens(&self) -> u32 {
        self.lock().tokens
    }

    /// Maximum tokens this bucket can hold.
    pub fn capacity(&self) -> u32 {
        self.params.burst
    }

    /// Time of the last consult (or creation).
    pub fn last_refill(&self) -> Instant {
        self.lock().last_refill
    }

    /// True when the bucket has not been consulted for longer than `threshold` at `now`.
    pub fn idle_longer_than(&self, threshold: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_refill()) > threshold
    }

    // Every mutation leaves the state consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
