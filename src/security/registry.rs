//! Per-client bucket registry with periodic idle eviction.
//!
//! # Responsibilities
//! - Hand out exactly one `TokenBucket` per client key
//! - Create buckets lazily on first sight of a key
//! - Sweep buckets idle for longer than the cleanup interval
//!
//! # Design Decisions
//! - `DashMap` shards the key space; lookups take a shard read lock, inserts and
//!   the sweep take shard write locks. Bucket state has its own lock.
//! - Callers hold an `Arc<TokenBucket>`. A sweep that removes a key does not
//!   invalidate buckets already handed out; the next lookup starts a fresh one.

use std::sync::Arc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::rate_limit::{BucketParams, LimiterError, TokenBucket};

/// Registry of token buckets keyed by client identity.
#[derive(Debug)]
pub struct KeyedLimiterRegistry {
    buckets: DashMap<String, Arc<TokenBucket>>,
    params: BucketParams,
    cleanup_interval: Duration,
}

impl KeyedLimiterRegistry {
    /// Create an empty registry. Fails if `rate` or `burst` is not positive.
    pub fn new(rate: f64, burst: u32, cleanup_interval: Duration) -> Result<Self, LimiterError> {
        Ok(Self {
            buckets: DashMap::new(),
            params: BucketParams::new(rate, burst)?,
            cleanup_interval,
        })
    }

    /// Build a registry from the rate limit section of the config.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, LimiterError> {
        Self::new(
            config.requests_per_second,
            config.burst_size,
            Duration::from_secs(config.cleanup_interval_secs),
        )
    }

    /// Return the bucket for `key`, creating a full one if the key is unknown.
    pub fn get_or_create(&self, key: &str) -> Arc<TokenBucket> {
        self.get_or_create_at(key, Instant::now())
    }

    /// Same as [`get_or_create`](Self::get_or_create) with an explicit creation time.
    pub fn get_or_create_at(&self, key: &str, now: Instant) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }

        // The entry API holds the shard write lock, so a racing creator is observed here.
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!(client = %key, "Creating token bucket");
                Arc::new(TokenBucket::with_params(self.params, now))
            })
            .clone();

        metrics::record_tracked_clients(self.buckets.len());
        bucket
    }

    /// Remove every bucket idle for longer than the cleanup interval. Returns the number removed.
    pub fn evict(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        let threshold = self.cleanup_interval;
        self.buckets
            .retain(|_, bucket| !bucket.idle_longer_than(threshold, now));

        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.buckets.len(), "Evicted idle token buckets");
            metrics::record_evictions(removed);
        }
        metrics::record_tracked_clients(self.buckets.len());
        removed
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// True when `key` currently has a bucket.
    pub fn contains(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// Shared bucket parameters.
    pub fn params(&self) -> BucketParams {
        self.params
    }

    /// Sweep interval, also used as the idle threshold.
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Run the eviction sweep every cleanup interval until shutdown is signalled.
    pub async fn run_eviction(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if self.cleanup_interval.is_zero() {
            tracing::warn!("Cleanup interval is zero, limiter eviction disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.cleanup_interval.as_secs(),
            "Limiter eviction task starting"
        );

        let start = Instant::now() + self.cleanup_interval;
        let mut ticker = time::interval_at(start, self.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evict(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Limiter eviction task received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Spawn [`run_eviction`](Self::run_eviction) on the current runtime.
    pub fn spawn_eviction(self: &Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run_eviction(shutdown))
    }
}
