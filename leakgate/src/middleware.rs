//! The rate limiter middleware
//!
//! [`RateLimiter`] owns one decorated bucket, makes the admission decision
//! for every request, and runs the periodic leak scheduler that restores
//! capacity. The tower wiring lives in [`crate::layer`]; this module is
//! framework-free apart from the tokio runtime.

use crate::bucket::{ChannelBucket, LeakyBucket, MutexBucket, SharedBucket};
use rand::Rng;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Errors produced when validating a [`RateLimiterConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The requests-per-second rate was zero.
    ///
    /// The rate divides one second into leak ticks, so it must be
    /// positive.
    ZeroRate,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroRate => write!(f, "requests per second must be positive"),
        }
    }
}

impl Error for ConfigError {}

/// Configuration for the [`RateLimiter`] middleware.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    requests_per_second: u32,
    retry_delay: u64,
    jitter: u64,
}

impl RateLimiterConfig {
    /// Creates a configuration letting `requests_per_second` requests
    /// through per second.
    ///
    /// The rate doubles as the bucket capacity and as the leak tick rate
    /// (one unit drains every `1/requests_per_second` seconds). Rejected
    /// requests are asked to retry after 1 second plus a random spread of
    /// up to 5 seconds; see
    /// [`set_retry_delay`](RateLimiterConfig::set_retry_delay).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroRate`] if `requests_per_second` is zero.
    pub fn new(requests_per_second: u32) -> Result<Self, ConfigError> {
        if requests_per_second == 0 {
            return Err(ConfigError::ZeroRate);
        }

        Ok(RateLimiterConfig {
            requests_per_second,
            retry_delay: 1,
            jitter: 5,
        })
    }

    /// Sets the delay values sent with rejected requests.
    ///
    /// `retry_delay` is the minimum `Retry-After` value in seconds;
    /// `jitter` adds a random extra between 0 and `jitter` seconds,
    /// recomputed per rejection, so that clients backing off from a spike
    /// do not all come back at once. Reconfigure before the middleware
    /// starts serving traffic.
    pub fn set_retry_delay(&mut self, retry_delay: u64, jitter: u64) {
        self.retry_delay = retry_delay;
        self.jitter = jitter;
    }

    pub(crate) fn delay(&self) -> u64 {
        if self.jitter == 0 {
            return self.retry_delay;
        }

        self.retry_delay + rand::rng().random_range(0..self.jitter)
    }

    fn tick(&self) -> Duration {
        Duration::from_secs(1) / self.requests_per_second
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request fits in the bucket; forward it downstream.
    Allowed,
    /// The bucket is overflowing; reject with the given `Retry-After`
    /// value in seconds.
    Rejected {
        /// Seconds the client should wait before retrying.
        retry_after: u64,
    },
}

/// One bucket, behind the concurrency strategy picked at construction.
enum StrategyBucket {
    Mutex(MutexBucket<LeakyBucket>),
    Channel(Arc<ChannelBucket<LeakyBucket>>),
}

impl StrategyBucket {
    async fn input(&self) -> bool {
        match self {
            StrategyBucket::Mutex(bucket) => bucket.input().await,
            StrategyBucket::Channel(bucket) => bucket.input().await,
        }
    }

    async fn leak(&self) {
        match self {
            StrategyBucket::Mutex(bucket) => bucket.leak().await,
            StrategyBucket::Channel(bucket) => bucket.leak().await,
        }
    }
}

/// The rate limiter middleware.
///
/// Owns exactly one bucket whose capacity equals the configured rate.
/// Admission decisions go through [`admit`](RateLimiter::admit) (or the
/// tower layer built on top of it), while a background scheduler started
/// with [`start`](RateLimiter::start) leaks the bucket at the configured
/// rate. Make sure `start` runs before the first request arrives and that
/// [`stop`](RateLimiter::stop) is called once the server has stopped;
/// after `stop` the instance is no longer usable.
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: StrategyBucket,
    quit_tx: watch::Sender<()>,
    quit_rx: watch::Receiver<()>,
}

impl RateLimiter {
    /// Creates a rate limiter with the default strategy.
    ///
    /// This is an alias of [`new_mutex`](RateLimiter::new_mutex): the
    /// mutex strategy outperforms the channel one under contention.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::new_mutex(config)
    }

    /// Creates a rate limiter whose bucket is shared through a mutex.
    pub fn new_mutex(config: RateLimiterConfig) -> Self {
        let bucket = StrategyBucket::Mutex(MutexBucket::new(LeakyBucket::new(
            config.requests_per_second,
        )));
        Self::with_bucket(config, bucket)
    }

    /// Creates a rate limiter whose bucket is shared through a
    /// message-processing loop.
    pub fn new_channel(config: RateLimiterConfig) -> Self {
        let bucket = StrategyBucket::Channel(Arc::new(ChannelBucket::new(LeakyBucket::new(
            config.requests_per_second,
        ))));
        Self::with_bucket(config, bucket)
    }

    fn with_bucket(config: RateLimiterConfig, bucket: StrategyBucket) -> Self {
        let (quit_tx, quit_rx) = watch::channel(());
        RateLimiter {
            config,
            bucket,
            quit_tx,
            quit_rx,
        }
    }

    /// Decides whether one unit of work may pass.
    ///
    /// Fills the bucket by one unit on success. On rejection the returned
    /// `retry_after` is freshly jittered.
    pub async fn admit(&self) -> Admission {
        if self.bucket.input().await {
            Admission::Allowed
        } else {
            Admission::Rejected {
                retry_after: self.config.delay(),
            }
        }
    }

    /// Runs the "leak" logic until [`stop`](RateLimiter::stop).
    ///
    /// For a channel-backed bucket this first spawns the bucket's
    /// processing loop on its own task. It then drains the bucket by one
    /// unit every `1/requests_per_second` seconds. The call suspends the
    /// calling task for the lifetime of the scheduler: spawn it, keep the
    /// handle, and join it after `stop`. Must be running before any
    /// traffic reaches the middleware, since capacity never drains
    /// otherwise.
    pub async fn start(&self) {
        if let StrategyBucket::Channel(bucket) = &self.bucket {
            let bucket = Arc::clone(bucket);
            tokio::spawn(async move { bucket.start().await });
        }

        let mut quit_rx = self.quit_rx.clone();
        let mut ticks = tokio::time::interval(self.config.tick());
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the initial tick completes immediately; consume it so draining
        // starts one full period in
        ticks.tick().await;

        tracing::debug!(
            rate = self.config.requests_per_second,
            "leak scheduler running"
        );

        loop {
            tokio::select! {
                _ = ticks.tick() => self.bucket.leak().await,
                _ = quit_rx.changed() => {
                    tracing::debug!("leak scheduler stopped");
                    return;
                }
            }
        }
    }

    /// Stops the scheduler and, for a channel-backed bucket, its
    /// processing loop.
    ///
    /// Call this after the http server has stopped. The middleware is not
    /// usable afterwards; construct a fresh instance instead of reusing a
    /// stopped one. Not safe to call concurrently with itself.
    pub fn stop(&self) {
        let _ = self.quit_tx.send(());
        if let StrategyBucket::Channel(bucket) = &self.bucket {
            bucket.stop();
        }
    }
}
