//! Bucket primitives for the leaky bucket algorithm
//!
//! This module contains the building blocks the middleware is assembled
//! from:
//!
//! - [`LeakyBucket`]: the bounded counter at the heart of the algorithm
//! - [`MutexBucket`]: lock-based decorator for concurrent access
//! - [`ChannelBucket`]: actor-based decorator for concurrent access
//!
//! The counter itself is single-threaded; the decorators are the only way
//! concurrent tasks may reach it.

pub mod channel;
pub mod leaky;
pub mod mutex;

pub use channel::ChannelBucket;
pub use leaky::LeakyBucket;
pub use mutex::MutexBucket;

use async_trait::async_trait;

/// Basic operations of the leaky bucket algorithm.
///
/// Implementations are not required to be safe for concurrent invocation;
/// callers must serialize access. That responsibility belongs to the
/// [`SharedBucket`] decorators.
pub trait Bucket: Send {
    /// "Fills" the bucket with one unit.
    ///
    /// Returns `true` if the bucket can accept the unit, `false` if it is
    /// overflowing. A rejected call leaves the state unchanged.
    fn input(&mut self) -> bool;

    /// Lowers the "water level" inside the bucket by one unit.
    ///
    /// Leaking an empty bucket is a no-op; the level never goes negative.
    fn leak(&mut self);
}

/// A bucket that multiple tasks can use concurrently.
///
/// Both decorators linearize every mutation of the wrapped [`Bucket`]:
/// [`MutexBucket`] through a lock, [`ChannelBucket`] through a single
/// processing loop. No two `input`/`leak` calls ever race on the counter.
#[async_trait]
pub trait SharedBucket: Send + Sync {
    /// Fills the bucket with one unit. See [`Bucket::input`].
    async fn input(&self) -> bool;

    /// Lowers the water level by one unit. See [`Bucket::leak`].
    async fn leak(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Hammers a capacity-1 bucket from several tasks at once. If two tasks
    // ever hold the single unit simultaneously, the counter observed at
    // admission is non-zero and the test fails.
    async fn assert_never_double_admits(bucket: Arc<dyn SharedBucket>) {
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let bucket = Arc::clone(&bucket);
            let in_flight = Arc::clone(&in_flight);
            tasks.push(tokio::spawn(async move {
                for _ in 0..200 {
                    if bucket.input().await {
                        let holders = in_flight.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(holders, 0, "two tasks admitted at once");
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        bucket.leak().await;
                    }
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mutex_bucket_never_double_admits() {
        let bucket = Arc::new(MutexBucket::new(LeakyBucket::new(1)));
        assert_never_double_admits(bucket).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn channel_bucket_never_double_admits() {
        let bucket = Arc::new(ChannelBucket::new(LeakyBucket::new(1)));
        let processing = tokio::spawn({
            let bucket = Arc::clone(&bucket);
            async move { bucket.start().await }
        });

        assert_never_double_admits(Arc::clone(&bucket) as Arc<dyn SharedBucket>).await;

        bucket.stop();
        processing.await.unwrap();
    }
}
