//! Lock-based concurrency decorator

use super::{Bucket, SharedBucket};
use async_trait::async_trait;
use std::sync::Mutex;

/// Decorates a [`Bucket`] with a mutex so multiple tasks can share it.
///
/// The calling task executes the bucket logic directly under the lock,
/// which is held only for the duration of the inner call and never across
/// an await point or any I/O. This is the lower-overhead strategy and the
/// default used by the middleware.
#[derive(Debug)]
pub struct MutexBucket<B> {
    inner: Mutex<B>,
}

impl<B: Bucket> MutexBucket<B> {
    /// Wraps `bucket` in a new lock.
    pub fn new(bucket: B) -> Self {
        MutexBucket {
            inner: Mutex::new(bucket),
        }
    }
}

#[async_trait]
impl<B: Bucket> SharedBucket for MutexBucket<B> {
    async fn input(&self) -> bool {
        self.inner.lock().expect("bucket mutex poisoned").input()
    }

    async fn leak(&self) {
        self.inner.lock().expect("bucket mutex poisoned").leak();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingBucket {
        accept: bool,
        inputs: Arc<AtomicUsize>,
        leaks: Arc<AtomicUsize>,
    }

    impl Bucket for RecordingBucket {
        fn input(&mut self) -> bool {
            self.inputs.fetch_add(1, Ordering::SeqCst);
            self.accept
        }

        fn leak(&mut self) {
            self.leaks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn input_delegates_to_the_wrapped_bucket() {
        let inputs = Arc::new(AtomicUsize::new(0));
        let bucket = MutexBucket::new(RecordingBucket {
            accept: true,
            inputs: Arc::clone(&inputs),
            leaks: Arc::new(AtomicUsize::new(0)),
        });

        assert!(bucket.input().await);
        assert_eq!(inputs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn input_reports_an_overflowing_bucket() {
        let bucket = MutexBucket::new(RecordingBucket {
            accept: false,
            inputs: Arc::new(AtomicUsize::new(0)),
            leaks: Arc::new(AtomicUsize::new(0)),
        });

        assert!(!bucket.input().await);
    }

    #[tokio::test]
    async fn leak_delegates_to_the_wrapped_bucket() {
        let leaks = Arc::new(AtomicUsize::new(0));
        let bucket = MutexBucket::new(RecordingBucket {
            accept: true,
            inputs: Arc::new(AtomicUsize::new(0)),
            leaks: Arc::clone(&leaks),
        });

        bucket.leak().await;
        assert_eq!(leaks.load(Ordering::SeqCst), 1);
    }
}
