//! Actor-based concurrency decorator

use super::{Bucket, SharedBucket};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot, watch};

// Requests sent while the loop is not running queue up to this depth
// before senders park; a small buffer keeps that misuse window narrow.
const CHANNEL_CAPACITY: usize = 16;

struct InputMessage {
    reply: oneshot::Sender<bool>,
}

/// Decorates a [`Bucket`] with a message-processing loop.
///
/// A single loop owns the wrapped bucket and drains three channels through
/// one select point: input requests (answered over a oneshot reply
/// channel), leak signals (no reply), and a quit signal. Because only the
/// loop ever touches the counter, concurrent callers cannot race on it.
///
/// # Lifecycle
///
/// The decorator starts out stopped. [`start`](ChannelBucket::start) runs
/// the loop until [`stop`](ChannelBucket::stop) is signalled; spawn it on
/// its own task. Calls made while the loop is not running make no
/// progress: once the request buffer fills, the caller is parked
/// indefinitely. There is no timeout and no error; callers must guarantee
/// that `start` precedes the first `input`/`leak` call and that `stop`
/// follows the last one.
pub struct ChannelBucket<B> {
    input_tx: mpsc::Sender<InputMessage>,
    leak_tx: mpsc::Sender<()>,
    quit_tx: watch::Sender<()>,
    state: Mutex<Option<LoopState<B>>>,
}

/// Everything the processing loop owns while it runs. Parked inside the
/// decorator whenever the loop is not running, which is what makes a
/// repeated `start`/`stop` cycle possible.
struct LoopState<B> {
    bucket: B,
    input_rx: mpsc::Receiver<InputMessage>,
    leak_rx: mpsc::Receiver<()>,
    quit_rx: watch::Receiver<()>,
}

impl<B: Bucket> ChannelBucket<B> {
    /// Wraps `bucket` in a new, not-yet-started decorator.
    pub fn new(bucket: B) -> Self {
        let (input_tx, input_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (leak_tx, leak_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (quit_tx, quit_rx) = watch::channel(());

        ChannelBucket {
            input_tx,
            leak_tx,
            quit_tx,
            state: Mutex::new(Some(LoopState {
                bucket,
                input_rx,
                leak_rx,
                quit_rx,
            })),
        }
    }

    /// Runs the processing loop until [`stop`](ChannelBucket::stop).
    ///
    /// Suspends the calling task for the lifetime of the loop, so spawn it.
    /// Returns immediately if the loop is already running elsewhere. On
    /// exit the loop parks its state back into the decorator, so a fresh
    /// `start`/`stop` cycle is possible.
    pub async fn start(&self) {
        let taken = self.state.lock().expect("bucket state poisoned").take();
        let Some(mut state) = taken else {
            return;
        };

        loop {
            tokio::select! {
                Some(msg) = state.input_rx.recv() => {
                    // a caller that went away is not our problem
                    let _ = msg.reply.send(state.bucket.input());
                }
                Some(()) = state.leak_rx.recv() => state.bucket.leak(),
                _ = state.quit_rx.changed() => break,
            }
        }

        tracing::debug!("channel bucket loop stopped");
        *self.state.lock().expect("bucket state poisoned") = Some(state);
    }

    /// Signals the processing loop to exit.
    ///
    /// Not safe to call concurrently with itself. A `stop` issued while
    /// the loop is not running makes the next `start` return immediately.
    pub fn stop(&self) {
        let _ = self.quit_tx.send(());
    }
}

#[async_trait]
impl<B: Bucket> SharedBucket for ChannelBucket<B> {
    async fn input(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();

        if self
            .input_tx
            .send(InputMessage { reply: reply_tx })
            .await
            .is_err()
        {
            // the loop's receiver only disappears when the decorator
            // itself is being torn down
            return false;
        }

        reply_rx.await.unwrap_or(false)
    }

    async fn leak(&self) {
        let _ = self.leak_tx.send(()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::LeakyBucket;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

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

    fn recording(accept: bool) -> (RecordingBucket, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let inputs = Arc::new(AtomicUsize::new(0));
        let leaks = Arc::new(AtomicUsize::new(0));
        let bucket = RecordingBucket {
            accept,
            inputs: Arc::clone(&inputs),
            leaks: Arc::clone(&leaks),
        };
        (bucket, inputs, leaks)
    }

    fn spawn_loop<B: Bucket + 'static>(
        bucket: &Arc<ChannelBucket<B>>,
    ) -> tokio::task::JoinHandle<()> {
        let bucket = Arc::clone(bucket);
        tokio::spawn(async move { bucket.start().await })
    }

    #[tokio::test]
    async fn input_delegates_to_the_wrapped_bucket() {
        let (inner, inputs, _) = recording(true);
        let bucket = Arc::new(ChannelBucket::new(inner));
        let processing = spawn_loop(&bucket);

        assert!(bucket.input().await);
        assert_eq!(inputs.load(Ordering::SeqCst), 1);

        bucket.stop();
        processing.await.unwrap();
    }

    #[tokio::test]
    async fn input_reports_an_overflowing_bucket() {
        let (inner, _, _) = recording(false);
        let bucket = Arc::new(ChannelBucket::new(inner));
        let processing = spawn_loop(&bucket);

        assert!(!bucket.input().await);

        bucket.stop();
        processing.await.unwrap();
    }

    #[tokio::test]
    async fn leak_is_processed_by_the_loop() {
        let (inner, _, leaks) = recording(true);
        let bucket = Arc::new(ChannelBucket::new(inner));
        let processing = spawn_loop(&bucket);

        bucket.leak().await;
        // leak carries no reply; give the loop a chance to drain it
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(leaks.load(Ordering::SeqCst), 1);

        bucket.stop();
        processing.await.unwrap();
    }

    #[tokio::test]
    async fn stop_terminates_the_loop() {
        let bucket = Arc::new(ChannelBucket::new(LeakyBucket::new(1)));
        let processing = spawn_loop(&bucket);

        assert!(bucket.input().await);
        bucket.stop();

        tokio::time::timeout(Duration::from_secs(1), processing)
            .await
            .expect("loop did not exit after stop")
            .unwrap();
    }

    #[tokio::test]
    async fn start_stop_cycle_can_be_repeated() {
        let bucket = Arc::new(ChannelBucket::new(LeakyBucket::new(1)));

        let first = spawn_loop(&bucket);
        assert!(bucket.input().await);
        bucket.stop();
        first.await.unwrap();

        // the level survives across cycles: the bucket is still full
        let second = spawn_loop(&bucket);
        assert!(!bucket.input().await);

        bucket.leak().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(bucket.input().await);

        bucket.stop();
        second.await.unwrap();
    }
}
