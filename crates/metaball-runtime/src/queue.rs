//! Bounded hand-off between the acquisition and recording threads.
//!
//! The producer never blocks: when the queue is full the sample is dropped
//! and counted.  The consumer polls with a bounded wait so an empty queue
//! never busy-spins.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use metaball_types::{MetaballError, RecordingSample};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Both ends of the recording queue.  Clones share the same channel and drop
/// counter.
#[derive(Clone)]
pub struct SampleQueue {
    tx: Sender<RecordingSample>,
    rx: Receiver<RecordingSample>,
    dropped: Arc<AtomicU64>,
}

impl SampleQueue {
    /// A capacity of `0` is treated as `1`.
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue without blocking.
    ///
    /// # Errors
    ///
    /// [`MetaballError::QueueFull`] when the queue is at capacity; the
    /// sample is discarded and the drop counter incremented.
    pub fn try_push(&self, sample: RecordingSample) -> Result<(), MetaballError> {
        match self.tx.try_send(sample) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(MetaballError::QueueFull)
            }
        }
    }

    /// Wait up to `timeout` for a sample.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<RecordingSample> {
        match self.rx.recv_timeout(timeout) {
            Ok(sample) => Some(sample),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_pop(&self) -> Option<RecordingSample> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }

    /// Samples discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::bounded(DEFAULT_QUEUE_CAPACITY)
    }
}
