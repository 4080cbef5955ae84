//! Flags shared between the keyboard handler, the acquisition loop and the
//! recording coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cheap to clone; every clone observes the same two flags.
///
/// `is_recording` is written only by the keyboard handler and
/// `should_stop` only by shutdown paths.  Both loops read them every tick.
#[derive(Debug, Clone, Default)]
pub struct SharedRecordingState {
    recording: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl SharedRecordingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub fn set_recording(&self, on: bool) -> bool {
        self.recording.swap(on, Ordering::AcqRel)
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// The raw stop flag, for handlers (such as `ctrlc`) that need an
    /// `Arc<AtomicBool>`.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}
