//! [`RecordingCoordinator`]: buffers queued samples while recording is on
//! and writes them out as one session when it is switched off.
//!
//! ```text
//!            is_recording              !is_recording, samples pending
//!   Idle ───────────────────▶ Recording ───────────────────────────▶ Draining
//!    ▲                            │                                      │
//!    │      !is_recording, none   │                                      │
//!    └────────────────────────────┘◀──────────── flushed ────────────────┘
//! ```
//!
//! `should_stop` flushes whatever is buffered, whatever the phase.
//!
//! Samples found in the queue while Idle with recording off belong to no
//! window (a push that raced the stop) and are discarded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use metaball_types::RecordingSample;
use tracing::{error, info, warn};

use crate::queue::SampleQueue;
use crate::state::SharedRecordingState;
use crate::storage;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Progress is logged every this many buffered samples.
const PROGRESS_EVERY: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderPhase {
    Idle,
    Recording,
    Draining,
}

pub struct RecordingCoordinator {
    queue: SampleQueue,
    state: SharedRecordingState,
    output_dir: PathBuf,
    poll_interval: Duration,
    phase: RecorderPhase,
    buffer: Vec<RecordingSample>,
    sessions: Vec<PathBuf>,
    discarded: u64,
}

impl RecordingCoordinator {
    pub fn new(queue: SampleQueue, state: SharedRecordingState, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue,
            state,
            output_dir: output_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            phase: RecorderPhase::Idle,
            buffer: Vec::new(),
            sessions: Vec::new(),
            discarded: 0,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn phase(&self) -> RecorderPhase {
        self.phase
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directories written so far, oldest first.
    pub fn sessions(&self) -> &[PathBuf] {
        &self.sessions
    }

    /// Stale samples thrown away while Idle.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Advance the state machine by one iteration.  Waits at most one poll
    /// interval.
    pub fn step(&mut self) -> RecorderPhase {
        self.phase = match self.phase {
            RecorderPhase::Idle => {
                if self.state.is_recording() {
                    self.buffer.clear();
                    info!(dir = %self.output_dir.display(), "recording started");
                    RecorderPhase::Recording
                } else {
                    self.discard_stale();
                    std::thread::sleep(self.poll_interval);
                    RecorderPhase::Idle
                }
            }
            RecorderPhase::Recording => {
                if !self.state.is_recording() {
                    if self.buffer.is_empty() && self.queue.is_empty() {
                        info!("recording stopped, nothing captured");
                        RecorderPhase::Idle
                    } else {
                        RecorderPhase::Draining
                    }
                } else {
                    if let Some(sample) = self.queue.pop_timeout(self.poll_interval) {
                        self.push(sample);
                    }
                    RecorderPhase::Recording
                }
            }
            RecorderPhase::Draining => {
                self.drain_queue();
                info!(samples = self.buffer.len(), "recording stopped");
                self.flush();
                RecorderPhase::Idle
            }
        };
        self.phase
    }

    /// Step until `should_stop`, then flush anything still buffered.
    pub fn run(&mut self) {
        info!(dir = %self.output_dir.display(), "recording coordinator running");
        while !self.state.should_stop() {
            self.step();
        }
        if self.phase != RecorderPhase::Idle {
            self.drain_queue();
        }
        if !self.buffer.is_empty() {
            info!(samples = self.buffer.len(), "saving buffered samples before exit");
            self.flush();
        }
        self.phase = RecorderPhase::Idle;
        info!(sessions = self.sessions.len(), "recording coordinator stopped");
    }

    fn push(&mut self, sample: RecordingSample) {
        self.buffer.push(sample);
        if self.buffer.len() % PROGRESS_EVERY == 0 {
            info!(samples = self.buffer.len(), "recording");
        }
    }

    fn discard_stale(&mut self) {
        let mut stale = 0u64;
        while self.queue.try_pop().is_some() {
            stale += 1;
        }
        if stale > 0 {
            self.discarded += stale;
            warn!(samples = stale, discarded = self.discarded, "discarded samples queued outside a recording");
        }
    }

    fn drain_queue(&mut self) {
        while let Some(sample) = self.queue.try_pop() {
            self.push(sample);
        }
    }

    /// Write and clear the buffer.  A failed write loses the batch.
    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        match storage::write_session(&self.output_dir, &self.buffer) {
            Ok(dir) => self.sessions.push(dir),
            Err(e) => error!(error = %e, samples = self.buffer.len(), "recording lost"),
        }
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample(i: usize) -> RecordingSample {
        RecordingSample {
            pose: [i as f64, 0.0, 0.0, 0.0, 0.0, 0.0],
            force: vec![0.0, 0.0, -(i as f64), 0.0, 0.0, 0.0],
            image: vec![0xFF, 0xD8, i as u8, 0xFF, 0xD9],
        }
    }

    fn coordinator(root: &Path) -> (RecordingCoordinator, SampleQueue, SharedRecordingState) {
        let queue = SampleQueue::bounded(16);
        let state = SharedRecordingState::new();
        let rc = RecordingCoordinator::new(queue.clone(), state.clone(), root)
            .with_poll_interval(Duration::from_millis(1));
        (rc, queue, state)
    }

    #[test]
    fn five_sample_session() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let (mut rc, queue, state) = coordinator(root.path());

        assert_eq!(rc.step(), RecorderPhase::Idle);
        state.set_recording(true);
        assert_eq!(rc.step(), RecorderPhase::Recording);

        for i in 0..5 {
            queue.try_push(sample(i))?;
        }
        for _ in 0..5 {
            rc.step();
        }
        assert_eq!(rc.buffered(), 5);

        state.set_recording(false);
        assert_eq!(rc.step(), RecorderPhase::Draining);
        assert_eq!(rc.step(), RecorderPhase::Idle);
        assert_eq!(rc.buffered(), 0);

        let dir = rc.sessions().first().ok_or("no session written")?;
        assert_eq!(fs::read_to_string(dir.join("pose.csv"))?.lines().count(), 5);
        assert_eq!(fs::read_to_string(dir.join("force.csv"))?.lines().count(), 5);
        assert_eq!(fs::read_dir(dir.join("images"))?.count(), 5);
        Ok(())
    }

    #[test]
    fn stale_sample_is_not_carried_into_next_session() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let (mut rc, queue, state) = coordinator(root.path());

        // A push that lands after the previous window was drained.
        queue.try_push(sample(99))?;
        assert_eq!(rc.step(), RecorderPhase::Idle);
        assert!(queue.is_empty());
        assert_eq!(rc.discarded(), 1);

        state.set_recording(true);
        assert_eq!(rc.step(), RecorderPhase::Recording);
        for i in 0..5 {
            queue.try_push(sample(i))?;
        }
        state.set_recording(false);
        assert_eq!(rc.step(), RecorderPhase::Draining);
        assert_eq!(rc.step(), RecorderPhase::Idle);

        let dir = rc.sessions().first().ok_or("no session written")?;
        let pose = fs::read_to_string(dir.join("pose.csv"))?;
        assert_eq!(pose.lines().count(), 5);
        assert!(pose.starts_with("0.000000,"));
        assert_eq!(fs::read_dir(dir.join("images"))?.count(), 5);
        Ok(())
    }

    #[test]
    fn samples_still_queued_at_stop_are_kept() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let (mut rc, queue, state) = coordinator(root.path());

        state.set_recording(true);
        rc.step();
        for i in 0..4 {
            queue.try_push(sample(i))?;
        }
        state.set_recording(false);

        assert_eq!(rc.step(), RecorderPhase::Draining);
        assert_eq!(rc.step(), RecorderPhase::Idle);
        let dir = &rc.sessions()[0];
        assert_eq!(fs::read_dir(dir.join("images"))?.count(), 4);
        Ok(())
    }

    #[test]
    fn empty_recording_returns_to_idle_without_writing() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let (mut rc, _queue, state) = coordinator(root.path());

        state.set_recording(true);
        rc.step();
        state.set_recording(false);
        assert_eq!(rc.step(), RecorderPhase::Idle);
        assert!(rc.sessions().is_empty());
        assert_eq!(fs::read_dir(root.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn two_windows_make_two_sessions() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let (mut rc, queue, state) = coordinator(root.path());

        for window in 0..2 {
            state.set_recording(true);
            rc.step();
            queue.try_push(sample(window))?;
            rc.step();
            state.set_recording(false);
            rc.step();
            rc.step();
        }
        assert_eq!(rc.sessions().len(), 2);
        assert_ne!(rc.sessions()[0], rc.sessions()[1]);
        Ok(())
    }

    #[test]
    fn stop_flushes_while_recording() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let (mut rc, queue, state) = coordinator(root.path());

        state.set_recording(true);
        rc.step();
        for i in 0..3 {
            queue.try_push(sample(i))?;
        }
        state.request_stop();
        rc.run();

        assert_eq!(rc.phase(), RecorderPhase::Idle);
        assert_eq!(rc.sessions().len(), 1);
        let pose = fs::read_to_string(rc.sessions()[0].join("pose.csv"))?;
        assert_eq!(pose.lines().count(), 3);
        Ok(())
    }

    #[test]
    fn run_on_its_own_thread() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let (mut rc, queue, state) = coordinator(root.path());
        let handle = std::thread::spawn(move || {
            rc.run();
            rc.sessions().len()
        });

        state.set_recording(true);
        std::thread::sleep(Duration::from_millis(20));
        for i in 0..10 {
            queue.try_push(sample(i))?;
        }
        std::thread::sleep(Duration::from_millis(50));
        state.set_recording(false);
        std::thread::sleep(Duration::from_millis(50));
        state.request_stop();

        assert_eq!(handle.join().map_err(|_| "recorder panicked")?, 1);
        Ok(())
    }

    #[test]
    fn persist_failure_drops_batch_and_continues() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let blocker = root.path().join("not_a_dir");
        fs::write(&blocker, b"x")?;
        let (mut rc, queue, state) = coordinator(&blocker);

        state.set_recording(true);
        rc.step();
        queue.try_push(sample(0))?;
        state.set_recording(false);
        rc.step();
        assert_eq!(rc.step(), RecorderPhase::Idle);
        assert!(rc.sessions().is_empty());
        assert_eq!(rc.buffered(), 0);
        Ok(())
    }
}
