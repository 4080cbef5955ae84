//! `metaball-runtime` – the acquisition / recording engine.
//!
//! Two OS threads cooperate through a bounded queue and two shared flags:
//!
//! - [`acquisition`] – [`AcquisitionLoop`][acquisition::AcquisitionLoop]:
//!   camera → pose conditioning → inference → publish, and an optional
//!   non-blocking enqueue of each tick while recording.  Also hosts
//!   [`capture_initial_pose`][acquisition::capture_initial_pose].
//! - [`recording`] – [`RecordingCoordinator`][recording::RecordingCoordinator]:
//!   the Idle / Recording / Draining state machine that buffers queued
//!   samples and hands each finished window to [`storage`].
//! - [`queue`] – [`SampleQueue`][queue::SampleQueue]: bounded crossbeam
//!   channel with drop-on-full accounting.
//! - [`state`] – [`SharedRecordingState`][state::SharedRecordingState]:
//!   the `is_recording` / `should_stop` flags.
//! - [`inference`] – [`ForceModel`][inference::ForceModel] and the JSON
//!   loaded [`LinearForceModel`][inference::LinearForceModel].
//! - [`sink`] – [`TelemetrySink`][sink::TelemetrySink], the publishing seam.
//! - [`worker`] / [`pipeline`] – named threads joined with a deadline.
//! - [`logging`] – [`init_tracing`][logging::init_tracing]: `tracing`
//!   subscriber with optional OTLP export.

pub mod acquisition;
pub mod inference;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod recording;
pub mod sink;
pub mod state;
pub mod storage;
pub mod worker;

pub use acquisition::{AcquisitionLoop, AcquisitionStats, InitialPoseConfig, capture_initial_pose};
pub use inference::{ForceModel, LinearForceModel, ModelOutput};
pub use logging::{TracingGuard, init_tracing};
pub use pipeline::{Pipeline, PipelineReport};
pub use queue::SampleQueue;
pub use recording::{RecorderPhase, RecordingCoordinator};
pub use sink::TelemetrySink;
pub use state::SharedRecordingState;
pub use worker::{WorkerExit, spawn_worker};
