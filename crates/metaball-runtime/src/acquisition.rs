//! [`AcquisitionLoop`] – one telemetry tick per camera frame.
//!
//! Each tick:
//!
//! 1. **Acquire** the raw marker pose and JPEG frame from the camera, and a
//!    wrench from the force sensor when one is attached (mapped into the
//!    global frame).
//! 2. **Condition** the pose: jump gate, optional sliding-window filter,
//!    then reference → axis remap → Euler.
//! 3. **Infer** force and node vectors when a model is attached.
//! 4. **Publish** the tick.
//! 5. **Record**: when recording is on, try to enqueue a sample; a full
//!    queue drops it.
//!
//! Per-tick failures are logged and absorbed: a missing frame reuses the
//! last pose and image, a failed wrench read reuses the last wrench.
//!
//! Teardown releases the camera, disconnects the force sensor and closes the
//! publisher, in that order, exactly once.  It runs when [`run`] returns and
//! again from `Drop`, so an unwinding panic still releases the devices.
//!
//! [`run`]: AcquisitionLoop::run

use std::time::{Duration, Instant};

use metaball_hal::{ForceSensor, PoseCamera};
use metaball_perception::{FrameTransform, JumpGate, PoseFilter, WrenchTransform, mean_pose};
use metaball_types::{MetaballError, Pose, RecordingSample, TelemetryMessage};
use tracing::{debug, info, warn};

use crate::inference::ForceModel;
use crate::queue::SampleQueue;
use crate::sink::TelemetrySink;
use crate::state::SharedRecordingState;

/// Width of the published pose vector.
pub const POSE_DIM: usize = 6;
/// Width of the published force vector when no model or sensor provides one.
pub const FORCE_DIM: usize = 6;
/// Ticks between throughput reports.
pub const REPORT_EVERY: u64 = 60;

/// Back-off after a tick that could not produce any pose at all.
const EMPTY_TICK_BACKOFF: Duration = Duration::from_millis(10);

// ─────────────────────────────────────────────────────────────────────────────
// Throughput
// ─────────────────────────────────────────────────────────────────────────────

/// Counts ticks and yields ticks-per-second every `every` ticks.
#[derive(Debug)]
pub struct ThroughputMeter {
    every: u64,
    count: u64,
    since: Instant,
}

impl ThroughputMeter {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            count: 0,
            since: Instant::now(),
        }
    }

    /// Record one tick; returns the rate when a report is due and resets.
    pub fn tick(&mut self) -> Option<f64> {
        self.count += 1;
        if self.count < self.every {
            return None;
        }
        let elapsed = self.since.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            f64::INFINITY
        };
        self.count = 0;
        self.since = Instant::now();
        Some(rate)
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(REPORT_EVERY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initial pose
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialPoseConfig {
    /// Frames read and discarded before sampling.
    pub warmup_frames: usize,
    /// Poses averaged into the initial pose.
    pub samples: usize,
    /// Upper bound on camera reads while sampling.
    pub max_attempts: usize,
}

impl Default for InitialPoseConfig {
    fn default() -> Self {
        Self {
            warmup_frames: 5,
            samples: 10,
            max_attempts: 50,
        }
    }
}

/// Average several camera poses into the reference pose.
///
/// # Errors
///
/// [`MetaballError::AcquisitionFailure`] when not a single pose could be
/// read within `max_attempts`.
pub fn capture_initial_pose(
    camera: &mut dyn PoseCamera,
    config: &InitialPoseConfig,
) -> Result<Pose, MetaballError> {
    for _ in 0..config.warmup_frames {
        if let Err(e) = camera.read_image_and_pose() {
            debug!(error = %e, "warm-up frame failed");
        }
    }

    let wanted = config.samples.max(1);
    let mut poses = Vec::with_capacity(wanted);
    let mut attempts = 0;
    while poses.len() < wanted && attempts < config.max_attempts.max(wanted) {
        attempts += 1;
        match camera.read_image_and_pose() {
            Ok((pose, _)) => poses.push(pose),
            Err(e) => debug!(error = %e, attempt = attempts, "initial pose sample failed"),
        }
    }

    let initial = mean_pose(&poses).ok_or_else(|| {
        MetaballError::acquisition(
            camera.id(),
            format!("no pose captured in {attempts} attempts"),
        )
    })?;
    info!(
        samples = poses.len(),
        attempts,
        x = initial.x,
        y = initial.y,
        z = initial.z,
        "initial pose captured"
    );
    Ok(initial)
}

// ─────────────────────────────────────────────────────────────────────────────
// AcquisitionLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Counters kept across ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub ticks: u64,
    pub camera_failures: u64,
    pub sensor_failures: u64,
    pub inference_failures: u64,
    pub publish_failures: u64,
    pub enqueued: u64,
    pub dropped: u64,
}

pub struct AcquisitionLoop {
    camera: Box<dyn PoseCamera>,
    sink: Box<dyn TelemetrySink>,
    transform: FrameTransform,
    queue: SampleQueue,
    state: SharedRecordingState,
    force_sensor: Option<(Box<dyn ForceSensor>, WrenchTransform)>,
    model: Option<Box<dyn ForceModel>>,
    filter: Option<PoseFilter>,
    gate: Option<JumpGate>,
    node_dim: usize,
    last_pose: Option<Pose>,
    last_image: Vec<u8>,
    last_wrench: [f64; 6],
    meter: ThroughputMeter,
    stats: AcquisitionStats,
    torn_down: bool,
}

impl AcquisitionLoop {
    pub fn new(
        camera: Box<dyn PoseCamera>,
        sink: Box<dyn TelemetrySink>,
        transform: FrameTransform,
        queue: SampleQueue,
        state: SharedRecordingState,
    ) -> Self {
        Self {
            camera,
            sink,
            transform,
            queue,
            state,
            force_sensor: None,
            model: None,
            filter: None,
            gate: None,
            node_dim: 0,
            last_pose: None,
            last_image: Vec::new(),
            last_wrench: [0.0; 6],
            meter: ThroughputMeter::default(),
            stats: AcquisitionStats::default(),
            torn_down: false,
        }
    }

    pub fn with_force_sensor(mut self, sensor: Box<dyn ForceSensor>, wrench: WrenchTransform) -> Self {
        self.force_sensor = Some((sensor, wrench));
        self
    }

    /// Attach a model; its input width must match the published pose.
    ///
    /// # Errors
    ///
    /// [`MetaballError::Configuration`] on a dimension mismatch.
    pub fn with_model(mut self, model: Box<dyn ForceModel>) -> Result<Self, MetaballError> {
        model.check_input_dim(POSE_DIM)?;
        self.node_dim = model.node_dim();
        self.model = Some(model);
        Ok(self)
    }

    pub fn with_filter(mut self, filter: PoseFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_jump_gate(mut self, gate: JumpGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Length of the zero node vector published when no model is attached.
    pub fn with_node_dim(mut self, node_dim: usize) -> Self {
        if self.model.is_none() {
            self.node_dim = node_dim;
        }
        self
    }

    pub fn with_report_every(mut self, every: u64) -> Self {
        self.meter = ThroughputMeter::new(every);
        self
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Only when the camera fails before any pose was ever acquired; every
    /// other failure is absorbed.
    pub fn tick(&mut self) -> Result<(), MetaballError> {
        let raw = self.acquire_pose()?;

        let gated = match self.gate.as_mut() {
            Some(gate) => gate.admit(raw),
            None => raw,
        };
        let filtered = match self.filter.as_mut() {
            Some(filter) => filter.push(gated),
            None => gated,
        };
        let euler = self.transform.apply(filtered);
        let pose_out = euler.to_f32_vec();

        let wrench = self.acquire_wrench();
        let (force, node) = self.infer(&pose_out, wrench);

        let force_out = force.iter().map(|v| *v as f32).collect();
        let msg = TelemetryMessage::now(self.last_image.clone(), pose_out, force_out, node);
        if let Err(e) = self.sink.publish(&msg) {
            self.stats.publish_failures += 1;
            warn!(error = %e, "publish failed");
        }

        if self.state.is_recording() {
            self.enqueue(euler.to_array(), force, msg.image);
        }

        self.stats.ticks += 1;
        if let Some(fps) = self.meter.tick() {
            info!(fps = %format!("{fps:.2}"), dropped = self.stats.dropped, "acquisition throughput");
        }
        Ok(())
    }

    /// Tick until `should_stop`, then tear down.
    pub fn run(mut self) -> AcquisitionStats {
        info!(camera = self.camera.id(), "acquisition loop running");
        while !self.state.should_stop() {
            if let Err(e) = self.tick() {
                warn!(error = %e, "no pose available yet");
                std::thread::sleep(EMPTY_TICK_BACKOFF);
            }
        }
        self.teardown();
        self.stats
    }

    /// Release the camera, disconnect the force sensor, close the sink.
    /// Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.camera.release();
        if let Some((sensor, _)) = self.force_sensor.as_mut() {
            sensor.disconnect();
        }
        self.sink.close();
        info!(
            ticks = self.stats.ticks,
            dropped = self.stats.dropped,
            camera_failures = self.stats.camera_failures,
            "acquisition stopped"
        );
    }

    fn acquire_pose(&mut self) -> Result<Pose, MetaballError> {
        match self.camera.read_image_and_pose() {
            Ok((pose, frame)) => {
                self.last_pose = Some(pose);
                self.last_image = frame.jpeg;
                Ok(pose)
            }
            Err(e) => {
                self.stats.camera_failures += 1;
                match self.last_pose {
                    Some(pose) => {
                        debug!(error = %e, "camera read failed, reusing last pose");
                        Ok(pose)
                    }
                    None => Err(e),
                }
            }
        }
    }

    fn acquire_wrench(&mut self) -> Option<[f64; 6]> {
        let (sensor, wrench) = self.force_sensor.as_mut()?;
        match sensor.read_wrench() {
            Ok(raw) => self.last_wrench = wrench.to_global(raw),
            Err(e) => {
                self.stats.sensor_failures += 1;
                debug!(error = %e, "force read failed, reusing last wrench");
            }
        }
        Some(self.last_wrench)
    }

    /// Sensor force wins over model force; node always comes from the model.
    /// Force stays `f64` so recorded samples keep the sensor's precision.
    fn infer(&mut self, pose: &[f32], wrench: Option<[f64; 6]>) -> (Vec<f64>, Vec<f32>) {
        let mut force = wrench.map(|w| w.to_vec());
        let mut node = None;

        if let Some(model) = self.model.as_mut() {
            match model.predict(pose) {
                Ok(out) => {
                    force.get_or_insert_with(|| out.force.iter().map(|v| f64::from(*v)).collect());
                    node = Some(out.node);
                }
                Err(e) => {
                    self.stats.inference_failures += 1;
                    warn!(model = model.name(), error = %e, "inference failed");
                }
            }
        }

        let force_dim = self
            .model
            .as_ref()
            .map(|m| m.force_dim())
            .unwrap_or(FORCE_DIM);
        (
            force.unwrap_or_else(|| vec![0.0; force_dim]),
            node.unwrap_or_else(|| vec![0.0; self.node_dim]),
        )
    }

    fn enqueue(&mut self, pose: [f64; 6], force: Vec<f64>, image: Vec<u8>) {
        let sample = RecordingSample { pose, force, image };
        match self.queue.try_push(sample) {
            Ok(()) => self.stats.enqueued += 1,
            Err(e) => {
                self.stats.dropped += 1;
                warn!(error = %e, dropped = self.queue.dropped(), "recording sample dropped");
            }
        }
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
