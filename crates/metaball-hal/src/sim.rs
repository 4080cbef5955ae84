//! Simulated collaborators for running the pipeline without hardware.
//!
//! [`SimCamera`] follows a smooth, deterministic trajectory around a resting
//! marker pose and paces itself to a configured frame rate.
//! [`SimForceSensor`] reports a wrench that oscillates with the same period.
//!
//! # Example
//!
//! ```rust
//! use metaball_hal::camera::PoseCamera;
//! use metaball_hal::sim::SimCamera;
//!
//! let mut camera = SimCamera::new("sim").with_fps(0.0);
//! let (pose, frame) = camera.read_image_and_pose().unwrap();
//! assert!(pose.z > 0.0);
//! assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);
//! ```

use std::time::{Duration, Instant};

use metaball_types::{CameraFrame, MetaballError, Pose};
use tracing::debug;

use crate::camera::PoseCamera;
use crate::force::ForceSensor;

/// Period of the synthetic motion, in frames.
const MOTION_PERIOD: f64 = 120.0;
/// Slowest paced rate; lower positive rates are raised to this.
const MIN_FPS: f64 = 0.01;

// ────────────────────────────────────────────────────────────────────────────
// Camera
// ────────────────────────────────────────────────────────────────────────────

pub struct SimCamera {
    id: String,
    fps: f64,
    width: u32,
    height: u32,
    rest: Pose,
    frame: u64,
    next_due: Option<Instant>,
    released: bool,
}

impl SimCamera {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fps: 30.0,
            width: 320,
            height: 240,
            rest: Pose::new(0.0, 0.0, 30.0, 0.0, 0.0, 0.0),
            frame: 0,
            next_due: None,
            released: false,
        }
    }

    /// Frames per second; `0` disables pacing.  Non-finite or negative
    /// rates also disable it, and positive rates below one frame per 100 s
    /// are raised to that.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = if !fps.is_finite() || fps <= 0.0 {
            0.0
        } else {
            fps.max(MIN_FPS)
        };
        self
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Marker pose the trajectory oscillates around.
    pub fn with_rest_pose(mut self, rest: Pose) -> Self {
        self.rest = rest;
        self
    }

    pub fn frames_read(&self) -> u64 {
        self.frame
    }

    fn pace(&mut self) {
        if self.fps <= 0.0 {
            return;
        }
        let period = Duration::from_secs_f64(1.0 / self.fps);
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        // Do not try to catch up after a stall.
        self.next_due = Some(due.max(now) + period);
    }

    fn pose_at(&self, frame: u64) -> Pose {
        let phase = std::f64::consts::TAU * frame as f64 / MOTION_PERIOD;
        let r = self.rest;
        Pose::new(
            r.x + 2.0 * phase.sin(),
            r.y + 2.0 * phase.cos() - 2.0,
            r.z - 1.0 * (2.0 * phase).sin(),
            r.rx + 0.10 * phase.sin(),
            r.ry + 0.05 * phase.cos() - 0.05,
            r.rz,
        )
    }

    fn encode_frame(&self, frame: u64) -> Vec<u8> {
        // SOI, frame counter as payload, EOI.
        let mut jpeg = Vec::with_capacity(12);
        jpeg.extend_from_slice(&[0xFF, 0xD8]);
        jpeg.extend_from_slice(&frame.to_be_bytes());
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }
}

impl PoseCamera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_image_and_pose(&mut self) -> Result<(Pose, CameraFrame), MetaballError> {
        if self.released {
            return Err(MetaballError::acquisition(&self.id, "camera released"));
        }
        self.pace();
        let n = self.frame;
        self.frame += 1;
        Ok((
            self.pose_at(n),
            CameraFrame {
                width: self.width,
                height: self.height,
                jpeg: self.encode_frame(n),
            },
        ))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            debug!(camera = %self.id, frames = self.frame, "sim camera released");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Force sensor
// ────────────────────────────────────────────────────────────────────────────

pub struct SimForceSensor {
    id: String,
    sample: u64,
    connected: bool,
}

impl SimForceSensor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sample: 0,
            connected: true,
        }
    }
}

impl ForceSensor for SimForceSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_wrench(&mut self) -> Result<[f64; 6], MetaballError> {
        if !self.connected {
            return Err(MetaballError::acquisition(&self.id, "sensor disconnected"));
        }
        let phase = std::f64::consts::TAU * self.sample as f64 / MOTION_PERIOD;
        self.sample += 1;
        Ok([
            0.5 * phase.sin(),
            0.5 * phase.cos(),
            -2.0 - 1.5 * (2.0 * phase).sin(),
            0.01 * phase.cos(),
            -0.01 * phase.sin(),
            0.0,
        ])
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            debug!(sensor = %self.id, samples = self.sample, "sim force sensor disconnected");
        }
    }
}
