use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 6-DOF pose: translation followed by a rotation vector (axis-angle,
/// magnitude = angle in radians).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Self { x, y, z, rx, ry, rz }
    }

    /// The zero pose (no translation, identity rotation).
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_parts(translation: [f64; 3], rotation: [f64; 3]) -> Self {
        Self::new(
            translation[0],
            translation[1],
            translation[2],
            rotation[0],
            rotation[1],
            rotation[2],
        )
    }

    pub fn translation(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn rotation(&self) -> [f64; 3] {
        [self.rx, self.ry, self.rz]
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.rx, self.ry, self.rz]
    }

    /// Single-precision copy, as carried on the wire and fed to models.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.to_array().iter().map(|v| *v as f32).collect()
    }
}

impl From<[f64; 6]> for Pose {
    fn from(v: [f64; 6]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }
}

/// An encoded image frame handed over by a camera collaborator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// JPEG-encoded frame bytes.
    pub jpeg: Vec<u8>,
}

/// One acquisition tick as published on the telemetry channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetryMessage {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// JPEG-encoded camera image.
    pub image: Vec<u8>,
    pub pose: Vec<f32>,
    pub force: Vec<f32>,
    /// Node displacement / shape vector, model-dependent length.
    pub node: Vec<f32>,
}

impl TelemetryMessage {
    /// Build a message stamped with the current wall-clock time.
    pub fn now(image: Vec<u8>, pose: Vec<f32>, force: Vec<f32>, node: Vec<f32>) -> Self {
        Self {
            timestamp: epoch_seconds(),
            image,
            pose,
            force,
            node,
        }
    }
}

/// The part of a tick persisted to disk while recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSample {
    pub pose: [f64; 6],
    pub force: Vec<f64>,
    pub image: Vec<u8>,
}

/// Current wall-clock time in (fractional) seconds since the Unix epoch.
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Error type shared by every Metaball crate.
#[derive(Error, Debug)]
pub enum MetaballError {
    #[error("Acquisition failure on {component}: {details}")]
    AcquisitionFailure { component: String, details: String },

    #[error("Timed out after {0} ms waiting for a message")]
    Timeout(u64),

    #[error("Recording queue full, sample dropped")]
    QueueFull,

    #[error("Failed to persist recording: {0}")]
    PersistFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed telemetry frame: {0}")]
    Decode(String),
}

impl MetaballError {
    /// Shorthand for an [`MetaballError::AcquisitionFailure`].
    pub fn acquisition(component: impl Into<String>, details: impl Into<String>) -> Self {
        Self::AcquisitionFailure {
            component: component.into(),
            details: details.into(),
        }
    }

    /// Whether the pipeline can keep running after this error.
    ///
    /// Only configuration problems are fatal; everything else is absorbed by
    /// the loop that sees it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}
