//! Frame transforms for marker poses.
//!
//! The canonical path from a raw camera pose to the published pose is
//!
//! ```text
//! raw ──to_reference──▶ reference ──axis_remap──▶ target frame ──to_euler──▶ telemetry
//! ```
//!
//! * [`to_reference`] zeroes the pose against the initial pose captured at
//!   startup: `R' = R₀⁻¹ R`, `t' = R₀⁻¹ (t − t₀)`.
//! * [`FrameTransform::axis_remap`] applies the fixed mounting matrix between
//!   the marker frame and the target frame to both the translation and the
//!   rotation vector.
//! * [`to_euler`], [`to_quaternion`] and [`to_matrix`] produce the output
//!   representations; [`from_euler`] and [`from_matrix`] invert them.
//!
//! # Example
//!
//! ```rust
//! use metaball_perception::transform::{FrameTransform, EulerConvention};
//! use metaball_types::Pose;
//!
//! let initial = Pose::new(1.0, 2.0, 3.0, 0.0, 0.0, 0.3);
//! let tf = FrameTransform::new(initial, FrameTransform::default_axis_remap(), EulerConvention::IntrinsicXyz)
//!     .unwrap();
//!
//! // The initial pose itself maps to the zero pose.
//! let out = tf.apply(initial);
//! assert!(out.to_array().iter().all(|v| v.abs() < 1e-9));
//! ```

use metaball_types::{MetaballError, Pose};
use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that a remap matrix is orthogonal.
const ORTHOGONALITY_TOLERANCE: f64 = 1e-6;

/// Below this |cos(pitch)| the Euler decomposition is treated as gimbal-locked.
const GIMBAL_EPSILON: f64 = 1e-6;

// ────────────────────────────────────────────────────────────────────────────
// Representation types
// ────────────────────────────────────────────────────────────────────────────

/// Axis order / frame convention of an [`EulerPose`].  Angles are radians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EulerConvention {
    /// Rotations about the moving X, then Y, then Z axes:
    /// `R = Rx(a) · Ry(b) · Rz(c)`.
    #[default]
    IntrinsicXyz,
    /// Rotations about the fixed x, then y, then z axes:
    /// `R = Rz(c) · Ry(b) · Rx(a)`.
    ExtrinsicXyz,
}

/// A pose whose rotation is expressed as three Euler angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerPose {
    pub translation: [f64; 3],
    /// Angles about X, Y, Z in radians.
    pub angles: [f64; 3],
    pub convention: EulerConvention,
}

impl EulerPose {
    pub fn to_array(&self) -> [f64; 6] {
        let [x, y, z] = self.translation;
        let [a, b, c] = self.angles;
        [x, y, z, a, b, c]
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.to_array().iter().map(|v| *v as f32).collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stateless conversions
// ────────────────────────────────────────────────────────────────────────────

fn rotation_of(pose: &Pose) -> Rotation3<f64> {
    Rotation3::new(Vector3::from(pose.rotation()))
}

fn pose_from(translation: Vector3<f64>, rotation: &Rotation3<f64>) -> Pose {
    let r = rotation.scaled_axis();
    Pose::from_parts(
        [translation.x, translation.y, translation.z],
        [r.x, r.y, r.z],
    )
}

/// Express `pose` relative to `initial`.
pub fn to_reference(pose: &Pose, initial: &Pose) -> Pose {
    let inverse = rotation_of(initial).inverse();
    let rotation = inverse * rotation_of(pose);
    let delta = Vector3::from(pose.translation()) - Vector3::from(initial.translation());
    pose_from(inverse * delta, &rotation)
}

/// Apply a basis-change matrix to both the translation and the rotation
/// vector of `pose`.
pub fn axis_remap(pose: &Pose, remap: &Matrix3<f64>) -> Pose {
    let t = remap * Vector3::from(pose.translation());
    let r = remap * Vector3::from(pose.rotation());
    Pose::from_parts([t.x, t.y, t.z], [r.x, r.y, r.z])
}

/// Convert the rotation vector of `pose` into Euler angles.
pub fn to_euler(pose: &Pose, convention: EulerConvention) -> EulerPose {
    let rotation = rotation_of(pose);
    let angles = match convention {
        EulerConvention::ExtrinsicXyz => {
            let (roll, pitch, yaw) = rotation.euler_angles();
            [roll, pitch, yaw]
        }
        EulerConvention::IntrinsicXyz => intrinsic_xyz_angles(rotation.matrix()),
    };
    EulerPose {
        translation: pose.translation(),
        angles,
        convention,
    }
}

/// Inverse of [`to_euler`].
pub fn from_euler(euler: &EulerPose) -> Pose {
    let [a, b, c] = euler.angles;
    let rotation = match euler.convention {
        EulerConvention::ExtrinsicXyz => Rotation3::from_euler_angles(a, b, c),
        EulerConvention::IntrinsicXyz => {
            Rotation3::from_axis_angle(&Vector3::x_axis(), a)
                * Rotation3::from_axis_angle(&Vector3::y_axis(), b)
                * Rotation3::from_axis_angle(&Vector3::z_axis(), c)
        }
    };
    pose_from(Vector3::from(euler.translation), &rotation)
}

/// Decompose `R = Rx(a) · Ry(b) · Rz(c)`.
fn intrinsic_xyz_angles(m: &Matrix3<f64>) -> [f64; 3] {
    let b = m[(0, 2)].clamp(-1.0, 1.0).asin();
    if b.cos().abs() > GIMBAL_EPSILON {
        let a = (-m[(1, 2)]).atan2(m[(2, 2)]);
        let c = (-m[(0, 1)]).atan2(m[(0, 0)]);
        [a, b, c]
    } else {
        // Gimbal lock: only a ± c is observable, pin c to zero.
        [m[(2, 1)].atan2(m[(1, 1)]), b, 0.0]
    }
}

/// Translation followed by the rotation as a unit quaternion, in
/// `[x, y, z, qx, qy, qz, qw]` order.
pub fn to_quaternion(pose: &Pose) -> [f64; 7] {
    let q = UnitQuaternion::from_scaled_axis(Vector3::from(pose.rotation())).into_inner();
    let [x, y, z] = pose.translation();
    [x, y, z, q.coords.x, q.coords.y, q.coords.z, q.coords.w]
}

/// 4×4 homogeneous transform of `pose`.
pub fn to_matrix(pose: &Pose) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(rotation_of(pose).matrix());
    m.fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&Vector3::from(pose.translation()));
    m
}

/// Inverse of [`to_matrix`].  The rotation block is re-orthonormalised.
pub fn from_matrix(m: &Matrix4<f64>) -> Pose {
    let block: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let rotation = Rotation3::from_matrix(&block);
    let translation: Vector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
    pose_from(translation, &rotation)
}

// ────────────────────────────────────────────────────────────────────────────
// FrameTransform
// ────────────────────────────────────────────────────────────────────────────

/// The raw-pose → telemetry-pose pipeline with its configuration baked in.
#[derive(Debug, Clone)]
pub struct FrameTransform {
    initial: Pose,
    remap: Matrix3<f64>,
    convention: EulerConvention,
}

impl FrameTransform {
    /// Build a transform zeroed at `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaballError::Configuration`] when `remap` is not
    /// orthogonal.
    pub fn new(
        initial: Pose,
        remap: Matrix3<f64>,
        convention: EulerConvention,
    ) -> Result<Self, MetaballError> {
        let residual = (remap * remap.transpose() - Matrix3::identity()).abs().max();
        if residual > ORTHOGONALITY_TOLERANCE {
            return Err(MetaballError::Configuration(format!(
                "axis remap matrix is not orthogonal (|M·Mᵀ − I| = {residual:.3e})"
            )));
        }
        Ok(Self {
            initial,
            remap,
            convention,
        })
    }

    /// Build from a row-major 3×3 array, as read from configuration.
    pub fn from_rows(
        initial: Pose,
        rows: [[f64; 3]; 3],
        convention: EulerConvention,
    ) -> Result<Self, MetaballError> {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Self::new(initial, Matrix3::from_row_slice(&flat), convention)
    }

    /// Marker → sensor mounting: swap X and Y, negate Z.
    pub fn default_axis_remap() -> Matrix3<f64> {
        Matrix3::new(
            0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 0.0, -1.0,
        )
    }

    pub fn initial(&self) -> &Pose {
        &self.initial
    }

    pub fn convention(&self) -> EulerConvention {
        self.convention
    }

    pub fn to_reference(&self, pose: &Pose) -> Pose {
        to_reference(pose, &self.initial)
    }

    pub fn axis_remap(&self, pose: &Pose) -> Pose {
        axis_remap(pose, &self.remap)
    }

    pub fn to_euler(&self, pose: &Pose) -> EulerPose {
        to_euler(pose, self.convention)
    }

    /// Run the full pipeline: reference → remap → Euler.
    pub fn apply(&self, raw: Pose) -> EulerPose {
        let reference = self.to_reference(&raw);
        let remapped = self.axis_remap(&reference);
        self.to_euler(&remapped)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
