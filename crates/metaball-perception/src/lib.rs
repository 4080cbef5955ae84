//! `metaball-perception` – pose conditioning.
//!
//! Turns the raw marker pose reported by the camera collaborator into the
//! smoothed, reference-zeroed pose published as telemetry.
//!
//! # Modules
//!
//! - [`filter`] – [`PoseFilter`][filter::PoseFilter]: sliding-window mean
//!   with quaternion rotation averaging, plus the [`JumpGate`][filter::JumpGate]
//!   outlier guard.
//! - [`transform`] – [`FrameTransform`][transform::FrameTransform]:
//!   reference zeroing, axis remapping and the Euler / quaternion / matrix
//!   representation converters.
//! - [`wrench`] – expresses force/torque readings in the global frame.

pub mod filter;
pub mod transform;
pub mod wrench;

pub use filter::{FilterMode, JumpGate, PoseFilter, mean_pose};
pub use transform::{EulerConvention, EulerPose, FrameTransform};
pub use wrench::WrenchTransform;
