//! `metaball-hal` – hardware collaborators.
//!
//! The pipeline talks to its devices only through the traits defined here,
//! so real drivers and the simulated ones in [`sim`] are interchangeable.
//!
//! - [`camera::PoseCamera`] – camera + marker detector yielding a raw pose
//!   and the JPEG frame.
//! - [`force::ForceSensor`] – six-axis force/torque sensor.

pub mod camera;
pub mod force;
pub mod sim;

pub use camera::PoseCamera;
pub use force::ForceSensor;
pub use sim::{SimCamera, SimForceSensor};
