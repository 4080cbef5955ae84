//! `ForceSensor` trait: six-axis force/torque sensor collaborator.

use metaball_types::MetaballError;

/// A force/torque sensor reporting `[fx, fy, fz, tx, ty, tz]` in its own
/// frame.
pub trait ForceSensor: Send {
    fn id(&self) -> &str;

    /// Read the latest wrench.
    ///
    /// # Errors
    ///
    /// Returns [`MetaballError::AcquisitionFailure`] if the sensor did not
    /// answer.
    fn read_wrench(&mut self) -> Result<[f64; 6], MetaballError>;

    /// Disconnect from the device.  Called exactly once during teardown.
    fn disconnect(&mut self);
}
