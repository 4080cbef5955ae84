//! Force/torque readings expressed in the global frame.
//!
//! The sensor is mounted with a fixed rotation `R` and offset `t` relative
//! to the global frame.  A wrench `(f, τ)` measured in the sensor frame maps
//! to `f' = R f` and `τ' = R τ + t × f'`.

use metaball_types::MetaballError;
use nalgebra::{Matrix3, Vector3};

const ORTHOGONALITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct WrenchTransform {
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

impl WrenchTransform {
    /// # Errors
    ///
    /// [`MetaballError::Configuration`] when `rotation` is not orthogonal.
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Result<Self, MetaballError> {
        let residual = (rotation * rotation.transpose() - Matrix3::identity())
            .abs()
            .max();
        if residual > ORTHOGONALITY_TOLERANCE {
            return Err(MetaballError::Configuration(format!(
                "wrench rotation is not orthogonal (|R·Rᵀ − I| = {residual:.3e})"
            )));
        }
        Ok(Self {
            rotation,
            translation,
        })
    }

    /// Build from a row-major rotation and a translation, as read from
    /// configuration.
    pub fn from_rows(rows: [[f64; 3]; 3], translation: [f64; 3]) -> Result<Self, MetaballError> {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Self::new(Matrix3::from_row_slice(&flat), Vector3::from(translation))
    }

    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Map `[fx, fy, fz, tx, ty, tz]` from the sensor frame to the global frame.
    pub fn to_global(&self, wrench: [f64; 6]) -> [f64; 6] {
        let force = self.rotation * Vector3::new(wrench[0], wrench[1], wrench[2]);
        let torque = self.rotation * Vector3::new(wrench[3], wrench[4], wrench[5])
            + self.translation.cross(&force);
        [force.x, force.y, force.z, torque.x, torque.y, torque.z]
    }
}

impl Default for WrenchTransform {
    fn default() -> Self {
        Self::identity()
    }
}
