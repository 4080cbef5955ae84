//! Pose smoothing.
//!
//! [`PoseFilter`] keeps the last *N* poses in a FIFO window and returns their
//! mean on every push.  Translation is averaged per axis.  Rotation vectors
//! cannot be averaged component-wise (two rotations of +170° and −170° about
//! the same axis would average to 0° instead of 180°), so each rotation is
//! converted to a unit quaternion and the window is averaged with the
//! eigenvector method:
//!
//! ```text
//! M = Σ qᵢ qᵢᵀ          q̄ = eigenvector of M with the largest eigenvalue
//! ```
//!
//! `q` and `−q` contribute the same outer product, so the result does not
//! depend on which half of the double cover a sample came from.
//!
//! # Example
//!
//! ```rust
//! use metaball_perception::filter::PoseFilter;
//! use metaball_types::Pose;
//!
//! let mut filter = PoseFilter::new(2);
//! filter.push(Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0));
//! let smoothed = filter.push(Pose::new(2.0, 0.0, 0.0, 0.0, 0.0, 0.0));
//! assert!((smoothed.x - 1.0).abs() < 1e-9);
//! ```

use std::collections::VecDeque;

use metaball_types::Pose;
use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Default window length.
pub const DEFAULT_WINDOW: usize = 5;

/// Default translation jump (sensor length units) above which a raw pose is
/// treated as a detection glitch.
pub const DEFAULT_JUMP_THRESHOLD: f64 = 20.0;

// ────────────────────────────────────────────────────────────────────────────
// Averaging
// ────────────────────────────────────────────────────────────────────────────

/// Mean of a set of poses: arithmetic mean of the translations and
/// eigenvector mean of the rotations.
///
/// Returns `None` for an empty input.
pub fn mean_pose<'a, I>(poses: I) -> Option<Pose>
where
    I: IntoIterator<Item = &'a Pose>,
{
    let mut translation = Vector3::zeros();
    let mut accumulator = Matrix4::<f64>::zeros();
    let mut count = 0usize;

    for pose in poses {
        translation += Vector3::from(pose.translation());
        let q = UnitQuaternion::from_scaled_axis(Vector3::from(pose.rotation()));
        accumulator += q.coords * q.coords.transpose();
        count += 1;
    }

    if count == 0 {
        return None;
    }

    let translation = translation / count as f64;
    let eigen = accumulator.symmetric_eigen();
    let (principal, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0usize, f64::NEG_INFINITY), |best, (i, &value)| {
            if value > best.1 { (i, value) } else { best }
        });
    let mean = UnitQuaternion::from_quaternion(Quaternion::from(
        eigen.eigenvectors.column(principal).into_owned(),
    ));
    let rotation = mean.scaled_axis();

    Some(Pose::from_parts(
        [translation.x, translation.y, translation.z],
        [rotation.x, rotation.y, rotation.z],
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// PoseFilter
// ────────────────────────────────────────────────────────────────────────────

/// How the filter treats its own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Standard moving average: the window only ever holds raw samples.
    #[default]
    MovingAverage,
    /// Once the window is full, the newest slot is overwritten with the
    /// filtered value, so earlier outputs feed back into later ones.
    Feedback,
}

/// Sliding-window pose filter.
#[derive(Debug, Clone)]
pub struct PoseFilter {
    capacity: usize,
    mode: FilterMode,
    window: VecDeque<Pose>,
}

impl PoseFilter {
    /// Create a moving-average filter over the last `capacity` poses.
    ///
    /// A `capacity` of zero is treated as one (pass-through).
    pub fn new(capacity: usize) -> Self {
        Self::with_mode(capacity, FilterMode::MovingAverage)
    }

    pub fn with_mode(capacity: usize, mode: FilterMode) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            mode,
            window: VecDeque::with_capacity(capacity),
        }
    }

    /// Add `pose` to the window and return the filtered pose.
    pub fn push(&mut self, pose: Pose) -> Pose {
        if self.window.is_empty() {
            self.window.push_back(pose);
            return pose;
        }

        let full = self.window.len() >= self.capacity;
        if full {
            self.window.pop_front();
        }
        self.window.push_back(pose);

        let filtered = mean_pose(self.window.iter()).unwrap_or(pose);

        if full && self.mode == FilterMode::Feedback {
            if let Some(newest) = self.window.back_mut() {
                *newest = filtered;
            }
        }

        filtered
    }

    /// Number of poses currently in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Drop every buffered pose.
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for PoseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JumpGate
// ────────────────────────────────────────────────────────────────────────────

/// Rejects single-frame detection glitches.
///
/// A pose whose translation moved more than `threshold` from the last
/// accepted pose is replaced by that last accepted pose.  The first pose is
/// always accepted.
#[derive(Debug, Clone)]
pub struct JumpGate {
    threshold: f64,
    last: Option<Pose>,
    rejected: u64,
}

impl JumpGate {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last: None,
            rejected: 0,
        }
    }

    /// Return the pose to use for this frame.
    pub fn admit(&mut self, pose: Pose) -> Pose {
        let accepted = match self.last {
            Some(last) => {
                let jump = Vector3::from(pose.translation()) - Vector3::from(last.translation());
                if jump.norm() > self.threshold {
                    self.rejected += 1;
                    tracing::debug!(jump = jump.norm(), threshold = self.threshold, "pose jump rejected");
                    last
                } else {
                    pose
                }
            }
            None => pose,
        };
        self.last = Some(accepted);
        accepted
    }

    /// Number of poses replaced so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

impl Default for JumpGate {
    fn default() -> Self {
        Self::new(DEFAULT_JUMP_THRESHOLD)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn translation(x: f64) -> Pose {
        Pose::new(x, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    #[test]
    fn first_push_returns_raw_input() {
        let mut filter = PoseFilter::new(5);
        let raw = Pose::new(1.0, 2.0, 3.0, 0.1, 0.2, 0.3);
        assert_eq!(filter.push(raw), raw);
    }

    #[test]
    fn window_length_tracks_push_count() {
        let mut filter = PoseFilter::new(5);
        for pushed in 1..=12 {
            filter.push(translation(pushed as f64));
            assert_eq!(filter.len(), pushed.min(5));
        }
    }

    #[test]
    fn window_length_tracks_push_count_in_feedback_mode() {
        let mut filter = PoseFilter::with_mode(3, FilterMode::Feedback);
        for pushed in 1..=7 {
            filter.push(translation(pushed as f64));
            assert_eq!(filter.len(), pushed.min(3));
        }
    }

    #[test]
    fn translation_is_arithmetic_mean_of_window() {
        let mut filter = PoseFilter::new(3);
        filter.push(translation(1.0));
        filter.push(translation(2.0));
        filter.push(translation(3.0));
        // Window is now [2, 3, 4].
        let out = filter.push(translation(4.0));
        assert_abs_diff_eq!(out.x, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn feedback_mode_reuses_filtered_value() {
        let mut filter = PoseFilter::with_mode(2, FilterMode::Feedback);
        filter.push(translation(0.0));
        filter.push(translation(2.0)); // window [0, 2] → 1, not full before push
        // Full: evict 0 → [2, 4] → 3; newest slot becomes 3.
        assert_abs_diff_eq!(filter.push(translation(4.0)).x, 3.0, epsilon = 1e-9);
        // [3, 6] → 4.5.  A plain moving average would give 5.
        assert_abs_diff_eq!(filter.push(translation(6.0)).x, 4.5, epsilon = 1e-9);
    }

    #[test]
    fn moving_average_does_not_feed_back() {
        let mut filter = PoseFilter::new(2);
        filter.push(translation(0.0));
        filter.push(translation(2.0));
        filter.push(translation(4.0));
        assert_abs_diff_eq!(filter.push(translation(6.0)).x, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn rotation_mean_handles_wrap_around_pi() {
        let angle = 170.0_f64.to_radians();
        let plus = Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, angle);
        let minus = Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, -angle);

        let mean = mean_pose([plus, minus].iter()).unwrap();
        assert_abs_diff_eq!(mean.rz.abs(), PI, epsilon = 1e-6);
        assert_abs_diff_eq!(mean.rx, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(mean.ry, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn filter_averages_rotations_near_pi() {
        let angle = 170.0_f64.to_radians();
        let mut filter = PoseFilter::new(2);
        filter.push(Pose::new(0.0, 0.0, 0.0, angle, 0.0, 0.0));
        let out = filter.push(Pose::new(0.0, 0.0, 0.0, -angle, 0.0, 0.0));
        assert_abs_diff_eq!(out.rx.abs(), PI, epsilon = 1e-6);
    }

    #[test]
    fn rotation_mean_of_identical_rotations_is_that_rotation() {
        let pose = Pose::new(0.0, 0.0, 0.0, 0.2, -0.4, 0.1);
        let mean = mean_pose([pose, pose, pose].iter()).unwrap();
        assert_abs_diff_eq!(mean.rx, 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(mean.ry, -0.4, epsilon = 1e-9);
        assert_abs_diff_eq!(mean.rz, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn rotation_mean_of_small_symmetric_rotations_is_identity() {
        let a = Pose::new(0.0, 0.0, 0.0, 0.0, 0.1, 0.0);
        let b = Pose::new(0.0, 0.0, 0.0, 0.0, -0.1, 0.0);
        let mean = mean_pose([a, b].iter()).unwrap();
        assert_abs_diff_eq!(mean.ry, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn mean_of_nothing_is_none() {
        assert!(mean_pose(std::iter::empty()).is_none());
    }

    #[test]
    fn zero_capacity_is_pass_through() {
        let mut filter = PoseFilter::new(0);
        assert_eq!(filter.capacity(), 1);
        filter.push(translation(1.0));
        assert_abs_diff_eq!(filter.push(translation(5.0)).x, 5.0, epsilon = 1e-9);
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn reset_empties_window() {
        let mut filter = PoseFilter::default();
        filter.push(translation(1.0));
        filter.reset();
        assert!(filter.is_empty());
    }

    // ── JumpGate ────────────────────────────────────────────────────────────

    #[test]
    fn jump_gate_accepts_first_pose() {
        let mut gate = JumpGate::new(20.0);
        let pose = translation(100.0);
        assert_eq!(gate.admit(pose), pose);
        assert_eq!(gate.rejected(), 0);
    }

    #[test]
    fn jump_gate_replaces_large_jump_with_last_pose() {
        let mut gate = JumpGate::new(20.0);
        gate.admit(translation(0.0));
        assert_eq!(gate.admit(translation(5.0)), translation(5.0));
        assert_eq!(gate.admit(translation(50.0)), translation(5.0));
        assert_eq!(gate.rejected(), 1);
        // Measured against the last accepted pose, not the rejected one.
        assert_eq!(gate.admit(translation(20.0)), translation(20.0));
    }
}
