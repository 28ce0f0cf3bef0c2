//! Shared quaternion algebra for the optical and inertial pipelines.
//!
//! Both pipelines report orientation as `UnitQuaternion<f64>` in (w, x, y, z)
//! order. This module adds the pieces nalgebra does not give us in the exact
//! form the trackers need: the trace-based matrix conversion, checked
//! normalization and tuple export for serde snapshots.

use nalgebra::{Quaternion, Unit, UnitQuaternion};

use crate::error::{TrackResult, TrackingError};
use crate::types::{RotationMat, Vec3};

/// Below this value of `1 + trace` the trace formula divides by a near-zero `w`.
pub const QUAT_TRACE_EPS: f64 = 1e-6;

/// Smallest norm we are willing to normalize.
pub const QUAT_NORM_EPS: f64 = 1e-12;

/// Convert an orthonormal rotation matrix to a unit quaternion.
///
/// Uses `w = ½√(1 + trace)` and the antisymmetric off-diagonal differences
/// divided by `4w`. Rotations close to 180° (trace → −1) switch to the
/// largest-diagonal branch instead of dividing by a vanishing `w`.
pub fn from_rotation_matrix(r: &RotationMat) -> UnitQuaternion<f64> {
    let trace = r.trace();

    let (w, x, y, z) = if 1.0 + trace > QUAT_TRACE_EPS {
        let w = 0.5 * (1.0 + trace).sqrt();
        let four_w = 4.0 * w;
        (
            w,
            (r[(2, 1)] - r[(1, 2)]) / four_w,
            (r[(0, 2)] - r[(2, 0)]) / four_w,
            (r[(1, 0)] - r[(0, 1)]) / four_w,
        )
    } else {
        log::debug!("rotation near 180° (trace {:.6}), using diagonal branch", trace);
        largest_diagonal_branch(r)
    };

    UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z))
}

fn largest_diagonal_branch(r: &RotationMat) -> (f64, f64, f64, f64) {
    let (r00, r11, r22) = (r[(0, 0)], r[(1, 1)], r[(2, 2)]);
    if r00 >= r11 && r00 >= r22 {
        let s = 2.0 * (1.0 + r00 - r11 - r22).sqrt();
        (
            (r[(2, 1)] - r[(1, 2)]) / s,
            0.25 * s,
            (r[(0, 1)] + r[(1, 0)]) / s,
            (r[(0, 2)] + r[(2, 0)]) / s,
        )
    } else if r11 >= r22 {
        let s = 2.0 * (1.0 + r11 - r00 - r22).sqrt();
        (
            (r[(0, 2)] - r[(2, 0)]) / s,
            (r[(0, 1)] + r[(1, 0)]) / s,
            0.25 * s,
            (r[(1, 2)] + r[(2, 1)]) / s,
        )
    } else {
        let s = 2.0 * (1.0 + r22 - r00 - r11).sqrt();
        (
            (r[(1, 0)] - r[(0, 1)]) / s,
            (r[(0, 2)] + r[(2, 0)]) / s,
            (r[(1, 2)] + r[(2, 1)]) / s,
            0.25 * s,
        )
    }
}

/// Normalize a raw quaternion, refusing vectors too short (or not finite
/// enough) to carry a direction.
pub fn normalize(q: Quaternion<f64>) -> TrackResult<UnitQuaternion<f64>> {
    let norm = q.norm();
    if !(norm.is_finite() && norm > QUAT_NORM_EPS) {
        return Err(TrackingError::NumericDegeneracy(format!(
            "quaternion norm {:.3e} cannot be normalized",
            norm
        )));
    }
    Ok(UnitQuaternion::new_unchecked(q / norm))
}

/// Re-project onto the unit sphere after a composition to stop drift.
pub fn renormalized(mut q: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    q.renormalize();
    q
}

/// Rotation of `angle_rad` about `axis`; `None` when the axis has no direction.
pub fn from_angle_axis(angle_rad: f64, axis: &Vec3) -> Option<UnitQuaternion<f64>> {
    Unit::try_new(*axis, QUAT_NORM_EPS).map(|unit| UnitQuaternion::from_axis_angle(&unit, angle_rad))
}

/// Rotate `v` by `q` (`q ⊗ v ⊗ q*`).
pub fn rotate(q: &UnitQuaternion<f64>, v: &Vec3) -> Vec3 {
    q.transform_vector(v)
}

/// (w, x, y, z) for serialization.
pub fn to_tuple(q: &UnitQuaternion<f64>) -> (f64, f64, f64, f64) {
    (q.w, q.i, q.j, q.k)
}
