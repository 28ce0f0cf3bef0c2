//! Per-sample orientation updates used by the IMU tracker.
//!
//! Gyro rates are in deg/s, accelerations in g, angles returned in degrees.
//! The world frame is y-up: a device lying flat and still reads `acc ≈ (0, 1, 0)`.

use nalgebra::{Quaternion, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::error::TrackResult;
use crate::quaternion;
use crate::types::Vec3;

/// Gravity direction the tilt correction pulls the accelerometer towards.
pub fn world_up() -> Vec3 {
    Vec3::y()
}

// ─── Flatland (single axis) ──────────────────────────────────────────────────

/// Integrate the z gyro rate onto the previous roll.
pub fn flatland_roll_gyr(prev_deg: f64, gyr_z: f64, dt: f64) -> f64 {
    prev_deg + dt * gyr_z
}

/// Roll from the gravity direction in the x/y plane.
pub fn flatland_roll_acc(acc: &Vec3) -> f64 {
    acc.x.atan2(acc.y).to_degrees()
}

/// Blend a gyro step from the previous complementary value with the accel roll.
///
/// `alpha = 1` is exactly the gyro step, `alpha = 0` exactly `roll_acc`.
pub fn flatland_roll_comp(comp_prev_deg: f64, gyr_z: f64, roll_acc: f64, dt: f64, alpha: f64) -> f64 {
    alpha * flatland_roll_gyr(comp_prev_deg, gyr_z, dt) + (1.0 - alpha) * roll_acc
}

// ─── Accelerometer tilt ──────────────────────────────────────────────────────

pub fn acc_pitch(acc: &Vec3) -> f64 {
    (-acc.z).atan2(acc.y).to_degrees()
}

pub fn acc_roll(acc: &Vec3) -> f64 {
    flatland_roll_acc(acc)
}

/// `(pitch, 0, roll)` in degrees; yaw is unobservable from gravity alone.
pub fn euler_acc(acc: &Vec3) -> Vec3 {
    Vec3::new(acc_pitch(acc), 0.0, acc_roll(acc))
}

// ─── Quaternion tracks ───────────────────────────────────────────────────────

/// Why a tilt correction was not applied this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TiltSkip {
    /// Accelerometer vector too short to define a direction
    ZeroAcceleration,
    /// Measured gravity parallel to up, so the correction axis is undefined
    AxisUndefined,
}

/// One gyro integration step `q ⊗ exp(dt·ω)`.
///
/// `Ok(None)` (caller keeps `q`) when any axis rate is below `threshold`.
/// Non-finite rates make the composition unnormalizable and come back as
/// `NumericDegeneracy`.
pub fn integrate_gyro(
    q: &UnitQuaternion<f64>,
    gyr_deg: &Vec3,
    dt: f64,
    threshold: f64,
) -> TrackResult<Option<UnitQuaternion<f64>>> {
    if gyr_deg.iter().any(|w| w.abs() < threshold) {
        return Ok(None);
    }
    let omega = gyr_deg.map(f64::to_radians);
    let rate = omega.norm();
    if rate == 0.0 {
        return Ok(None);
    }
    let half = 0.5 * dt * rate;
    let v = omega * (half.sin() / rate);
    let step = Quaternion::new(half.cos(), v.x, v.y, v.z);
    quaternion::normalize(q.quaternion() * step).map(Some)
}

/// Rotate `q_pred` by `(1 − alpha)` of the angle between measured gravity and up.
pub fn tilt_correct(
    q_pred: &UnitQuaternion<f64>,
    acc: &Vec3,
    alpha: f64,
) -> Result<UnitQuaternion<f64>, TiltSkip> {
    let a_world = quaternion::rotate(q_pred, acc);
    let norm = a_world.norm();
    if !(norm > quaternion::QUAT_NORM_EPS) {
        return Err(TiltSkip::ZeroAcceleration);
    }
    let s = a_world / norm;
    let up = world_up();

    // s × up; atan2 keeps small angles that acos(s_y) rounds to zero
    let axis = s.cross(&up);
    let phi = axis.norm().atan2(s.dot(&up));
    let tilt = quaternion::from_angle_axis((1.0 - alpha) * phi, &axis).ok_or(TiltSkip::AxisUndefined)?;

    Ok(quaternion::renormalized(tilt * q_pred))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackingError;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_comp_roll_alpha_extremes_are_exact() {
        let (prev, gz, dt, roll_acc) = (12.5, -7.25, 0.013, 33.3);
        assert_eq!(flatland_roll_comp(prev, gz, roll_acc, dt, 1.0), flatland_roll_gyr(prev, gz, dt));
        assert_eq!(flatland_roll_comp(prev, gz, roll_acc, dt, 0.0), roll_acc);
    }

    #[test]
    fn test_acc_angles() {
        assert_abs_diff_eq!(flatland_roll_acc(&Vec3::new(0.0, 1.0, 0.0)), 0.0);
        assert_abs_diff_eq!(flatland_roll_acc(&Vec3::new(1.0, 1.0, 0.0)), 45.0, epsilon = 1e-12);
        assert_abs_diff_eq!(acc_pitch(&Vec3::new(0.0, 1.0, -1.0)), 45.0, epsilon = 1e-12);

        let e = euler_acc(&Vec3::new(-1.0, 1.0, 1.0));
        assert_abs_diff_eq!(e, Vec3::new(-45.0, 0.0, -45.0), epsilon = 1e-12);
    }

    #[test]
    fn test_gyro_below_threshold_leaves_quaternion() {
        let q = UnitQuaternion::identity();
        assert!(integrate_gyro(&q, &Vec3::new(0.0, 0.0, 0.0), 0.01, 1e-8).unwrap().is_none());
        // one quiet axis is enough to skip
        assert!(integrate_gyro(&q, &Vec3::new(30.0, 1e-9, 10.0), 0.01, 1e-8).unwrap().is_none());
    }

    #[test]
    fn test_gyro_integrates_quarter_turn() {
        let mut q = UnitQuaternion::identity();
        let gyr = Vec3::new(1e-6, 1e-6, 90.0);
        for _ in 0..100 {
            q = integrate_gyro(&q, &gyr, 0.01, 1e-8).unwrap().unwrap();
        }
        assert_abs_diff_eq!(q.angle(), std::f64::consts::FRAC_PI_2, epsilon = 1e-6);
        assert_abs_diff_eq!(q.k, std::f64::consts::FRAC_PI_4.sin(), epsilon = 1e-6);
        assert_abs_diff_eq!(q.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gyro_non_finite_rate_is_degenerate() {
        let q = UnitQuaternion::identity();
        let err = integrate_gyro(&q, &Vec3::new(f64::NAN, 5.0, 5.0), 0.01, 1e-8).unwrap_err();
        assert!(matches!(err, TrackingError::NumericDegeneracy(_)));
        // zero threshold with a still gyro is a no-op, not a 0/0
        assert!(integrate_gyro(&q, &Vec3::zeros(), 0.01, 0.0).unwrap().is_none());
    }

    #[test]
    fn test_full_tilt_correction_aligns_with_up() {
        let tilt = 30f64.to_radians();
        let acc = Vec3::new(tilt.sin(), tilt.cos(), 0.0);
        let q = tilt_correct(&UnitQuaternion::identity(), &acc, 0.0).unwrap();
        let corrected = quaternion::rotate(&q, &acc);
        assert_abs_diff_eq!(corrected, world_up(), epsilon = 1e-12);
        assert_abs_diff_eq!(q.angle(), tilt, epsilon = 1e-12);
    }

    #[test]
    fn test_tiny_tilt_is_fully_corrected() {
        let tilt: f64 = 1e-9;
        let acc = Vec3::new(tilt.sin(), tilt.cos(), 0.0);
        let q = tilt_correct(&UnitQuaternion::identity(), &acc, 0.0).unwrap();
        // rotation about +z by the full tilt
        assert_abs_diff_eq!(q.k, (0.5 * tilt).sin(), epsilon = 1e-20);
        let corrected = quaternion::rotate(&q, &acc);
        assert_abs_diff_eq!(corrected.x, 0.0, epsilon = 1e-16);
        assert_abs_diff_eq!(corrected.y, 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_partial_tilt_correction() {
        let tilt = 30f64.to_radians();
        let acc = Vec3::new(0.0, tilt.cos(), tilt.sin());
        let q = tilt_correct(&UnitQuaternion::identity(), &acc, 0.5).unwrap();
        assert_abs_diff_eq!(q.angle(), 0.5 * tilt, epsilon = 1e-12);
    }

    #[test]
    fn test_tilt_degenerate_inputs() {
        let q = UnitQuaternion::identity();
        assert_eq!(tilt_correct(&q, &Vec3::zeros(), 0.9), Err(TiltSkip::ZeroAcceleration));
        assert_eq!(tilt_correct(&q, &Vec3::new(0.0, 1.0, 0.0), 0.9), Err(TiltSkip::AxisUndefined));
    }
}
