//! Strobe tick → tangent-plane projection.
//!
//! The base station sweeps a laser plane at a constant angular rate after each
//! sync flash. The tick count until a photodiode is hit gives the sweep angle;
//! its tangent is the pinhole projection of that photodiode.
//!
//! Horizontal:  angle = -elapsed · 360 · f + 90°
//! Vertical:    angle =  elapsed · 360 · f - 90°

use crate::config::PoseConfig;
use crate::types::{ProjectedPoints, StrobeTicks, HOMOGRAPHY_DIM};

const HORIZONTAL_OFFSET_DEG: f64 = 90.0;
const VERTICAL_OFFSET_DEG: f64 = -90.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepModel {
    pub tick_rate_hz: f64,
    pub sweep_hz: f64,
}

impl SweepModel {
    pub fn new(tick_rate_hz: f64, sweep_hz: f64) -> Self {
        Self { tick_rate_hz, sweep_hz }
    }

    pub fn from_config(config: &PoseConfig) -> Self {
        Self::new(config.tick_rate_hz, config.sweep_hz)
    }

    /// Angular velocity of the sweep in deg/s.
    pub fn degrees_per_second(&self) -> f64 {
        360.0 * self.sweep_hz
    }

    /// Sweep angle (deg) for one axis sample; even index = horizontal.
    pub fn sweep_angle_deg(&self, index: usize, ticks: u32) -> f64 {
        let elapsed = f64::from(ticks) / self.tick_rate_hz;
        let swept = elapsed * self.degrees_per_second();
        if index % 2 == 0 {
            -swept + HORIZONTAL_OFFSET_DEG
        } else {
            swept + VERTICAL_OFFSET_DEG
        }
    }

    /// Convert the 8 raw tick counts to projected coordinates.
    ///
    /// Ticks must belong to a strobe within one sweep window; nothing is clamped.
    pub fn to_projected(&self, ticks: &StrobeTicks) -> ProjectedPoints {
        let mut projected = [0.0; HOMOGRAPHY_DIM];
        for (i, slot) in projected.iter_mut().enumerate() {
            *slot = self.sweep_angle_deg(i, ticks.0[i]).to_radians().tan();
        }
        ProjectedPoints(projected)
    }

    /// Tick counts that would produce `projected`, rounded to the nearest tick.
    pub fn to_ticks(&self, projected: &ProjectedPoints) -> StrobeTicks {
        let mut ticks = [0u32; HOMOGRAPHY_DIM];
        for (i, slot) in ticks.iter_mut().enumerate() {
            let angle = projected.0[i].atan().to_degrees();
            let swept = if i % 2 == 0 {
                HORIZONTAL_OFFSET_DEG - angle
            } else {
                angle - VERTICAL_OFFSET_DEG
            };
            let elapsed = swept / self.degrees_per_second();
            *slot = (elapsed * self.tick_rate_hz).round().max(0.0) as u32;
        }
        StrobeTicks(ticks)
    }
}

impl Default for SweepModel {
    fn default() -> Self {
        Self::from_config(&PoseConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_quarter_window_is_centred() {
        // A quarter of a 60 Hz period: horizontal and vertical both hit 0°.
        let model = SweepModel::default();
        let quarter = (48_000_000.0 / 60.0 / 4.0) as u32;
        let projected = model.to_projected(&StrobeTicks([quarter; HOMOGRAPHY_DIM]));
        for value in projected.0.iter() {
            assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_axis_sign_conventions() {
        let model = SweepModel::default();
        let quarter = (48_000_000.0 / 60.0 / 4.0) as u32;
        let later = StrobeTicks([quarter + 1000; HOMOGRAPHY_DIM]);
        let projected = model.to_projected(&later);
        // Later hits move horizontal projections down and vertical ones up.
        assert!(projected.0[0] < 0.0);
        assert!(projected.0[1] > 0.0);
    }

    #[test]
    fn test_ticks_inverse() {
        let model = SweepModel::default();
        let projected = ProjectedPoints([-0.12, 0.05, 0.08, 0.06, 0.09, -0.04, -0.11, -0.03]);
        let ticks = model.to_ticks(&projected);
        let back = model.to_projected(&ticks);
        for (a, b) in projected.0.iter().zip(back.0.iter()) {
            // one tick is 0.00045°
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }
}
