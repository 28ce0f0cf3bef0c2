use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{TrackResult, TrackingError};
use crate::types::ReferencePoints;

// ─── Inertial pipeline ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Complementary filter weight on the gyro estimate (0..=1)
    pub imu_filter_alpha: f64,
    /// Any gyro axis below this (deg/s) skips the quaternion gyro step
    pub gyro_threshold: f64,
    /// Successful reads collected by the bias calibration
    pub calibration_samples: usize,
    /// Fixed sample period for simulated/replayed feeds [s]
    pub simulation_period_secs: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            imu_filter_alpha: 0.9,
            gyro_threshold: 1e-8,
            calibration_samples: 1000,
            simulation_period_secs: 0.002,
        }
    }
}

// ─── Optical pipeline ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Tick counter frequency of the capture timer [Hz]
    pub tick_rate_hz: f64,
    /// Rotor revolutions per second of the base station
    pub sweep_hz: f64,
    /// Photodiode layout on the board
    pub reference_points: ReferencePoints,
    /// Reject the homography system when σ_min/σ_max falls below this
    pub singular_tolerance: f64,
    /// Max deviation of RᵀR from identity accepted by the pose estimator
    pub orthonormal_tolerance: f64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 48_000_000.0,
            sweep_hz: 60.0,
            reference_points: ReferencePoints::default(),
            singular_tolerance: 1e-12,
            orthonormal_tolerance: 1e-6,
        }
    }
}

// ─── Top level ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub pose: PoseConfig,
}

impl Config {
    /// Load a JSON config; missing fields keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> TrackResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| TrackingError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| TrackingError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackResult<()> {
        let alpha = self.tracker.imu_filter_alpha;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(TrackingError::Config(format!(
                "imu_filter_alpha must be within [0, 1], got {}",
                alpha
            )));
        }
        if self.tracker.calibration_samples == 0 {
            return Err(TrackingError::Config("calibration_samples must be > 0".to_string()));
        }
        if self.tracker.simulation_period_secs <= 0.0 {
            return Err(TrackingError::Config("simulation_period_secs must be > 0".to_string()));
        }
        if self.pose.tick_rate_hz <= 0.0 || self.pose.sweep_hz <= 0.0 {
            return Err(TrackingError::Config(
                "tick_rate_hz and sweep_hz must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
