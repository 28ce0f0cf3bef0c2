use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pose::PoseSnapshot;
use crate::tracker::{OrientationSnapshot, OrientationTracker};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub imu_samples: u64,
    pub imu_unavailable: u64,
    pub gyro_skips: u64,
    pub tilt_skips: u64,
    pub calibration_complete: bool,
    pub orientation: Option<OrientationSnapshot>,
    // Optical pipeline
    pub pose_frames: u64,
    pub degenerate_frames: u64,
    pub last_pose: Option<PoseSnapshot>,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds: 0,
            imu_samples: 0,
            imu_unavailable: 0,
            gyro_skips: 0,
            tilt_skips: 0,
            calibration_complete: false,
            orientation: None,
            pose_frames: 0,
            degenerate_frames: 0,
            last_pose: None,
        }
    }

    /// Copy the tracker's current view into the status.
    pub fn record_tracker(&mut self, tracker: &OrientationTracker) {
        self.timestamp = current_timestamp();
        self.imu_samples = tracker.samples_processed();
        self.calibration_complete = tracker.calibration().is_some();
        self.orientation = Some(tracker.snapshot());
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
