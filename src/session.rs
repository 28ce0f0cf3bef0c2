//! Recorded tracking sessions (`.json` or `.json.gz`).

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::sensors::SimulatedImu;
use crate::types::{ImuSample, StrobeTicks};

/// One optical pose cycle as captured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrobeFrame {
    /// Seconds since session start
    pub timestamp: f64,
    pub ticks: StrobeTicks,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionLog {
    /// IMU sample period [s]; replays fall back to the configured period
    #[serde(default)]
    pub sample_period: Option<f64>,
    #[serde(default)]
    pub imu: Vec<ImuSample>,
    #[serde(default)]
    pub strobes: Vec<StrobeFrame>,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

impl SessionLog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let parsed: serde_json::Result<Self> = if is_gzip(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
        } else {
            serde_json::from_reader(BufReader::new(file))
        };
        parsed.with_context(|| format!("parsing {}", path.display()))
    }

    /// Write the session, gzip-compressed when the path ends in `.gz`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(file, Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// IMU feed that replays the recorded samples at a fixed period.
    pub fn imu_feed(&self, default_period: f64) -> SimulatedImu {
        SimulatedImu::new(self.imu.clone(), self.sample_period.unwrap_or(default_period))
    }

    pub fn duration_secs(&self, default_period: f64) -> f64 {
        self.imu.len() as f64 * self.sample_period.unwrap_or(default_period)
    }

    /// Samples left to track once calibration has consumed its share, or
    /// `None` when the log is too short to calibrate from.
    pub fn samples_after_calibration(&self, calibration_samples: usize) -> Option<usize> {
        self.imu.len().checked_sub(calibration_samples).filter(|&n| n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ImuSource;

    fn sample_log() -> SessionLog {
        SessionLog {
            sample_period: Some(0.004),
            imu: vec![
                ImuSample::new([0.1, 0.2, 0.3], [0.0, 1.0, 0.0]),
                ImuSample::new([0.4, 0.5, 0.6], [0.0, 0.9, 0.1]),
            ],
            strobes: vec![StrobeFrame {
                timestamp: 0.5,
                ticks: StrobeTicks([1, 2, 3, 4, 5, 6, 7, 8]),
            }],
        }
    }

    #[test]
    fn test_save_and_load_plain_and_gzip() {
        let dir = std::env::temp_dir();
        for name in ["pose_tracker_session_test.json", "pose_tracker_session_test.json.gz"] {
            let path = dir.join(name);
            let log = sample_log();
            log.save(&path).unwrap();
            let back = SessionLog::load(&path).unwrap();
            assert_eq!(back.imu, log.imu);
            assert_eq!(back.strobes, log.strobes);
            assert_eq!(back.sample_period, Some(0.004));
            let _ = std::fs::remove_file(&path);
        }
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let log: SessionLog = serde_json::from_str(r#"{ "imu": [] }"#).unwrap();
        assert!(log.strobes.is_empty());
        assert!(log.sample_period.is_none());
        assert_eq!(log.duration_secs(0.002), 0.0);
    }

    #[test]
    fn test_short_log_cannot_calibrate() {
        let log = sample_log();
        assert_eq!(log.samples_after_calibration(1), Some(1));
        assert_eq!(log.samples_after_calibration(2), None);
        assert_eq!(log.samples_after_calibration(1000), None);
        assert_eq!(log.duration_secs(0.002), 2.0 * 0.004);
    }

    #[test]
    fn test_imu_feed_uses_recorded_period() {
        let log = sample_log();
        let mut feed = log.imu_feed(0.002);
        assert_eq!(feed.fixed_period(), Some(0.004));
        assert_eq!(feed.read(), Some(log.imu[0]));
    }
}
