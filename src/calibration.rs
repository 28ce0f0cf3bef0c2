use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::sensors::ImuSource;
use crate::types::{ImuSample, Vec3};

/// Per-axis mean and population variance of a stationary capture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiasVariance {
    pub gyr_bias: Vec3,
    pub gyr_variance: Vec3,
    pub acc_bias: Vec3,
    pub acc_variance: Vec3,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BiasSnapshot {
    pub gyr_bias: (f64, f64, f64),
    pub gyr_variance: (f64, f64, f64),
    pub acc_bias: (f64, f64, f64),
    pub acc_variance: (f64, f64, f64),
}

impl BiasVariance {
    pub fn zero() -> Self {
        Self {
            gyr_bias: Vec3::zeros(),
            gyr_variance: Vec3::zeros(),
            acc_bias: Vec3::zeros(),
            acc_variance: Vec3::zeros(),
        }
    }

    /// Gyro reading with the bias removed. Accel is used raw.
    pub fn correct_gyr(&self, sample: &ImuSample) -> Vec3 {
        sample.gyr() - self.gyr_bias
    }

    pub fn snapshot(&self) -> BiasSnapshot {
        let t = |v: &Vec3| (v.x, v.y, v.z);
        BiasSnapshot {
            gyr_bias: t(&self.gyr_bias),
            gyr_variance: t(&self.gyr_variance),
            acc_bias: t(&self.acc_bias),
            acc_variance: t(&self.acc_variance),
        }
    }
}

impl From<BiasSnapshot> for BiasVariance {
    fn from(s: BiasSnapshot) -> Self {
        let v = |t: (f64, f64, f64)| Vec3::new(t.0, t.1, t.2);
        Self {
            gyr_bias: v(s.gyr_bias),
            gyr_variance: v(s.gyr_variance),
            acc_bias: v(s.acc_bias),
            acc_variance: v(s.acc_variance),
        }
    }
}

/// Outcome of one calibration run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub bias: BiasVariance,
    pub samples: usize,
    /// Reads that returned nothing and were retried
    pub failed_reads: u64,
}

/// Running mean/variance (Welford).
#[derive(Clone, Copy, Debug)]
struct RunningStats {
    n: usize,
    mean: Vec3,
    m2: Vec3,
}

impl RunningStats {
    fn new() -> Self {
        Self {
            n: 0,
            mean: Vec3::zeros(),
            m2: Vec3::zeros(),
        }
    }

    fn push(&mut self, x: &Vec3) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta.component_mul(&(x - self.mean));
    }

    fn variance(&self) -> Vec3 {
        if self.n == 0 {
            return Vec3::zeros();
        }
        self.m2 / self.n as f64
    }
}

/// Samples a stationary IMU to estimate sensor offsets and noise.
#[derive(Clone, Copy, Debug)]
pub struct BiasCalibrator {
    samples: usize,
}

impl BiasCalibrator {
    pub fn new(samples: usize) -> Self {
        Self { samples: samples.max(1) }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.calibration_samples)
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Block until `samples` successful reads were collected.
    ///
    /// Empty reads are retried without consuming a slot. The device must be
    /// held still for the whole capture.
    pub fn measure<S: ImuSource + ?Sized>(&self, source: &mut S) -> Calibration {
        let mut gyr = RunningStats::new();
        let mut acc = RunningStats::new();
        let mut failed_reads = 0u64;

        while gyr.n < self.samples {
            let Some(sample) = source.read() else {
                failed_reads += 1;
                continue;
            };
            gyr.push(&sample.gyr());
            acc.push(&sample.acc());

            if gyr.n % 100 == 0 {
                log::debug!("calibration {}/{} samples", gyr.n, self.samples);
            }
        }

        let bias = BiasVariance {
            gyr_bias: gyr.mean,
            gyr_variance: gyr.variance(),
            acc_bias: acc.mean,
            acc_variance: acc.variance(),
        };
        log::info!(
            "IMU calibrated over {} samples ({} retries): gyro bias [{:.4}, {:.4}, {:.4}] deg/s",
            self.samples,
            failed_reads,
            bias.gyr_bias.x,
            bias.gyr_bias.y,
            bias.gyr_bias.z
        );

        Calibration {
            bias,
            samples: self.samples,
            failed_reads,
        }
    }
}

impl Default for BiasCalibrator {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}
