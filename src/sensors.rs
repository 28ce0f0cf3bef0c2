use std::cell::Cell;
use std::f64::consts::PI;
use std::time::Instant;

use nalgebra::UnitQuaternion;

use crate::error::{TrackResult, TrackingError};
use crate::quaternion;
use crate::types::{ImuSample, Vec3};

/// Anything that can hand the tracker one IMU reading per cycle.
pub trait ImuSource {
    fn init(&mut self) -> TrackResult<()> {
        Ok(())
    }

    /// Next sample, or `None` when nothing new is available yet.
    fn read(&mut self) -> Option<ImuSample>;

    /// Sample period [s] for deterministic feeds; wall-clock timing is used when `None`.
    fn fixed_period(&self) -> Option<f64> {
        None
    }
}

/// Monotonic microsecond clock.
pub trait Clock {
    fn micros(&self) -> u64;
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Clock advanced by hand, for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self { now_us: Cell::new(start_us) }
    }

    pub fn set(&self, now_us: u64) {
        self.now_us.set(now_us);
    }

    pub fn advance(&self, delta_us: u64) {
        self.now_us.set(self.now_us.get() + delta_us);
    }
}

impl Clock for ManualClock {
    fn micros(&self) -> u64 {
        self.now_us.get()
    }
}

// ─── Recorded feed ───────────────────────────────────────────────────────────

/// Plays a buffered sequence round-robin at a fixed period.
pub struct SimulatedImu {
    samples: Vec<ImuSample>,
    cursor: usize,
    period: f64,
}

impl SimulatedImu {
    pub fn new(samples: Vec<ImuSample>, period: f64) -> Self {
        Self {
            samples,
            cursor: 0,
            period,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Index of the sample returned by the next `read`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl ImuSource for SimulatedImu {
    fn init(&mut self) -> TrackResult<()> {
        if self.samples.is_empty() {
            return Err(TrackingError::SensorFailed("simulation buffer is empty".to_string()));
        }
        if !(self.period > 0.0) {
            return Err(TrackingError::SensorFailed(format!(
                "invalid simulation period {}",
                self.period
            )));
        }
        Ok(())
    }

    fn read(&mut self) -> Option<ImuSample> {
        let sample = *self.samples.get(self.cursor)?;
        self.cursor = (self.cursor + 1) % self.samples.len();
        Some(sample)
    }

    fn fixed_period(&self) -> Option<f64> {
        Some(self.period)
    }
}

// ─── Synthetic feed ──────────────────────────────────────────────────────────

/// Deterministic mock IMU: stationary for a while, then an oscillating
/// rotation about `axis`. Accel is the reaction to gravity seen in the body
/// frame, with a small ripple; gyro carries a constant bias.
pub struct SyntheticImu {
    axis: Vec3,
    amplitude_dps: f64,
    frequency_hz: f64,
    gyro_bias: Vec3,
    period: f64,
    stationary_reads: u64,
    reads: u64,
    truth: UnitQuaternion<f64>,
}

impl SyntheticImu {
    pub fn new(period: f64, stationary_reads: u64) -> Self {
        Self {
            axis: Vec3::new(0.3, 0.2, 1.0).normalize(),
            amplitude_dps: 45.0,
            frequency_hz: 0.5,
            gyro_bias: Vec3::new(0.4, -0.3, 0.2),
            period,
            stationary_reads,
            reads: 0,
            truth: UnitQuaternion::identity(),
        }
    }

    pub fn with_motion(mut self, axis: Vec3, amplitude_dps: f64, frequency_hz: f64) -> Self {
        self.axis = axis.try_normalize(quaternion::QUAT_NORM_EPS).unwrap_or_else(Vec3::z);
        self.amplitude_dps = amplitude_dps;
        self.frequency_hz = frequency_hz;
        self
    }

    pub fn with_gyro_bias(mut self, bias: Vec3) -> Self {
        self.gyro_bias = bias;
        self
    }

    pub fn gyro_bias(&self) -> Vec3 {
        self.gyro_bias
    }

    /// Orientation the device actually has after the last read.
    pub fn truth(&self) -> UnitQuaternion<f64> {
        self.truth
    }

    fn rate_dps(&self, t: f64) -> Vec3 {
        self.axis * self.amplitude_dps * (2.0 * PI * self.frequency_hz * t).sin()
    }
}

impl ImuSource for SyntheticImu {
    fn read(&mut self) -> Option<ImuSample> {
        self.reads += 1;

        let rate = if self.reads > self.stationary_reads {
            let t = (self.reads - self.stationary_reads) as f64 * self.period;
            self.rate_dps(t)
        } else {
            Vec3::zeros()
        };

        let omega = rate.map(f64::to_radians);
        if let Some(step) = quaternion::from_angle_axis(omega.norm() * self.period, &omega) {
            self.truth = quaternion::renormalized(self.truth * step);
        }

        let t = self.reads as f64 * self.period;
        let ripple = Vec3::new((t * 2.0 * PI).sin(), (t * PI).cos(), (t * 3.0).sin()) * 1e-3;
        let acc = self.truth.inverse_transform_vector(&Vec3::y()) + ripple;
        let gyr = rate + self.gyro_bias;

        Some(ImuSample::new([gyr.x, gyr.y, gyr.z], [acc.x, acc.y, acc.z]))
    }

    fn fixed_period(&self) -> Option<f64> {
        Some(self.period)
    }
}
