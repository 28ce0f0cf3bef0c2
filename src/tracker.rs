//! IMU orientation tracker.
//!
//! Owns every piece of inertial state: bias calibration, timing, the flatland
//! roll estimates, the accelerometer euler estimate, and the two quaternion
//! tracks (pure gyro and complementary). One instance per device, driven by
//! the caller's control loop.

use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

use crate::calibration::{BiasCalibrator, BiasSnapshot, BiasVariance, Calibration};
use crate::config::TrackerConfig;
use crate::error::{TrackResult, TrackingError};
use crate::filters::complementary::{self, TiltSkip};
use crate::quaternion;
use crate::sensors::{Clock, ImuSource};
use crate::types::{ImuSample, Vec3};

/// Tracker state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerState {
    /// Created, sensor not initialised
    Uninitialized,
    /// Sampling the stationary sensor for bias
    Calibrating,
    /// Processing samples
    Tracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuaternionTrack {
    Gyro,
    Complementary,
}

/// Non-fatal things that happened during one `process_imu` cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerEvent {
    /// Gyro rate below threshold on some axis, the track kept its value
    GyroUpdateSkipped { track: QuaternionTrack },
    /// Complementary track kept its gyro prediction without tilt correction
    TiltCorrectionSkipped { reason: TiltSkip },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationState {
    pub flatland_roll_gyr: f64,
    pub flatland_roll_acc: f64,
    pub flatland_roll_comp: f64,
    pub quaternion_gyr: UnitQuaternion<f64>,
    pub quaternion_comp: UnitQuaternion<f64>,
    /// (pitch, 0, roll) in degrees
    pub euler_acc: Vec3,
    pub previous_sample_us: u64,
    /// Seconds between the last two processed samples
    pub delta_t: f64,
}

impl Default for OrientationState {
    fn default() -> Self {
        Self {
            flatland_roll_gyr: 0.0,
            flatland_roll_acc: 0.0,
            flatland_roll_comp: 0.0,
            quaternion_gyr: UnitQuaternion::identity(),
            quaternion_comp: UnitQuaternion::identity(),
            euler_acc: Vec3::zeros(),
            previous_sample_us: 0,
            delta_t: 0.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrientationSnapshot {
    pub state: TrackerState,
    pub flatland_roll_gyr: f64,
    pub flatland_roll_acc: f64,
    pub flatland_roll_comp: f64,
    /// Quaternion (w, x, y, z)
    pub quaternion_gyr: (f64, f64, f64, f64),
    /// Quaternion (w, x, y, z)
    pub quaternion_comp: (f64, f64, f64, f64),
    pub euler_acc: (f64, f64, f64),
    pub delta_t: f64,
    pub samples_processed: u64,
    pub calibration: Option<BiasSnapshot>,
}

pub struct OrientationTracker {
    config: TrackerConfig,
    state: TrackerState,
    calibration: Option<BiasVariance>,
    orientation: OrientationState,
    samples_processed: u64,
}

impl OrientationTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: TrackerState::Uninitialized,
            calibration: None,
            orientation: OrientationState::default(),
            samples_processed: 0,
        }
    }

    /// Initialise the sensor, calibrate it and start tracking.
    ///
    /// Blocks for the whole calibration capture. A sensor that fails to
    /// initialise leaves the tracker `Uninitialized`.
    pub fn init<S, C>(&mut self, source: &mut S, clock: &C) -> TrackResult<Calibration>
    where
        S: ImuSource + ?Sized,
        C: Clock + ?Sized,
    {
        source.init().map_err(|e| match e {
            TrackingError::SensorFailed(_) => e,
            other => TrackingError::SensorFailed(other.to_string()),
        })?;

        self.state = TrackerState::Calibrating;
        log::info!(
            "calibrating IMU bias over {} samples, keep the device still",
            self.config.calibration_samples
        );
        let calibration = BiasCalibrator::from_config(&self.config).measure(source);

        self.calibration = Some(calibration.bias);
        self.orientation.previous_sample_us = clock.micros();
        self.state = TrackerState::Tracking;
        Ok(calibration)
    }

    /// Start tracking with a known calibration, skipping the capture.
    pub fn set_bias<C: Clock + ?Sized>(&mut self, bias: BiasVariance, clock: &C) {
        self.calibration = Some(bias);
        self.orientation.previous_sample_us = clock.micros();
        self.state = TrackerState::Tracking;
    }

    /// Zero all orientation estimates. State and calibration are kept.
    pub fn reset(&mut self) {
        self.orientation = OrientationState {
            previous_sample_us: self.orientation.previous_sample_us,
            ..OrientationState::default()
        };
    }

    /// Read one sample and advance every estimate.
    pub fn process_imu<S, C>(&mut self, source: &mut S, clock: &C) -> TrackResult<Vec<TrackerEvent>>
    where
        S: ImuSource + ?Sized,
        C: Clock + ?Sized,
    {
        if self.state != TrackerState::Tracking {
            return Err(TrackingError::InvalidState(format!(
                "process_imu requires Tracking, tracker is {:?}",
                self.state
            )));
        }

        let sample = source.read().ok_or(TrackingError::SensorUnavailable)?;

        let now = clock.micros();
        let dt = match source.fixed_period() {
            Some(period) => period,
            None => now.saturating_sub(self.orientation.previous_sample_us) as f64 / 1e6,
        };
        self.orientation.previous_sample_us = now;

        Ok(self.update_orientation(&sample, dt))
    }

    fn update_orientation(&mut self, sample: &ImuSample, dt: f64) -> Vec<TrackerEvent> {
        let bias = self.calibration.unwrap_or_else(BiasVariance::zero);
        let gyr = bias.correct_gyr(sample);
        let acc = sample.acc();
        let alpha = self.config.imu_filter_alpha;
        let threshold = self.config.gyro_threshold;
        let o = &mut self.orientation;
        let mut events = Vec::new();

        o.delta_t = dt;

        o.flatland_roll_gyr = complementary::flatland_roll_gyr(o.flatland_roll_gyr, gyr.z, dt);
        o.flatland_roll_acc = complementary::flatland_roll_acc(&acc);
        o.flatland_roll_comp =
            complementary::flatland_roll_comp(o.flatland_roll_comp, gyr.z, o.flatland_roll_acc, dt, alpha);

        o.euler_acc = complementary::euler_acc(&acc);

        match step_track(&o.quaternion_gyr, &gyr, dt, threshold, QuaternionTrack::Gyro) {
            Ok(q) => o.quaternion_gyr = q,
            Err(event) => events.push(event),
        }

        let predicted = match step_track(&o.quaternion_comp, &gyr, dt, threshold, QuaternionTrack::Complementary) {
            Ok(q) => q,
            Err(event) => {
                events.push(event);
                o.quaternion_comp
            }
        };
        o.quaternion_comp = match complementary::tilt_correct(&predicted, &acc, alpha) {
            Ok(q) => q,
            Err(reason) => {
                log::trace!("tilt correction skipped: {:?}", reason);
                events.push(TrackerEvent::TiltCorrectionSkipped { reason });
                predicted
            }
        };

        self.samples_processed += 1;
        events
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn calibration(&self) -> Option<&BiasVariance> {
        self.calibration.as_ref()
    }

    pub fn orientation(&self) -> &OrientationState {
        &self.orientation
    }

    pub fn quaternion_gyr(&self) -> UnitQuaternion<f64> {
        self.orientation.quaternion_gyr
    }

    pub fn quaternion_comp(&self) -> UnitQuaternion<f64> {
        self.orientation.quaternion_comp
    }

    pub fn flatland_roll_gyr(&self) -> f64 {
        self.orientation.flatland_roll_gyr
    }

    pub fn flatland_roll_acc(&self) -> f64 {
        self.orientation.flatland_roll_acc
    }

    pub fn flatland_roll_comp(&self) -> f64 {
        self.orientation.flatland_roll_comp
    }

    pub fn euler_acc(&self) -> Vec3 {
        self.orientation.euler_acc
    }

    pub fn delta_t(&self) -> f64 {
        self.orientation.delta_t
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    pub fn snapshot(&self) -> OrientationSnapshot {
        let o = &self.orientation;
        OrientationSnapshot {
            state: self.state,
            flatland_roll_gyr: o.flatland_roll_gyr,
            flatland_roll_acc: o.flatland_roll_acc,
            flatland_roll_comp: o.flatland_roll_comp,
            quaternion_gyr: quaternion::to_tuple(&o.quaternion_gyr),
            quaternion_comp: quaternion::to_tuple(&o.quaternion_comp),
            euler_acc: (o.euler_acc.x, o.euler_acc.y, o.euler_acc.z),
            delta_t: o.delta_t,
            samples_processed: self.samples_processed,
            calibration: self.calibration.as_ref().map(BiasVariance::snapshot),
        }
    }
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

/// Gyro step for one track, with the skip reported as an event.
fn step_track(
    q: &UnitQuaternion<f64>,
    gyr: &Vec3,
    dt: f64,
    threshold: f64,
    track: QuaternionTrack,
) -> Result<UnitQuaternion<f64>, TrackerEvent> {
    match complementary::integrate_gyro(q, gyr, dt, threshold) {
        Ok(Some(next)) => Ok(next),
        Ok(None) => Err(TrackerEvent::GyroUpdateSkipped { track }),
        Err(e) => {
            log::warn!("{:?} track kept its value: {}", track, e);
            Err(TrackerEvent::GyroUpdateSkipped { track })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{ManualClock, SimulatedImu};
    use approx::assert_abs_diff_eq;
    use std::collections::VecDeque;

    /// Hands out queued samples, then nothing.
    #[derive(Default)]
    struct ScriptedImu {
        queue: VecDeque<ImuSample>,
    }

    impl ImuSource for ScriptedImu {
        fn read(&mut self) -> Option<ImuSample> {
            self.queue.pop_front()
        }
    }

    fn tracking(config: TrackerConfig) -> (OrientationTracker, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let mut tracker = OrientationTracker::new(config);
        tracker.set_bias(BiasVariance::zero(), &clock);
        (tracker, clock)
    }

    #[test]
    fn test_process_before_init_is_invalid() {
        let mut tracker = OrientationTracker::default();
        assert_eq!(tracker.state(), TrackerState::Uninitialized);

        let mut imu = ScriptedImu::default();
        let err = tracker.process_imu(&mut imu, &ManualClock::new(0)).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidState(_)));
    }

    #[test]
    fn test_init_calibrates_and_tracks() {
        let sample = ImuSample::new([0.5, -0.25, 1.0], [0.0, 1.0, 0.0]);
        let mut imu = SimulatedImu::new(vec![sample], 0.002);
        let clock = ManualClock::new(42);
        let mut tracker = OrientationTracker::default();

        let cal = tracker.init(&mut imu, &clock).unwrap();
        assert_eq!(cal.samples, 1000);
        assert_eq!(tracker.state(), TrackerState::Tracking);
        assert_eq!(tracker.calibration().unwrap().gyr_bias, sample.gyr());
        assert_eq!(tracker.orientation().previous_sample_us, 42);

        // Bias-corrected gyro is zero: both tracks skip, roll stays put.
        let events = tracker.process_imu(&mut imu, &clock).unwrap();
        assert!(events.contains(&TrackerEvent::GyroUpdateSkipped {
            track: QuaternionTrack::Gyro
        }));
        assert!(events.contains(&TrackerEvent::GyroUpdateSkipped {
            track: QuaternionTrack::Complementary
        }));
        assert_eq!(tracker.flatland_roll_gyr(), 0.0);
        assert_eq!(tracker.quaternion_gyr(), UnitQuaternion::identity());
    }

    #[test]
    fn test_init_failure_stays_uninitialized() {
        let mut imu = SimulatedImu::new(Vec::new(), 0.002);
        let mut tracker = OrientationTracker::default();
        let err = tracker.init(&mut imu, &ManualClock::new(0)).unwrap_err();
        assert!(matches!(err, TrackingError::SensorFailed(_)));
        assert_eq!(tracker.state(), TrackerState::Uninitialized);
        assert!(tracker.calibration().is_none());
    }

    #[test]
    fn test_no_sample_leaves_state_untouched() {
        let (mut tracker, clock) = tracking(TrackerConfig::default());
        let mut imu = ScriptedImu::default();
        clock.advance(10_000);

        let before = *tracker.orientation();
        let err = tracker.process_imu(&mut imu, &clock).unwrap_err();
        assert_eq!(err, TrackingError::SensorUnavailable);
        assert_eq!(*tracker.orientation(), before);
        assert_eq!(tracker.samples_processed(), 0);
    }

    #[test]
    fn test_delta_t_from_clock() {
        let (mut tracker, clock) = tracking(TrackerConfig::default());
        let mut imu = ScriptedImu::default();
        imu.queue.push_back(ImuSample::new([0.0, 0.0, 10.0], [0.0, 1.0, 0.0]));
        imu.queue.push_back(ImuSample::new([0.0, 0.0, 10.0], [0.0, 1.0, 0.0]));

        clock.advance(5_000);
        tracker.process_imu(&mut imu, &clock).unwrap();
        assert_abs_diff_eq!(tracker.delta_t(), 0.005, epsilon = 1e-15);
        assert_abs_diff_eq!(tracker.flatland_roll_gyr(), 0.05, epsilon = 1e-12);

        clock.advance(20_000);
        tracker.process_imu(&mut imu, &clock).unwrap();
        assert_abs_diff_eq!(tracker.delta_t(), 0.02, epsilon = 1e-15);
        assert_abs_diff_eq!(tracker.flatland_roll_gyr(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_fixed_period_overrides_clock() {
        let (mut tracker, clock) = tracking(TrackerConfig::default());
        let mut imu = SimulatedImu::new(vec![ImuSample::new([0.0, 0.0, 5.0], [0.0, 1.0, 0.0])], 0.002);
        clock.advance(123_456);
        tracker.process_imu(&mut imu, &clock).unwrap();
        assert_eq!(tracker.delta_t(), 0.002);
        assert_eq!(tracker.orientation().previous_sample_us, 1_123_456);
    }

    #[test]
    fn test_bias_is_removed_from_gyro() {
        let clock = ManualClock::new(0);
        let mut tracker = OrientationTracker::default();
        let bias = BiasVariance {
            gyr_bias: Vec3::new(0.0, 0.0, 2.0),
            ..BiasVariance::zero()
        };
        tracker.set_bias(bias, &clock);

        let mut imu = SimulatedImu::new(vec![ImuSample::new([0.0, 0.0, 2.0], [0.0, 1.0, 0.0])], 0.01);
        for _ in 0..10 {
            tracker.process_imu(&mut imu, &clock).unwrap();
        }
        assert_eq!(tracker.flatland_roll_gyr(), 0.0);
        assert_eq!(tracker.flatland_roll_comp(), 0.0);
    }

    #[test]
    fn test_static_tilt_converges() {
        let (mut tracker, clock) = tracking(TrackerConfig::default());
        let tilt = 20f64.to_radians();
        let acc = [tilt.sin(), tilt.cos(), 0.0];
        let mut imu = SimulatedImu::new(vec![ImuSample::new([0.0, 0.0, 0.0], acc)], 0.002);

        for _ in 0..500 {
            tracker.process_imu(&mut imu, &clock).unwrap();
        }

        assert_abs_diff_eq!(tracker.flatland_roll_acc(), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(tracker.flatland_roll_comp(), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(tracker.euler_acc(), Vec3::new(0.0, 0.0, 20.0), epsilon = 1e-9);

        // gyro track never moved, complementary track pulled acc onto up
        assert_eq!(tracker.quaternion_gyr(), UnitQuaternion::identity());
        let q = tracker.quaternion_comp();
        let up = quaternion::rotate(&q, &Vec3::new(acc[0], acc[1], acc[2]));
        assert_abs_diff_eq!(up, complementary::world_up(), epsilon = 1e-9);
        assert_abs_diff_eq!(q.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_complementary_track_follows_own_prediction() {
        let (mut tracker, clock) = tracking(TrackerConfig::default());
        let gyr = Vec3::new(12.0, -7.0, 20.0);
        let acc = Vec3::new(0.3, 0.9, 0.2);
        let mut imu = SimulatedImu::new(vec![ImuSample::new([12.0, -7.0, 20.0], [0.3, 0.9, 0.2])], 0.002);
        let alpha = tracker.config().imu_filter_alpha;
        let threshold = tracker.config().gyro_threshold;

        for _ in 0..25 {
            let prev = tracker.quaternion_comp();
            let events = tracker.process_imu(&mut imu, &clock).unwrap();
            assert!(events.is_empty());

            let predicted = complementary::integrate_gyro(&prev, &gyr, 0.002, threshold)
                .unwrap()
                .unwrap();
            let expected = complementary::tilt_correct(&predicted, &acc, alpha).unwrap();
            let q = tracker.quaternion_comp();
            assert_abs_diff_eq!(q.w, expected.w, epsilon = 1e-15);
            assert_abs_diff_eq!(q.i, expected.i, epsilon = 1e-15);
            assert_abs_diff_eq!(q.j, expected.j, epsilon = 1e-15);
            assert_abs_diff_eq!(q.k, expected.k, epsilon = 1e-15);
        }

        // tilt correction pulled the complementary track away from pure gyro
        assert!(tracker.quaternion_comp().angle_to(&tracker.quaternion_gyr()) > 1e-4);
    }

    #[test]
    fn test_non_finite_gyro_keeps_tracks() {
        let (mut tracker, clock) = tracking(TrackerConfig::default());
        let mut imu = ScriptedImu::default();
        imu.queue.push_back(ImuSample::new([10.0, 10.0, 10.0], [0.0, 1.0, 0.0]));
        imu.queue.push_back(ImuSample::new([f64::NAN, 10.0, 10.0], [0.0, 1.0, 0.0]));

        clock.advance(2_000);
        tracker.process_imu(&mut imu, &clock).unwrap();
        let before_gyr = tracker.quaternion_gyr();

        clock.advance(2_000);
        let events = tracker.process_imu(&mut imu, &clock).unwrap();
        assert!(events.contains(&TrackerEvent::GyroUpdateSkipped {
            track: QuaternionTrack::Gyro
        }));
        assert!(events.contains(&TrackerEvent::GyroUpdateSkipped {
            track: QuaternionTrack::Complementary
        }));
        assert_eq!(tracker.quaternion_gyr(), before_gyr);
        let comp = tracker.quaternion_comp();
        assert!(comp.coords.iter().all(|c| c.is_finite()));
        assert_abs_diff_eq!(comp.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_keeps_state() {
        let (mut tracker, clock) = tracking(TrackerConfig::default());
        let mut imu = SimulatedImu::new(
            vec![ImuSample::new([3.0, -2.0, 15.0], [0.1, 0.95, 0.2])],
            0.002,
        );
        for _ in 0..20 {
            tracker.process_imu(&mut imu, &clock).unwrap();
        }
        assert!(tracker.flatland_roll_gyr() != 0.0);
        assert!(tracker.quaternion_gyr().angle() > 0.0);

        tracker.reset();
        let o = tracker.orientation();
        assert_eq!(o.flatland_roll_gyr, 0.0);
        assert_eq!(o.flatland_roll_acc, 0.0);
        assert_eq!(o.flatland_roll_comp, 0.0);
        assert_eq!(o.euler_acc, Vec3::zeros());
        assert_eq!(o.quaternion_gyr, UnitQuaternion::identity());
        assert_eq!(o.quaternion_comp, UnitQuaternion::identity());
        assert_eq!(tracker.state(), TrackerState::Tracking);
        assert!(tracker.calibration().is_some());
    }

    #[test]
    fn test_snapshot_serializes() {
        let (tracker, _clock) = tracking(TrackerConfig::default());
        let snap = tracker.snapshot();
        assert_eq!(snap.quaternion_comp, (1.0, 0.0, 0.0, 0.0));
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["state"], "Tracking");
        assert!(json["calibration"].is_object());
    }
}
