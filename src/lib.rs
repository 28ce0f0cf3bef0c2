//! Pose and orientation tracking for a strobe-swept photodiode board with an IMU.
//!
//! Optical: strobe ticks → projections → planar homography → rotation and
//! translation (`pose`). Inertial: gyro/accel samples → flatland roll, euler
//! tilt and two quaternion tracks (`tracker`).

pub mod calibration;
pub mod config;
pub mod error;
pub mod filters;
pub mod live_status;
pub mod pose;
pub mod quaternion;
pub mod sensors;
pub mod session;
pub mod tracker;
pub mod types;

pub use calibration::{BiasCalibrator, BiasVariance, Calibration};
pub use config::{Config, PoseConfig, TrackerConfig};
pub use error::{TrackResult, TrackingError};
pub use pose::{Pose, PoseEstimator};
pub use sensors::{Clock, ImuSource, ManualClock, SimulatedImu, SyntheticImu, SystemClock};
pub use tracker::{OrientationTracker, TrackerEvent, TrackerState};
pub use types::{ImuSample, ReferencePoints, StrobeTicks};
