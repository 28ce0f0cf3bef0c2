pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// One raw IMU reading. Gyro in deg/s, accel in g.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    pub gyr_x: f64,
    pub gyr_y: f64,
    pub gyr_z: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
}

impl ImuSample {
    pub fn new(gyr: [f64; 3], acc: [f64; 3]) -> Self {
        Self {
            gyr_x: gyr[0],
            gyr_y: gyr[1],
            gyr_z: gyr[2],
            acc_x: acc[0],
            acc_y: acc[1],
            acc_z: acc[2],
        }
    }

    pub fn gyr(&self) -> Vec3 {
        Vec3::new(self.gyr_x, self.gyr_y, self.gyr_z)
    }

    pub fn acc(&self) -> Vec3 {
        Vec3::new(self.acc_x, self.acc_y, self.acc_z)
    }
}

/// Raw timer ticks for one pose cycle: `[h0, v0, h1, v1, h2, v2, h3, v3]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrobeTicks(pub [u32; HOMOGRAPHY_DIM]);

impl StrobeTicks {
    pub fn horizontal(&self, photodiode: usize) -> u32 {
        self.0[2 * photodiode]
    }

    pub fn vertical(&self, photodiode: usize) -> u32 {
        self.0[2 * photodiode + 1]
    }
}

/// Tangent-plane projections of each photodiode, alternating x/y.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedPoints(pub [f64; HOMOGRAPHY_DIM]);

impl ProjectedPoints {
    pub fn point(&self, photodiode: usize) -> (f64, f64) {
        (self.0[2 * photodiode], self.0[2 * photodiode + 1])
    }

    pub fn from_points(points: [(f64, f64); PHOTODIODE_COUNT]) -> Self {
        let mut flat = [0.0; HOMOGRAPHY_DIM];
        for (i, (x, y)) in points.iter().enumerate() {
            flat[2 * i] = *x;
            flat[2 * i + 1] = *y;
        }
        Self(flat)
    }
}

/// Known photodiode layout on the rigid body, alternating x/y.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoints(pub [f64; HOMOGRAPHY_DIM]);

impl ReferencePoints {
    pub fn point(&self, photodiode: usize) -> (f64, f64) {
        (self.0[2 * photodiode], self.0[2 * photodiode + 1])
    }
}

impl Default for ReferencePoints {
    /// VRduino board layout in millimetres.
    fn default() -> Self {
        Self([-42.0, 25.0, 42.0, 25.0, 42.0, -25.0, -42.0, -25.0])
    }
}
