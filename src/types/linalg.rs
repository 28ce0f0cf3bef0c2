//! Linear algebra type system for pose tracking
//!
//! Fixed-size aliases so the homography system and the rotation/translation
//! outputs carry their dimensions in the type.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

// ===== Optical pipeline dimensions =====
pub const PHOTODIODE_COUNT: usize = 4;
pub const HOMOGRAPHY_DIM: usize = 2 * PHOTODIODE_COUNT; // 8 unknowns, 8 rows

// ===== Homography system =====
pub type HomographyMat = SMatrix<f64, HOMOGRAPHY_DIM, HOMOGRAPHY_DIM>; // 8×8
pub type HomographyVec = SVector<f64, HOMOGRAPHY_DIM>; // 8

// ===== Pose / IMU =====
pub type RotationMat = Matrix3<f64>;
pub type Vec3 = Vector3<f64>;
