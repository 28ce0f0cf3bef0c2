use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

use crate::pose::homography::HomographyParams;
use crate::quaternion;
use crate::types::{RotationMat, Vec3};

/// Rigid transform of the board relative to the base station.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    /// Columns are the board's x, y, z axes in base-station coordinates
    pub rotation: RotationMat,
    /// Board origin in base-station coordinates (units of the reference layout)
    pub translation: Vec3,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub position: (f64, f64, f64),
    /// Quaternion (w, x, y, z)
    pub quaternion: (f64, f64, f64, f64),
}

impl Pose {
    /// Recover rotation and translation from the homography parameters.
    ///
    /// r1 = c1/‖c1‖, r2 = Gram-Schmidt of c2 against r1, r3 = r1 × r2.
    /// Translation is scaled by the mean column norm and its depth is −s
    /// since the base station looks down its negative z axis.
    ///
    /// Nothing is validated here; see `is_orthonormal`.
    pub fn from_homography(h: &HomographyParams) -> Self {
        let c1 = h.column1();
        let c2 = h.column2();
        let l1 = c1.norm();
        let l2 = c2.norm();

        let r1 = c1 / l1;
        let r2 = (c2 - r1 * r1.dot(&c2)).normalize();
        let r3 = r1.cross(&r2);

        let s = 2.0 / (l1 + l2);
        let (tx, ty) = h.translation_terms();

        Self {
            rotation: RotationMat::from_columns(&[r1, r2, r3]),
            translation: Vec3::new(s * tx, s * ty, -s),
        }
    }

    /// Columns unit length and pairwise orthogonal within `tolerance`.
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        let r = &self.rotation;
        if r.iter().chain(self.translation.iter()).any(|v| !v.is_finite()) {
            return false;
        }
        let c = [r.column(0), r.column(1), r.column(2)];
        for i in 0..3 {
            if (c[i].norm() - 1.0).abs() > tolerance {
                return false;
            }
            for j in (i + 1)..3 {
                if c[i].dot(&c[j]).abs() > tolerance {
                    return false;
                }
            }
        }
        r.determinant() > 0.0
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        quaternion::from_rotation_matrix(&self.rotation)
    }

    pub fn snapshot(&self) -> PoseSnapshot {
        PoseSnapshot {
            position: (self.translation.x, self.translation.y, self.translation.z),
            quaternion: quaternion::to_tuple(&self.quaternion()),
        }
    }
}
