//! 8-parameter planar homography via the direct linear transform.
//!
//! The homography maps board coordinates `(x, y)` to projected coordinates
//! `(u, v)` with the bottom-right entry fixed to 1:
//!
//! ```text
//!       | h0 h1 h2 |
//!   H = | h3 h4 h5 |
//!       | h6 h7 1  |
//! ```
//!
//! Each photodiode contributes two rows:
//!
//! ```text
//!   [x y 1 0 0 0 -x·u -y·u] · h = u
//!   [0 0 0 x y 1 -x·v -y·v] · h = v
//! ```

use crate::error::{TrackResult, TrackingError};
use crate::types::{
    HomographyMat, HomographyVec, ProjectedPoints, ReferencePoints, RotationMat, Vec3,
    PHOTODIODE_COUNT,
};

/// The stacked DLT system `A · h = b` for one pose cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct HomographySystem {
    pub a: HomographyMat,
    pub b: HomographyVec,
}

impl HomographySystem {
    /// Assemble the system from 4 projections and their reference positions.
    pub fn build(projected: &ProjectedPoints, reference: &ReferencePoints) -> Self {
        let mut a = HomographyMat::zeros();
        let mut b = HomographyVec::zeros();

        for i in 0..PHOTODIODE_COUNT {
            let (x, y) = reference.point(i);
            let (u, v) = projected.point(i);
            let r0 = 2 * i;
            let r1 = 2 * i + 1;

            a[(r0, 0)] = x;
            a[(r0, 1)] = y;
            a[(r0, 2)] = 1.0;
            a[(r0, 6)] = -x * u;
            a[(r0, 7)] = -y * u;
            b[r0] = u;

            a[(r1, 3)] = x;
            a[(r1, 4)] = y;
            a[(r1, 5)] = 1.0;
            a[(r1, 6)] = -x * v;
            a[(r1, 7)] = -y * v;
            b[r1] = v;
        }

        Self { a, b }
    }

    /// Reciprocal condition estimate σ_min / σ_max (0 when singular).
    pub fn reciprocal_condition(&self) -> f64 {
        let sv = self.a.singular_values();
        let max = sv.max();
        if max <= 0.0 || !max.is_finite() {
            return 0.0;
        }
        sv.min() / max
    }

    /// Solve for `h = A⁻¹ b`.
    ///
    /// Singular or ill-conditioned systems (collinear references, coincident
    /// projections) are reported as `DegenerateGeometry`; the caller skips
    /// the cycle.
    pub fn solve(&self, singular_tolerance: f64) -> TrackResult<HomographyParams> {
        let rcond = self.reciprocal_condition();
        if !(rcond > singular_tolerance) {
            return Err(TrackingError::DegenerateGeometry(format!(
                "homography system near singular (rcond {:.3e})",
                rcond
            )));
        }

        let inverse = self.a.try_inverse().ok_or_else(|| {
            TrackingError::DegenerateGeometry("homography matrix not invertible".to_string())
        })?;
        let h = inverse * self.b;

        if h.iter().any(|v| !v.is_finite()) {
            return Err(TrackingError::DegenerateGeometry(
                "homography solution not finite".to_string(),
            ));
        }
        Ok(HomographyParams(h))
    }
}

/// Solution vector `h` with named views onto the 3×3 homography.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HomographyParams(pub HomographyVec);

impl HomographyParams {
    /// First column, third row negated for the −z viewing direction.
    pub fn column1(&self) -> Vec3 {
        let h = &self.0;
        Vec3::new(h[0], h[3], -h[6])
    }

    /// Second column, third row negated for the −z viewing direction.
    pub fn column2(&self) -> Vec3 {
        let h = &self.0;
        Vec3::new(h[1], h[4], -h[7])
    }

    /// In-plane translation terms `(h2, h5)`.
    pub fn translation_terms(&self) -> (f64, f64) {
        (self.0[2], self.0[5])
    }

    pub fn as_matrix(&self) -> RotationMat {
        let h = &self.0;
        RotationMat::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0)
    }

    /// Map a board point through `H`.
    pub fn project(&self, x: f64, y: f64) -> (f64, f64) {
        let p = self.as_matrix() * Vec3::new(x, y, 1.0);
        (p.x / p.z, p.y / p.z)
    }

    /// RMS distance between `H · reference` and the measured projections.
    pub fn reprojection_rms(&self, projected: &ProjectedPoints, reference: &ReferencePoints) -> f64 {
        let sum_sq: f64 = (0..PHOTODIODE_COUNT)
            .map(|i| {
                let (x, y) = reference.point(i);
                let (u, v) = projected.point(i);
                let (pu, pv) = self.project(x, y);
                (pu - u).powi(2) + (pv - v).powi(2)
            })
            .sum();
        (sum_sq / PHOTODIODE_COUNT as f64).sqrt()
    }
}
