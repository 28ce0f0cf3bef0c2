//! Optical pose pipeline
//!
//! ticks → projections (sweep) → DLT system (homography) → h → R, t (decompose).
//! Every stage is a pure function of its inputs, so independent cycles can be
//! computed anywhere.

pub mod decompose;
pub mod homography;
pub mod sweep;

pub use decompose::{Pose, PoseSnapshot};
pub use homography::{HomographyParams, HomographySystem};
pub use sweep::SweepModel;

use crate::config::PoseConfig;
use crate::error::{TrackResult, TrackingError};
use crate::types::{ProjectedPoints, ReferencePoints, StrobeTicks, Vec3, PHOTODIODE_COUNT};

#[derive(Clone, Debug)]
pub struct PoseEstimator {
    sweep: SweepModel,
    reference: ReferencePoints,
    singular_tolerance: f64,
    orthonormal_tolerance: f64,
}

impl PoseEstimator {
    pub fn new(config: &PoseConfig) -> Self {
        Self {
            sweep: SweepModel::from_config(config),
            reference: config.reference_points,
            singular_tolerance: config.singular_tolerance,
            orthonormal_tolerance: config.orthonormal_tolerance,
        }
    }

    pub fn sweep(&self) -> &SweepModel {
        &self.sweep
    }

    pub fn reference(&self) -> &ReferencePoints {
        &self.reference
    }

    /// Run one full pose cycle. Degenerate frames return `DegenerateGeometry`.
    pub fn estimate(&self, ticks: &StrobeTicks) -> TrackResult<Pose> {
        self.estimate_with_residual(ticks).map(|(pose, _)| pose)
    }

    /// Like `estimate`, also returning the RMS reprojection error of the
    /// solved homography over the photodiodes.
    pub fn estimate_with_residual(&self, ticks: &StrobeTicks) -> TrackResult<(Pose, f64)> {
        let projected = self.sweep.to_projected(ticks);
        let h = HomographySystem::build(&projected, &self.reference).solve(self.singular_tolerance)?;
        let rms = h.reprojection_rms(&projected, &self.reference);
        let pose = Pose::from_homography(&h);

        if !pose.is_orthonormal(self.orthonormal_tolerance) {
            log::debug!("rejecting pose with non-orthonormal rotation: {:?}", pose.rotation);
            return Err(TrackingError::DegenerateGeometry(
                "decomposed rotation is not orthonormal".to_string(),
            ));
        }
        log::trace!("pose solved, reprojection rms {:.3e}", rms);
        Ok((pose, rms))
    }

    /// Tick counts the board would produce at `pose`, for synthetic feeds.
    ///
    /// Photodiodes must stay in front of the base station (negative depth).
    pub fn ticks_for_pose(&self, pose: &Pose) -> StrobeTicks {
        let mut points = [(0.0, 0.0); PHOTODIODE_COUNT];
        for (i, p) in points.iter_mut().enumerate() {
            let (x, y) = self.reference.point(i);
            let cam = pose.rotation * Vec3::new(x, y, 0.0) + pose.translation;
            *p = (cam.x / -cam.z, cam.y / -cam.z);
        }
        self.sweep.to_ticks(&ProjectedPoints::from_points(points))
    }
}

impl Default for PoseEstimator {
    fn default() -> Self {
        Self::new(&PoseConfig::default())
    }
}
