use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::json;

use pose_tracker_rs::calibration::BiasVariance;
use pose_tracker_rs::config::Config;
use pose_tracker_rs::pose::PoseEstimator;
use pose_tracker_rs::sensors::ManualClock;
use pose_tracker_rs::session::SessionLog;
use pose_tracker_rs::tracker::{OrientationTracker, TrackerEvent};
use pose_tracker_rs::TrackingError;

#[derive(Parser, Debug)]
struct Args {
    /// Path to session_*.json[.gz] log
    #[arg(long, conflicts_with = "golden_dir")]
    log: Option<PathBuf>,

    /// Directory of session logs to batch replay (processes session_*.json[.gz])
    #[arg(long)]
    golden_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Complementary filter alpha, overrides the config
    #[arg(long)]
    alpha: Option<f64>,

    /// Skip bias calibration and track from the first sample with zero bias
    #[arg(long, default_value_t = false)]
    no_calibration: bool,
}

fn run_once(path: &Path, config: &Config, args: &Args) -> anyhow::Result<serde_json::Value> {
    let session = SessionLog::load(path)?;
    let period = session.sample_period.unwrap_or(config.tracker.simulation_period_secs);
    let mut imu = session.imu_feed(period);
    let clock = ManualClock::new(0);
    let mut tracker = OrientationTracker::new(config.tracker.clone());
    let estimator = PoseEstimator::new(&config.pose);

    let to_track = match session.samples_after_calibration(config.tracker.calibration_samples) {
        Some(remaining) if !args.no_calibration => {
            tracker.init(&mut imu, &clock)?;
            Some(remaining)
        }
        short => {
            if short.is_none() && !args.no_calibration {
                log::warn!(
                    "{}: only {} IMU samples, tracking without calibration",
                    path.display(),
                    session.imu.len()
                );
            }
            tracker.set_bias(BiasVariance::zero(), &clock);
            None
        }
    };
    let calibrated = to_track.is_some();
    let to_track = to_track.unwrap_or(session.imu.len());

    let mut strobes = session.strobes.clone();
    strobes.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    let mut strobes = strobes.into_iter().peekable();

    let mut gyro_skips = 0u64;
    let mut tilt_skips = 0u64;
    let mut pose_frames = 0u64;
    let mut degenerate_frames = 0u64;
    let mut last_pose = None;
    let mut prev_quat = None;
    let mut max_pose_step_deg: f64 = 0.0;
    let mut max_comp_gyr_divergence_deg: f64 = 0.0;
    let mut max_reprojection_rms: f64 = 0.0;

    for _ in 0..to_track {
        clock.advance((period * 1e6).round() as u64);
        match tracker.process_imu(&mut imu, &clock) {
            Ok(events) => {
                for event in events {
                    match event {
                        TrackerEvent::GyroUpdateSkipped { .. } => gyro_skips += 1,
                        TrackerEvent::TiltCorrectionSkipped { .. } => tilt_skips += 1,
                    }
                }
            }
            Err(TrackingError::SensorUnavailable) => continue,
            Err(e) => return Err(e.into()),
        }

        let divergence = tracker
            .quaternion_comp()
            .angle_to(&tracker.quaternion_gyr())
            .to_degrees();
        max_comp_gyr_divergence_deg = max_comp_gyr_divergence_deg.max(divergence);

        let tracked_secs = tracker.samples_processed() as f64 * period;
        while let Some(frame) = strobes.next_if(|f| f.timestamp <= tracked_secs) {
            pose_frames += 1;
            match estimator.estimate_with_residual(&frame.ticks) {
                Ok((pose, rms)) => {
                    max_reprojection_rms = max_reprojection_rms.max(rms);
                    let q = pose.quaternion();
                    if let Some(prev) = prev_quat {
                        max_pose_step_deg = max_pose_step_deg.max(q.angle_to(&prev).to_degrees());
                    }
                    prev_quat = Some(q);
                    last_pose = Some(pose.snapshot());
                }
                Err(e) => {
                    degenerate_frames += 1;
                    log::debug!("frame at {:.3}s: {}", frame.timestamp, e);
                }
            }
        }
    }

    Ok(json!({
        "log": path.display().to_string(),
        "alpha": config.tracker.imu_filter_alpha,
        "sample_period": period,
        "duration_secs": session.duration_secs(period),
        "calibrated": calibrated,
        "calibration": tracker.calibration().map(BiasVariance::snapshot),
        "imu_samples": session.imu.len(),
        "tracked_samples": tracker.samples_processed(),
        "gyro_skips": gyro_skips,
        "tilt_skips": tilt_skips,
        "max_comp_gyr_divergence_deg": max_comp_gyr_divergence_deg,
        "pose_frames": pose_frames,
        "degenerate_frames": degenerate_frames,
        "max_pose_step_deg": max_pose_step_deg,
        "max_reprojection_rms": max_reprojection_rms,
        "final_orientation": tracker.snapshot(),
        "last_pose": last_pose,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(alpha) = args.alpha {
        config.tracker.imu_filter_alpha = alpha;
    }
    config.validate()?;

    let mut results = Vec::new();

    if let Some(dir) = args.golden_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &config, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config, &args)?);
    } else {
        anyhow::bail!("Provide --log or --golden-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
