use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tokio::time::{interval, Duration};

use pose_tracker_rs::calibration::BiasVariance;
use pose_tracker_rs::config::Config;
use pose_tracker_rs::live_status::LiveStatus;
use pose_tracker_rs::pose::{Pose, PoseEstimator};
use pose_tracker_rs::sensors::{ImuSource, SimulatedImu, SyntheticImu, SystemClock};
use pose_tracker_rs::session::{SessionLog, StrobeFrame};
use pose_tracker_rs::tracker::{OrientationTracker, TrackerEvent};
use pose_tracker_rs::types::{ImuSample, Vec3};
use pose_tracker_rs::{StrobeTicks, TrackingError};

/// IMU samples per optical cycle for the synthetic feed
const SYNTHETIC_STROBE_EVERY: u64 = 8;

#[derive(Parser, Debug)]
#[command(name = "pose_tracker")]
#[command(about = "Optical + IMU pose tracker", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous, or one pass over --log)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON config file; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Complementary filter alpha, overrides the config
    #[arg(long)]
    alpha: Option<f64>,

    /// Feed a recorded session (.json or .json.gz) instead of the synthetic IMU
    #[arg(long)]
    log: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "pose_tracker_sessions")]
    output_dir: String,
}

enum FeedSource {
    Recorded(SimulatedImu),
    Synthetic(SyntheticImu),
}

/// IMU feed that keeps a copy of everything it hands out.
struct LiveFeed {
    source: FeedSource,
    recorded: Vec<ImuSample>,
}

impl ImuSource for LiveFeed {
    fn init(&mut self) -> Result<(), TrackingError> {
        match &mut self.source {
            FeedSource::Recorded(imu) => imu.init(),
            FeedSource::Synthetic(imu) => imu.init(),
        }
    }

    fn read(&mut self) -> Option<ImuSample> {
        let sample = match &mut self.source {
            FeedSource::Recorded(imu) => imu.read(),
            FeedSource::Synthetic(imu) => imu.read(),
        }?;
        self.recorded.push(sample);
        Some(sample)
    }

    fn fixed_period(&self) -> Option<f64> {
        match &self.source {
            FeedSource::Recorded(imu) => imu.fixed_period(),
            FeedSource::Synthetic(imu) => imu.fixed_period(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(alpha) = args.alpha {
        config.tracker.imu_filter_alpha = alpha;
    }
    config.validate()?;

    let period = config.tracker.simulation_period_secs;

    println!("[{}] Pose Tracker RS Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Alpha: {}", config.tracker.imu_filter_alpha);
    println!(
        "  Feed: {}",
        args.log
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "synthetic".to_string())
    );
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    // Recorded strobes are replayed by tracking time; the synthetic feed
    // generates its own from the simulated orientation.
    let calibration_samples = config.tracker.calibration_samples;
    let (source, mut strobes, replay_samples, calibrate) = match args.log.as_ref() {
        Some(path) => {
            let session = SessionLog::load(path)?;
            println!(
                "  Recorded: {} IMU samples ({:.2} s), {} strobe frames",
                session.imu.len(),
                session.duration_secs(period),
                session.strobes.len()
            );
            let imu = session.imu_feed(period);
            match session.samples_after_calibration(calibration_samples) {
                Some(tracked) => (FeedSource::Recorded(imu), session.strobes, Some(tracked as u64), true),
                None => {
                    log::warn!(
                        "{}: only {} IMU samples, tracking without calibration",
                        path.display(),
                        session.imu.len()
                    );
                    let total = session.imu.len() as u64;
                    (FeedSource::Recorded(imu), session.strobes, Some(total), false)
                }
            }
        }
        None => {
            let imu = SyntheticImu::new(period, calibration_samples as u64);
            (FeedSource::Synthetic(imu), Vec::new(), None, true)
        }
    };
    strobes.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    let mut strobes = strobes.into_iter().peekable();

    let mut feed = LiveFeed {
        source,
        recorded: Vec::new(),
    };
    let clock = SystemClock::new();
    let mut tracker = OrientationTracker::new(config.tracker.clone());
    let estimator = PoseEstimator::new(&config.pose);

    if calibrate {
        println!(
            "[{}] Calibrating IMU (collecting {} samples, keep still)...",
            ts_now(),
            calibration_samples
        );
        let calibration = tracker.init(&mut feed, &clock)?;
        println!(
            "[{}] Calibration done ({} retries), gyro bias [{:.3}, {:.3}, {:.3}] deg/s",
            ts_now(),
            calibration.failed_reads,
            calibration.bias.gyr_bias.x,
            calibration.bias.gyr_bias.y,
            calibration.bias.gyr_bias.z
        );
    } else {
        tracker.set_bias(BiasVariance::zero(), &clock);
    }

    let mut status = LiveStatus::new();
    let mut recorded_strobes: Vec<StrobeFrame> = Vec::new();
    let mut ticker = interval(Duration::from_secs_f64(period));

    let start = Utc::now();
    let mut last_status_update = Utc::now();

    println!("[{}] Starting tracking...", ts_now());

    loop {
        if args.duration > 0 {
            let elapsed = Utc::now().signed_duration_since(start);
            if elapsed.num_seconds() as u64 >= args.duration {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
        }
        if let Some(total) = replay_samples {
            if tracker.samples_processed() >= total {
                println!("[{}] End of recorded session, stopping...", ts_now());
                break;
            }
        }

        ticker.tick().await;

        match tracker.process_imu(&mut feed, &clock) {
            Ok(events) => {
                for event in events {
                    match event {
                        TrackerEvent::GyroUpdateSkipped { .. } => status.gyro_skips += 1,
                        TrackerEvent::TiltCorrectionSkipped { .. } => status.tilt_skips += 1,
                    }
                }
            }
            Err(TrackingError::SensorUnavailable) => status.imu_unavailable += 1,
            Err(e) => return Err(e.into()),
        }

        // Optical cycles due at this point of tracking time
        let tracked_secs = tracker.samples_processed() as f64 * period;
        let mut due: Vec<StrobeFrame> = Vec::new();
        while let Some(frame) = strobes.next_if(|f| f.timestamp <= tracked_secs) {
            due.push(frame);
        }
        if let FeedSource::Synthetic(imu) = &feed.source {
            if tracker.samples_processed() % SYNTHETIC_STROBE_EVERY == 0 {
                due.push(StrobeFrame {
                    timestamp: tracked_secs,
                    ticks: synthetic_strobe(&estimator, imu),
                });
            }
        }
        for frame in due {
            status.pose_frames += 1;
            match estimator.estimate(&frame.ticks) {
                Ok(pose) => status.last_pose = Some(pose.snapshot()),
                Err(e) if e.is_transient() => {
                    status.degenerate_frames += 1;
                    log::debug!("skipping optical frame at {:.3}s: {}", frame.timestamp, e);
                }
                Err(e) => return Err(e.into()),
            }
            recorded_strobes.push(frame);
        }

        // Update live status every 2 seconds
        let now = Utc::now();
        if (now.signed_duration_since(last_status_update).num_seconds() as u64) >= 2 {
            status.uptime_seconds = now.signed_duration_since(start).num_seconds().max(0) as u64;
            status.record_tracker(&tracker);
            let status_path = format!("{}/live_status.json", args.output_dir);
            if let Err(e) = status.save(&status_path) {
                log::warn!("failed to write {}: {}", status_path, e);
            }
            last_status_update = now;
        }
    }

    // Final save
    let session = SessionLog {
        sample_period: Some(period),
        imu: std::mem::take(&mut feed.recorded),
        strobes: recorded_strobes,
    };
    let filename = format!("{}/session_{}.json.gz", args.output_dir, ts_now_clean());
    session.save(&filename)?;
    println!(
        "[{}] Final save: {} IMU samples, {} strobe frames to {}",
        ts_now(),
        session.imu.len(),
        session.strobes.len(),
        filename
    );

    status.uptime_seconds = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
    status.record_tracker(&tracker);
    let status_path = format!("{}/live_status_final.json", args.output_dir);
    if let Err(e) = status.save(&status_path) {
        log::warn!("failed to write {}: {}", status_path, e);
    }

    // Print stats
    let snap = tracker.snapshot();
    println!("\n=== Final Stats ===");
    println!("IMU samples tracked: {}", tracker.samples_processed());
    println!(
        "Skipped updates: {} gyro, {} tilt, {} unavailable",
        status.gyro_skips, status.tilt_skips, status.imu_unavailable
    );
    println!(
        "Flatland roll: gyro {:.2}° acc {:.2}° comp {:.2}°",
        snap.flatland_roll_gyr, snap.flatland_roll_acc, snap.flatland_roll_comp
    );
    println!("Quaternion (comp): {:?}", snap.quaternion_comp);
    println!(
        "Optical frames: {} ({} degenerate)",
        status.pose_frames, status.degenerate_frames
    );
    if let Some(pose) = status.last_pose.as_ref() {
        println!("Last position: {:?}", pose.position);
    }

    Ok(())
}

/// Board held 500 mm in front of the base station with the simulated orientation.
fn synthetic_strobe(estimator: &PoseEstimator, imu: &SyntheticImu) -> StrobeTicks {
    let pose = Pose {
        rotation: imu.truth().to_rotation_matrix().into_inner(),
        translation: Vec3::new(0.0, 0.0, -500.0),
    };
    estimator.ticks_for_pose(&pose)
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
