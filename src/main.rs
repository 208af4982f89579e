use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, sleep, Duration, Instant};

use head_motion_rs::live_status::LiveStatus;
use head_motion_rs::sensors::{self, SimulatedHeadset};
use head_motion_rs::session_log::SessionLog;
use head_motion_rs::{Config, GestureEvent, GestureKind, MotionSample, MotionSession, UpdateState};

#[derive(Parser, Debug)]
#[command(name = "head_motion")]
#[command(about = "Head-worn motion pipeline against a simulated headset", long_about = None)]
struct Args {
    /// Duration in seconds
    #[arg(value_name = "SECONDS", default_value = "30")]
    duration: u64,

    /// JSON config file (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stream rate of the simulated headset, Hz
    #[arg(long, default_value = "30.0")]
    rate: f64,

    /// Request calibration this many seconds after start
    #[arg(long)]
    calibrate_after: Option<f64>,

    /// Number of starts the simulated headset stalls on
    #[arg(long, default_value = "0")]
    failing_starts: u32,

    /// Output directory
    #[arg(long, default_value = "head_motion_sessions")]
    output_dir: PathBuf,

    /// Write the final log gzip-compressed
    #[arg(long)]
    gzip: bool,
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    std::fs::create_dir_all(&args.output_dir)?;

    info!("head_motion starting");
    info!("  duration: {}s @ {:.0} Hz", args.duration, args.rate);
    info!("  filtering: {}", config.processor.filtering_enabled);
    info!("  output dir: {}", args.output_dir.display());

    let headset = SimulatedHeadset::new().with_failing_starts(args.failing_starts);
    let session = MotionSession::new(headset, config.processor.clone(), config.session.clone());
    session.refresh_authorization();
    session.handle_route_change(true, Some(true));

    let samples: Arc<Mutex<Vec<MotionSample>>> = Arc::new(Mutex::new(Vec::new()));
    let events: Arc<Mutex<Vec<GestureEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let last_event: Arc<Mutex<Option<GestureKind>>> = Arc::new(Mutex::new(None));

    let mut sample_rx = session.subscribe_samples();
    let samples_sink = Arc::clone(&samples);
    let _sample_handle = tokio::spawn(async move {
        loop {
            match sample_rx.recv().await {
                Ok(sample) => {
                    if let Ok(mut guard) = samples_sink.lock() {
                        guard.push(sample);
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("sample log lagged, {n} samples dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut event_rx = session.subscribe_events();
    let events_sink = Arc::clone(&events);
    let last_event_sink = Arc::clone(&last_event);
    let _event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    info!(
                        "[GESTURE] {} at t={:.2}s (confidence {:.2})",
                        event.kind, event.timestamp, event.confidence
                    );
                    if let Ok(mut last) = last_event_sink.lock() {
                        *last = Some(event.kind);
                    }
                    if let Ok(mut guard) = events_sink.lock() {
                        guard.push(event);
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("event log lagged, {n} events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Some(after) = args.calibrate_after {
        let calibrating = session.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs_f64(after.max(0.0))).await;
            match calibrating.request_calibration() {
                Ok(()) => info!("calibration requested"),
                Err(skip) => warn!("calibration skipped: {skip:?}"),
            }
        });
    }

    let status_session = session.clone();
    let status_path = args.output_dir.join("live_status.json");
    let status_last_event = Arc::clone(&last_event);
    let _status_handle = tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let last = status_last_event.lock().ok().and_then(|g| *g);
            let status = LiveStatus::from_snapshot(&status_session.snapshot(), started.elapsed().as_secs())
                .with_last_event(last);
            if let Err(e) = status.save(&status_path) {
                warn!("writing live status failed: {e}");
            }
        }
    });

    session.start()?;
    let delivered =
        sensors::stream_samples(session.clone(), args.rate, Duration::from_secs(args.duration)).await;
    if let UpdateState::Error(err) = session.update_state() {
        warn!("session ended in error: {err}");
    }
    session.stop();

    // Let the subscribers drain.
    sleep(Duration::from_millis(50)).await;
    let snapshot = session.snapshot();

    let log = SessionLog {
        samples: samples.lock().map(|g| g.clone()).unwrap_or_default(),
        events: events.lock().map(|g| g.clone()).unwrap_or_default(),
        stats: Some(snapshot.stats.clone()),
    };
    let extension = if args.gzip { "json.gz" } else { "json" };
    let filename = args
        .output_dir
        .join(format!("session_{}_final.{}", ts_now_clean(), extension));
    log.save(&filename)?;

    info!(
        "final save: {} samples ({} delivered), {} events to {}",
        log.samples.len(),
        delivered,
        log.events.len(),
        filename.display()
    );
    info!(
        "processing: avg {:.3} ms, max {:.3} ms over {} samples",
        snapshot.stats.average_secs * 1000.0,
        snapshot.stats.max_secs * 1000.0,
        snapshot.stats.window_len
    );

    let final_status = LiveStatus::from_snapshot(&snapshot, args.duration)
        .with_last_event(last_event.lock().ok().and_then(|g| *g));
    final_status.save(args.output_dir.join("live_status.json"))?;

    Ok(())
}
