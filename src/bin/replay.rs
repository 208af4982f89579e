use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use log::{debug, info};
use serde_json::json;

use head_motion_rs::session_log::SessionLog;
use head_motion_rs::{Config, MotionDataProcessor, ProcessorConfig};

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replay a recorded head-motion log through the processor", long_about = None)]
struct Args {
    /// Path to session_*.json[.gz] log
    #[arg(long)]
    log: PathBuf,

    /// JSON config file; only the processor section is used
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip filtering (for logs that already hold filtered samples)
    #[arg(long, default_value_t = false)]
    no_filter: bool,

    /// Override the event cooldown, seconds
    #[arg(long)]
    cooldown: Option<f64>,

    /// Include every replayed event in the summary
    #[arg(long, default_value_t = false)]
    events: bool,
}

fn processor_config(args: &Args) -> anyhow::Result<ProcessorConfig> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?.processor,
        None => ProcessorConfig::default(),
    };
    if args.no_filter {
        config.filtering_enabled = false;
    }
    if let Some(cooldown) = args.cooldown {
        if cooldown < 0.0 {
            bail!("cooldown must be non-negative, got {cooldown}");
        }
        config.detector.event_cooldown_secs = cooldown;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let log = SessionLog::load(&args.log)?;
    if log.samples.is_empty() {
        bail!("{} holds no samples", args.log.display());
    }
    info!("replaying {} samples from {}", log.samples.len(), args.log.display());

    let mut processor = MotionDataProcessor::new(processor_config(&args)?);
    let mut replayed = Vec::new();
    for sample in &log.samples {
        let out = processor.process(sample);
        for event in &out.events {
            debug!("{} at t={:.2}s", event.kind, event.timestamp);
        }
        replayed.extend(out.events);
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for event in &replayed {
        *counts.entry(event.kind.as_str()).or_default() += 1;
    }

    let first = log.samples.first().map(|s| s.timestamp).unwrap_or(0.0);
    let last = log.samples.last().map(|s| s.timestamp).unwrap_or(0.0);
    let stats = processor.stats();

    let mut summary = json!({
        "log": args.log.display().to_string(),
        "samples": log.samples.len(),
        "duration_secs": last - first,
        "recorded_events": log.events.len(),
        "replayed_events": replayed.len(),
        "events_by_kind": counts,
        "processing": {
            "avg_ms": stats.average_secs * 1000.0,
            "max_ms": stats.max_secs * 1000.0,
        },
    });
    if args.events {
        summary["events"] = serde_json::to_value(
            replayed
                .iter()
                .map(|e| json!({ "kind": e.kind, "timestamp": e.timestamp, "confidence": e.confidence }))
                .collect::<Vec<_>>(),
        )?;
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
