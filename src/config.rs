use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::motion_processor::ProcessorConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Automatic restarts allowed before an explicit start is required.
    pub max_retry_count: u32,
    pub max_retry_delay_secs: u64,
    /// How long a start may stay in `Starting` before it counts as failed.
    pub start_grace_secs: f64,
    /// Settling delay between a calibration request and its commit.
    pub calibration_settle_secs: f64,
    /// Accept a start whenever the local device reports motion, even without
    /// a motion-capable route (simulator runs).
    pub allow_simulator: bool,
    /// Capacity of the sample/event broadcast channels.
    pub channel_capacity: usize,
}

/// Upper bound for the grace window and the settle delay.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Seconds to a `Duration`; out-of-range values fall back to `default_secs`.
fn delay_or(secs: f64, default_secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| d.as_secs_f64() <= MAX_DELAY_SECS)
        .unwrap_or_else(|| Duration::from_secs_f64(default_secs))
}

impl SessionConfig {
    pub fn start_grace(&self) -> Duration {
        delay_or(self.start_grace_secs, Self::default().start_grace_secs)
    }

    pub fn calibration_settle(&self) -> Duration {
        delay_or(self.calibration_settle_secs, Self::default().calibration_settle_secs)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("start_grace_secs", self.start_grace_secs),
            ("calibration_settle_secs", self.calibration_settle_secs),
        ] {
            if !(0.0..=MAX_DELAY_SECS).contains(&secs) {
                bail!("session.{name} must be within 0..={MAX_DELAY_SECS}, got {secs}");
            }
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 5,
            max_retry_delay_secs: 30,
            start_grace_secs: 1.0,
            calibration_settle_secs: 0.5,
            allow_simulator: false,
            channel_capacity: 256,
        }
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub processor: ProcessorConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Load from a JSON file; absent fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Reject values that would make timers or gesture confidences
    /// meaningless.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;

        let p = &self.processor;
        if !(p.sample_rate_hz.is_finite() && p.sample_rate_hz > 0.0) {
            bail!("processor.sample_rate_hz must be positive, got {}", p.sample_rate_hz);
        }
        if !(p.attitude_cutoff_hz.is_finite() && p.attitude_cutoff_hz > 0.0) {
            bail!("processor.attitude_cutoff_hz must be positive, got {}", p.attitude_cutoff_hz);
        }

        let d = &p.detector;
        if !(d.looking_down_threshold.is_finite() && d.looking_down_threshold < 0.0) {
            bail!("detector.looking_down_threshold must be negative, got {}", d.looking_down_threshold);
        }
        for (name, value) in [
            ("looking_up_threshold", d.looking_up_threshold),
            ("rapid_motion_threshold", d.rapid_motion_threshold),
            ("head_shake_threshold", d.head_shake_threshold),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("detector.{name} must be positive, got {value}");
            }
        }
        if !(d.event_cooldown_secs.is_finite() && d.event_cooldown_secs >= 0.0) {
            bail!("detector.event_cooldown_secs must be non-negative, got {}", d.event_cooldown_secs);
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}
