// motion_processor.rs — per-sample pipeline
//
// raw sample -> calibration offset -> low-pass (attitude) / median (rates, accel)
// -> gesture history + rules -> cooldown gate -> (filtered sample, events)
//
// Not thread-safe by construction: filters and history are mutated in place,
// so exactly one producer may call `process`, in timestamp order.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::calibration::CalibrationOffset;
use crate::filters::{LowPassFilter, MedianFilter};
use crate::gesture::{DetectorConfig, GestureDetector};
use crate::types::{Attitude, Axis3, GestureEvent, MotionSample};

const STATS_WINDOW: usize = 100;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub filtering_enabled: bool,
    /// Nominal streaming rate of the headset, Hz.
    pub sample_rate_hz: f64,
    /// Low-pass cutoff for roll/pitch/yaw, Hz.
    pub attitude_cutoff_hz: f64,
    /// Median window for rotation rate and user acceleration.
    pub median_window: usize,
    pub detector: DetectorConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            filtering_enabled: true,
            sample_rate_hz: 30.0,
            attitude_cutoff_hz: 5.0,
            median_window: 5,
            detector: DetectorConfig::default(),
        }
    }
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedSample {
    pub sample: MotionSample,
    pub events: Vec<GestureEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub samples_processed: u64,
    /// Mean over the last 100 samples, seconds.
    pub average_secs: f64,
    /// Max over the last 100 samples, seconds.
    pub max_secs: f64,
    pub window_len: usize,
}

/// Rolling processing-time window.
#[derive(Clone, Debug)]
struct ProcessingTimer {
    window: VecDeque<Duration>,
    capacity: usize,
    total: u64,
}

impl ProcessingTimer {
    fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.window.push_back(elapsed);
        if self.window.len() > self.capacity {
            self.window.pop_front();
        }
        self.total += 1;
    }

    fn snapshot(&self) -> ProcessingStats {
        if self.window.is_empty() {
            return ProcessingStats {
                samples_processed: self.total,
                ..ProcessingStats::default()
            };
        }
        let sum: f64 = self.window.iter().map(|d| d.as_secs_f64()).sum();
        let max = self
            .window
            .iter()
            .map(|d| d.as_secs_f64())
            .fold(0.0, f64::max);
        ProcessingStats {
            samples_processed: self.total,
            average_secs: sum / self.window.len() as f64,
            max_secs: max,
            window_len: self.window.len(),
        }
    }

    fn clear(&mut self) {
        self.window.clear();
        self.total = 0;
    }
}

// ─── Per-axis filter banks ───────────────────────────────────────────────────

struct FilterBank {
    attitude: [LowPassFilter; 3],
    rotation_rate: [MedianFilter; 3],
    user_acceleration: [MedianFilter; 3],
}

impl FilterBank {
    fn new(config: &ProcessorConfig) -> Self {
        let lpf = || LowPassFilter::new(config.attitude_cutoff_hz, config.sample_rate_hz);
        let median = || MedianFilter::new(config.median_window);
        Self {
            attitude: [lpf(), lpf(), lpf()],
            rotation_rate: [median(), median(), median()],
            user_acceleration: [median(), median(), median()],
        }
    }

    /// Gravity passes through untouched.
    fn apply(&mut self, sample: &MotionSample) -> MotionSample {
        let a = sample.attitude;
        let attitude = Attitude::new(
            self.attitude[0].apply(a.roll),
            self.attitude[1].apply(a.pitch),
            self.attitude[2].apply(a.yaw),
        );
        let rotation_rate = apply_axis(&mut self.rotation_rate, sample.rotation_rate);
        let user_acceleration = apply_axis(&mut self.user_acceleration, sample.user_acceleration);

        MotionSample {
            attitude,
            rotation_rate,
            user_acceleration,
            ..sample.clone()
        }
    }

    fn reset(&mut self) {
        self.attitude.iter_mut().for_each(LowPassFilter::reset);
        self.rotation_rate.iter_mut().for_each(MedianFilter::reset);
        self.user_acceleration.iter_mut().for_each(MedianFilter::reset);
    }
}

fn apply_axis(filters: &mut [MedianFilter; 3], v: Axis3) -> Axis3 {
    Axis3::new(filters[0].apply(v.x), filters[1].apply(v.y), filters[2].apply(v.z))
}

// ─── The processor ───────────────────────────────────────────────────────────

pub struct MotionDataProcessor {
    config: ProcessorConfig,
    filters: FilterBank,
    calibration: CalibrationOffset,
    detector: GestureDetector,
    timer: ProcessingTimer,
}

impl MotionDataProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            filters: FilterBank::new(&config),
            calibration: CalibrationOffset::new(),
            detector: GestureDetector::new(config.detector.clone()),
            timer: ProcessingTimer::new(STATS_WINDOW),
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run one raw sample through the pipeline.
    ///
    /// The calibration offset is subtracted from the raw attitude before
    /// filtering, and applies whether or not filtering is enabled.
    pub fn process(&mut self, raw: &MotionSample) -> ProcessedSample {
        let started = Instant::now();

        let calibrated = if self.calibration.is_calibrated() {
            raw.with_attitude(self.calibration.apply(raw.attitude))
        } else {
            raw.clone()
        };

        let filtered = if self.config.filtering_enabled {
            self.filters.apply(&calibrated)
        } else {
            calibrated
        };

        let events = self.detector.process(filtered.clone());

        self.timer.record(started.elapsed());
        ProcessedSample {
            sample: filtered,
            events,
        }
    }

    /// Rebuild every filter from `config`. Filter memory is lost, so the
    /// next samples restart from an unsmoothed value.
    pub fn update_filter_settings(&mut self, config: ProcessorConfig) {
        self.filters = FilterBank::new(&config);
        self.detector.reconfigure(config.detector.clone());
        self.config = config;
    }

    /// Fresh-session reset: filters, history, cooldowns and statistics.
    /// The calibration offset survives.
    pub fn reset_filters(&mut self) {
        self.filters.reset();
        self.detector.clear();
        self.timer.clear();
    }

    /// Drops history, cooldowns and the calibration offset.
    pub fn clear_history(&mut self) {
        self.detector.clear();
        self.calibration.clear();
    }

    pub fn calibrate_now(&mut self, reference: Attitude) {
        self.calibration.set(reference);
    }

    pub fn clear_calibration(&mut self) {
        self.calibration.clear();
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_calibrated()
    }

    pub fn calibration_offset(&self) -> Option<Attitude> {
        self.calibration.offset()
    }

    pub fn history_len(&self) -> usize {
        self.detector.history_len()
    }

    pub fn stats(&self) -> ProcessingStats {
        self.timer.snapshot()
    }
}

impl Default for MotionDataProcessor {
    fn default() -> Self {
        Self::new(ProcessorConfig::default())
    }
}
