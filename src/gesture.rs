//! Gesture recognition over filtered samples.
//!
//! Five independent rules run on every sample: three thresholds on the newest
//! sample (looking down, looking up, sudden movement) and two oscillation
//! patterns over the rolling history (head shake on yaw rate, head nod on
//! pitch rate). Candidates then pass a per-kind cooldown keyed on emission.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::types::{GestureEvent, GestureKind, MotionSample};

/// Pitch-rate threshold for nods, deg/s. Not configurable.
pub const HEAD_NOD_RATE_THRESHOLD: f64 = 90.0;

const HEAD_SHAKE_MIN_ALTERNATIONS: usize = 3;
const HEAD_NOD_MIN_ALTERNATIONS: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Degrees, negative (head tilted down).
    pub looking_down_threshold: f64,
    /// Degrees, positive.
    pub looking_up_threshold: f64,
    /// Rotation-rate magnitude, deg/s.
    pub rapid_motion_threshold: f64,
    /// Peak yaw rate, deg/s.
    pub head_shake_threshold: f64,
    pub event_cooldown_secs: f64,
    /// Rolling history length (samples).
    pub history_capacity: usize,
    /// Samples inspected by the shake/nod rules.
    pub pattern_window: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            looking_down_threshold: -45.0,
            looking_up_threshold: 30.0,
            rapid_motion_threshold: 200.0,
            head_shake_threshold: 100.0,
            event_cooldown_secs: 1.0,
            history_capacity: 30,
            pattern_window: 10,
        }
    }
}

/// Last emission time per gesture kind.
#[derive(Clone, Debug)]
struct GestureCooldown {
    last_emitted: HashMap<GestureKind, f64>,
    cooldown_secs: f64,
}

impl GestureCooldown {
    fn new(cooldown_secs: f64) -> Self {
        Self {
            last_emitted: HashMap::new(),
            cooldown_secs,
        }
    }

    fn ready_and_touch(&mut self, kind: GestureKind, now: f64) -> bool {
        if let Some(&last) = self.last_emitted.get(&kind) {
            if now - last < self.cooldown_secs {
                return false;
            }
        }
        self.last_emitted.insert(kind, now);
        true
    }

    fn clear(&mut self) {
        self.last_emitted.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Oscillation {
    max_rate: f64,
    alternations: usize,
}

pub struct GestureDetector {
    config: DetectorConfig,
    history: VecDeque<MotionSample>,
    cooldown: GestureCooldown,
}

impl GestureDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let capacity = config.history_capacity.max(config.pattern_window);
        Self {
            history: VecDeque::with_capacity(capacity),
            cooldown: GestureCooldown::new(config.event_cooldown_secs),
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Swap thresholds in place. History is kept (trimmed to the new
    /// capacity); cooldown timestamps are kept with the new interval.
    pub fn reconfigure(&mut self, config: DetectorConfig) {
        self.cooldown.cooldown_secs = config.event_cooldown_secs;
        self.config = config;
        let capacity = self.config.history_capacity.max(self.config.pattern_window);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }

    /// Append a filtered sample, evaluate every rule and return the events
    /// that survive the cooldown gate.
    pub fn process(&mut self, sample: MotionSample) -> Vec<GestureEvent> {
        self.push(sample);

        let mut emitted = Vec::new();
        for candidate in self.candidates() {
            if self.cooldown.ready_and_touch(candidate.kind, candidate.timestamp) {
                debug!(
                    "gesture {} at t={:.3} (confidence {:.2})",
                    candidate.kind, candidate.timestamp, candidate.confidence
                );
                emitted.push(candidate);
            }
        }
        emitted
    }

    fn push(&mut self, sample: MotionSample) {
        self.history.push_back(sample);
        let capacity = self.config.history_capacity.max(self.config.pattern_window);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }

    /// All rules that fire on the current history, before debouncing.
    fn candidates(&self) -> Vec<GestureEvent> {
        let Some(latest) = self.history.back() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        out.extend(self.looking_down(latest));
        out.extend(self.looking_up(latest));
        out.extend(self.sudden_movement(latest));
        out.extend(self.head_shake(latest));
        out.extend(self.head_nod(latest));
        out
    }

    fn looking_down(&self, sample: &MotionSample) -> Option<GestureEvent> {
        let threshold = self.config.looking_down_threshold;
        let pitch = sample.pitch_degrees();
        if pitch < threshold {
            let confidence = ((pitch - threshold).abs() / threshold.abs()).min(1.0);
            return Some(event(GestureKind::LookingDown, confidence, sample));
        }
        None
    }

    fn looking_up(&self, sample: &MotionSample) -> Option<GestureEvent> {
        let threshold = self.config.looking_up_threshold;
        let pitch = sample.pitch_degrees();
        if pitch > threshold {
            let confidence = (pitch / threshold).min(1.0);
            return Some(event(GestureKind::LookingUp, confidence, sample));
        }
        None
    }

    fn sudden_movement(&self, sample: &MotionSample) -> Option<GestureEvent> {
        let threshold = self.config.rapid_motion_threshold;
        let magnitude = sample.rotation_magnitude_degrees();
        if magnitude > threshold {
            let confidence = (magnitude / (2.0 * threshold)).min(1.0);
            return Some(event(GestureKind::SuddenMovement, confidence, sample));
        }
        None
    }

    fn head_shake(&self, latest: &MotionSample) -> Option<GestureEvent> {
        let threshold = self.config.head_shake_threshold;
        let osc = self.oscillation(|s| s.rotation_rate_degrees().z)?;
        if osc.max_rate > threshold && osc.alternations >= HEAD_SHAKE_MIN_ALTERNATIONS {
            let confidence = (osc.max_rate / (2.0 * threshold)).min(1.0);
            return Some(event(GestureKind::HeadShake, confidence, latest));
        }
        None
    }

    fn head_nod(&self, latest: &MotionSample) -> Option<GestureEvent> {
        let osc = self.oscillation(|s| s.rotation_rate_degrees().x)?;
        if osc.max_rate > HEAD_NOD_RATE_THRESHOLD && osc.alternations >= HEAD_NOD_MIN_ALTERNATIONS {
            let confidence = (osc.max_rate / (2.0 * HEAD_NOD_RATE_THRESHOLD)).min(1.0);
            return Some(event(GestureKind::HeadNod, confidence, latest));
        }
        None
    }

    /// Peak |rate| and sign flips over the last `pattern_window` samples.
    /// `None` until the history holds a full window.
    fn oscillation<F>(&self, rate: F) -> Option<Oscillation>
    where
        F: Fn(&MotionSample) -> f64,
    {
        let window = self.config.pattern_window;
        if window == 0 || self.history.len() < window {
            return None;
        }

        let mut max_rate: f64 = 0.0;
        let mut alternations = 0;
        let mut prev_positive: Option<bool> = None;
        for sample in self.history.iter().skip(self.history.len() - window) {
            let r = rate(sample);
            max_rate = max_rate.max(r.abs());
            let positive = r > 0.0;
            if let Some(prev) = prev_positive {
                if prev != positive {
                    alternations += 1;
                }
            }
            prev_positive = Some(positive);
        }

        Some(Oscillation {
            max_rate,
            alternations,
        })
    }

    /// Drops history and cooldowns.
    pub fn clear(&mut self) {
        self.history.clear();
        self.cooldown.clear();
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> impl Iterator<Item = &MotionSample> {
        self.history.iter()
    }
}

/// Non-finite confidence (zero threshold) saturates to 1.
fn event(kind: GestureKind, confidence: f64, sample: &MotionSample) -> GestureEvent {
    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        1.0
    };
    GestureEvent {
        kind,
        timestamp: sample.timestamp,
        confidence,
        source_sample: sample.clone(),
    }
}
