//! Head-pose zeroing.
//!
//! [`CalibrationOffset`] holds the reference attitude subtracted from raw
//! samples before filtering. [`Calibrator`] tracks the two-step request /
//! delayed commit so only one calibration is ever in flight.

use crate::types::{Attitude, MotionSample};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOffset {
    offset: Option<Attitude>,
}

impl CalibrationOffset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, reference: Attitude) {
        self.offset = Some(reference);
    }

    pub fn clear(&mut self) {
        self.offset = None;
    }

    pub fn offset(&self) -> Option<Attitude> {
        self.offset
    }

    pub fn is_calibrated(&self) -> bool {
        self.offset.is_some()
    }

    /// Roll/pitch/yaw minus the reference; identity when uncalibrated.
    pub fn apply(&self, attitude: Attitude) -> Attitude {
        match self.offset {
            Some(reference) => attitude - reference,
            None => attitude,
        }
    }
}

/// Why a calibration request did not start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationSkip {
    NoSample,
    AlreadyInFlight,
}

#[derive(Clone, Debug, Default)]
pub struct Calibrator {
    in_flight: bool,
    candidate: Option<Attitude>,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a calibration from the current sample. The candidate is only
    /// informative; [`Calibrator::commit`] decides the final offset.
    pub fn begin(&mut self, current: Option<&MotionSample>) -> Result<Attitude, CalibrationSkip> {
        if self.in_flight {
            return Err(CalibrationSkip::AlreadyInFlight);
        }
        let sample = current.ok_or(CalibrationSkip::NoSample)?;
        self.in_flight = true;
        self.candidate = Some(sample.attitude);
        debug!(
            "calibration requested at t={:.3} (pitch {:.1}°)",
            sample.timestamp,
            sample.pitch_degrees()
        );
        Ok(sample.attitude)
    }

    /// Finish the in-flight calibration using whatever sample is current now.
    /// Falls back to the candidate if the stream went quiet in between.
    pub fn commit(&mut self, current: Option<&MotionSample>) -> Option<Attitude> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        let candidate = self.candidate.take();
        current.map(|s| s.attitude).or(candidate)
    }

    pub fn cancel(&mut self) {
        self.in_flight = false;
        self.candidate = None;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}
