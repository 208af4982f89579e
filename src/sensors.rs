//! Simulated head-worn sensor.
//!
//! `SimulatedHeadset` plays a fixed 12 s head-motion script on a loop so the
//! whole pipeline can run without hardware:
//!
//! | t (s)     | motion                                   |
//! |-----------|------------------------------------------|
//! | 0 – 2     | still                                    |
//! | 2 – 3.5   | look down to −60°, hold, come back       |
//! | 3.5 – 5   | head shake (yaw rate ±160°/s, 5 Hz)      |
//! | 5 – 6.5   | head nod (pitch rate ±130°/s, 4 Hz)      |
//! | 6.5 – 8   | look up to +45°, hold, come back         |
//! | 8.4 – 8.6 | sudden turn (yaw rate 300°/s)            |
//! | 8 – 12    | still                                    |

use log::{debug, info, warn};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::error::MotionError;
use crate::session::{Authorization, MotionSession, MotionSource, SourceUpdate};
use crate::types::{Attitude, Axis3, MotionSample};

pub const SCRIPT_PERIOD_SECS: f64 = 12.0;

pub struct SimulatedHeadset {
    authorization: Authorization,
    motion_available: bool,
    active: AtomicBool,
    /// Starts that will be accepted but never produce data.
    failing_starts: AtomicU32,
}

impl SimulatedHeadset {
    pub fn new() -> Self {
        Self {
            authorization: Authorization::Authorized,
            motion_available: true,
            active: AtomicBool::new(false),
            failing_starts: AtomicU32::new(0),
        }
    }

    /// The first `count` starts stall, exercising the grace window and the
    /// backoff restart.
    pub fn with_failing_starts(self, count: u32) -> Self {
        self.failing_starts.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }

    /// Scripted sample at stream time `t` (seconds).
    pub fn sample_at(&self, t: f64) -> MotionSample {
        let phase = t.rem_euclid(SCRIPT_PERIOD_SECS);
        let jitter = 0.3 * (TAU * 1.3 * t).sin();

        let mut pitch_deg = jitter;
        let mut yaw_deg = 0.0;
        let mut rate_dps = Axis3::ZERO;

        match phase {
            p if (2.0..3.5).contains(&p) => {
                pitch_deg += -60.0 * hold_envelope(p - 2.0, 1.5, 0.5);
            }
            p if (3.5..5.0).contains(&p) => {
                rate_dps.z = 160.0 * square_wave(p - 3.5, 5.0);
                yaw_deg = 8.0 * (TAU * 5.0 * (p - 3.5)).sin();
            }
            p if (5.0..6.5).contains(&p) => {
                rate_dps.x = 130.0 * square_wave(p - 5.0, 4.0);
                pitch_deg += 6.0 * (TAU * 4.0 * (p - 5.0)).sin();
            }
            p if (6.5..8.0).contains(&p) => {
                pitch_deg += 45.0 * hold_envelope(p - 6.5, 1.5, 0.5);
            }
            p if (8.4..8.6).contains(&p) => {
                rate_dps.z = 300.0;
                yaw_deg = 300.0 * (p - 8.4);
            }
            p if p >= 8.6 => {
                yaw_deg = 60.0;
            }
            _ => {}
        }

        let attitude = Attitude::from_degrees(0.0, pitch_deg, yaw_deg);
        let gravity = Axis3::new(0.0, -attitude.pitch.sin(), -attitude.pitch.cos());
        let rotation_rate = Axis3::new(
            rate_dps.x.to_radians(),
            rate_dps.y.to_radians(),
            rate_dps.z.to_radians(),
        );
        let user_acceleration = Axis3::new(0.0, 0.0, 0.02 * jitter);

        MotionSample::new(t, attitude, rotation_rate, user_acceleration, gravity)
    }
}

impl Default for SimulatedHeadset {
    fn default() -> Self {
        Self::new()
    }
}

/// ±1 at `hz`. The half-sample offset keeps 30 Hz sampling off the edges,
/// so each half period is a run of at least three samples.
fn square_wave(t: f64, hz: f64) -> f64 {
    let half_periods = (t * 2.0 * hz + 0.5 / 3.0).floor() as i64;
    if half_periods % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// 0 → 1 over `ramp`, hold, 1 → 0 over the last `ramp` of `span`.
fn hold_envelope(t: f64, span: f64, ramp: f64) -> f64 {
    if t < ramp {
        t / ramp
    } else if t > span - ramp {
        ((span - t) / ramp).max(0.0)
    } else {
        1.0
    }
}

impl MotionSource for SimulatedHeadset {
    fn authorization_status(&self) -> Authorization {
        self.authorization
    }

    fn is_device_motion_available(&self) -> bool {
        self.motion_available
    }

    fn start_updates(&self) -> Result<(), MotionError> {
        if !self.motion_available {
            return Err(MotionError::NotAvailable("simulated device has no motion".to_string()));
        }
        let stalled = self
            .failing_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            warn!("[sim] start accepted but stream stalled");
            return Ok(());
        }
        self.active.store(true, Ordering::SeqCst);
        debug!("[sim] streaming");
        Ok(())
    }

    fn stop_updates(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Feed the session from its simulated headset at `rate_hz` for `duration`.
/// Ticks while the headset is inactive are skipped. Returns the number of
/// samples delivered.
pub async fn stream_samples(
    session: MotionSession<SimulatedHeadset>,
    rate_hz: f64,
    duration: Duration,
) -> u64 {
    let period = Duration::from_secs_f64(1.0 / rate_hz.max(1.0));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let mut delivered = 0u64;

    loop {
        ticker.tick().await;
        let elapsed = started.elapsed();
        if elapsed >= duration {
            break;
        }
        if !session.source().is_active() {
            continue;
        }

        let sample = session.source().sample_at(elapsed.as_secs_f64());
        if session.handle_update(SourceUpdate::Sample(sample)).is_some() {
            delivered += 1;
            if delivered % 300 == 0 {
                info!("[sim] {} samples", delivered);
            }
        }
    }

    delivered
}
