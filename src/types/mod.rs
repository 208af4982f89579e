pub mod axes;

pub use axes::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped reading from the head-worn sensor.
///
/// Pipeline stages never mutate a sample; they build a new one with the
/// `with_*` helpers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Sensor timestamp, seconds (monotonic).
    pub timestamp: f64,
    pub attitude: Attitude,
    /// rad/s; x = pitch axis, y = roll axis, z = yaw axis.
    pub rotation_rate: Axis3,
    /// g, gravity removed.
    pub user_acceleration: Axis3,
    /// g.
    pub gravity: Axis3,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_time: Option<f64>,
}

impl MotionSample {
    pub fn new(
        timestamp: f64,
        attitude: Attitude,
        rotation_rate: Axis3,
        user_acceleration: Axis3,
        gravity: Axis3,
    ) -> Self {
        Self {
            timestamp,
            attitude,
            rotation_rate,
            user_acceleration,
            gravity,
            received_at: Utc::now(),
            delta_time: None,
        }
    }

    pub fn with_attitude(&self, attitude: Attitude) -> Self {
        Self {
            attitude,
            ..self.clone()
        }
    }

    pub fn with_rotation_rate(&self, rotation_rate: Axis3) -> Self {
        Self {
            rotation_rate,
            ..self.clone()
        }
    }

    pub fn with_user_acceleration(&self, user_acceleration: Axis3) -> Self {
        Self {
            user_acceleration,
            ..self.clone()
        }
    }

    pub fn with_delta_time(&self, delta_time: Option<f64>) -> Self {
        Self {
            delta_time,
            ..self.clone()
        }
    }

    pub fn pitch_degrees(&self) -> f64 {
        self.attitude.pitch_degrees()
    }

    pub fn roll_degrees(&self) -> f64 {
        self.attitude.roll_degrees()
    }

    pub fn yaw_degrees(&self) -> f64 {
        self.attitude.yaw_degrees()
    }

    /// Rotation rate in deg/s.
    pub fn rotation_rate_degrees(&self) -> Axis3 {
        self.rotation_rate.to_degrees()
    }

    /// Rotation-rate vector magnitude in deg/s.
    pub fn rotation_magnitude_degrees(&self) -> f64 {
        self.rotation_rate.magnitude().to_degrees()
    }

    pub fn acceleration_magnitude(&self) -> f64 {
        self.user_acceleration.magnitude()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    LookingDown,
    LookingUp,
    HeadShake,
    HeadNod,
    SuddenMovement,
}

impl GestureKind {
    pub const ALL: [GestureKind; 5] = [
        GestureKind::LookingDown,
        GestureKind::LookingUp,
        GestureKind::HeadShake,
        GestureKind::HeadNod,
        GestureKind::SuddenMovement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GestureKind::LookingDown => "looking_down",
            GestureKind::LookingUp => "looking_up",
            GestureKind::HeadShake => "head_shake",
            GestureKind::HeadNod => "head_nod",
            GestureKind::SuddenMovement => "sudden_movement",
        }
    }
}

impl std::fmt::Display for GestureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized head gesture. Only the gesture detector creates these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub timestamp: f64,
    /// Always within [0, 1].
    pub confidence: f64,
    pub source_sample: MotionSample,
}
