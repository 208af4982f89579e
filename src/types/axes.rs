//! Three-axis value types shared by every sample channel.
//!
//! Angles are stored in radians and rates in rad/s; degree views are
//! computed on demand and never stored.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::Sub;

/// Generic x/y/z triple (rotation rate, user acceleration, gravity).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axis3 {
    pub const ZERO: Axis3 = Axis3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Euclidean norm in the stored unit.
    pub fn magnitude(&self) -> f64 {
        self.to_vector().norm()
    }

    pub fn to_degrees(self) -> Axis3 {
        Axis3::new(self.x.to_degrees(), self.y.to_degrees(), self.z.to_degrees())
    }
}

impl From<Vector3<f64>> for Axis3 {
    fn from(v: Vector3<f64>) -> Self {
        Axis3::new(v.x, v.y, v.z)
    }
}

impl From<Axis3> for Vector3<f64> {
    fn from(a: Axis3) -> Self {
        a.to_vector()
    }
}

/// Head orientation (roll, pitch, yaw) in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    pub const ZERO: Attitude = Attitude {
        roll: 0.0,
        pitch: 0.0,
        yaw: 0.0,
    };

    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    pub fn from_degrees(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self::new(roll.to_radians(), pitch.to_radians(), yaw.to_radians())
    }

    pub fn roll_degrees(&self) -> f64 {
        self.roll.to_degrees()
    }

    pub fn pitch_degrees(&self) -> f64 {
        self.pitch.to_degrees()
    }

    pub fn yaw_degrees(&self) -> f64 {
        self.yaw.to_degrees()
    }
}

impl Sub for Attitude {
    type Output = Attitude;

    fn sub(self, rhs: Attitude) -> Attitude {
        Attitude::new(self.roll - rhs.roll, self.pitch - rhs.pitch, self.yaw - rhs.yaw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_magnitude() {
        let a = Axis3::new(3.0, 4.0, 12.0);
        assert_relative_eq!(a.magnitude(), 13.0);
    }

    #[test]
    fn test_attitude_subtraction_is_per_axis() {
        let a = Attitude::new(0.3, -0.2, 1.0);
        let b = Attitude::new(0.1, 0.1, 0.5);
        let d = a - b;
        assert_relative_eq!(d.roll, 0.2, epsilon = 1e-12);
        assert_relative_eq!(d.pitch, -0.3, epsilon = 1e-12);
        assert_relative_eq!(d.yaw, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_degree_views() {
        let a = Attitude::from_degrees(10.0, -45.0, 90.0);
        assert_relative_eq!(a.pitch_degrees(), -45.0, epsilon = 1e-9);
        assert_relative_eq!(a.yaw, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }
}
