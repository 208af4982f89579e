//! Per-axis signal conditioning.
//!
//! Attitude angles go through [`LowPassFilter`]; rotation rate and user
//! acceleration go through [`MedianFilter`] for spike rejection.

pub mod low_pass;
pub mod median;

pub use low_pass::LowPassFilter;
pub use median::MedianFilter;
