//! Head-worn motion pipeline: filtering, calibration, gesture detection and
//! the connection/session state machine around a headset motion stream.

pub mod calibration;
pub mod config;
pub mod error;
pub mod filters;
pub mod gesture;
pub mod live_status;
pub mod motion_processor;
pub mod restart_manager;
pub mod sensors;
pub mod session;
pub mod session_log;
pub mod types;

pub use config::{Config, SessionConfig};
pub use error::{MotionError, MotionResult};
pub use motion_processor::{MotionDataProcessor, ProcessedSample, ProcessingStats, ProcessorConfig};
pub use session::{
    Authorization, Connection, MotionSession, MotionSource, SessionSnapshot, SourceUpdate, UpdateState,
};
pub use types::{Attitude, Axis3, GestureEvent, GestureKind, MotionSample};
