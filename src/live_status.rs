use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::session::{Authorization, Connection, SessionSnapshot, UpdateState};
use crate::types::GestureKind;

/// Periodic status dump for external dashboards (`live_status.json`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub authorization: Authorization,
    pub connection: Connection,
    pub update_state: UpdateState,
    // Restart tracking
    pub retry_count: u32,
    pub retry_pending: bool,
    pub last_retry_delay_secs: Option<f64>,
    // Pipeline
    pub samples_received: u64,
    pub events_emitted: u64,
    pub calibrating: bool,
    pub calibrated: bool,
    pub avg_processing_ms: f64,
    pub max_processing_ms: f64,
    pub last_event: Option<GestureKind>,
}

impl LiveStatus {
    pub fn from_snapshot(snapshot: &SessionSnapshot, uptime_seconds: u64) -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds,
            authorization: snapshot.authorization,
            connection: snapshot.connection,
            update_state: snapshot.update_state.clone(),
            retry_count: snapshot.retry_count,
            retry_pending: snapshot.retry_pending,
            last_retry_delay_secs: snapshot.last_retry_delay_secs,
            samples_received: snapshot.samples_received,
            events_emitted: snapshot.events_emitted,
            calibrating: snapshot.calibrating,
            calibrated: snapshot.calibration_offset.is_some(),
            avg_processing_ms: snapshot.stats.average_secs * 1000.0,
            max_processing_ms: snapshot.stats.max_secs * 1000.0,
            last_event: None,
        }
    }

    pub fn with_last_event(mut self, kind: Option<GestureKind>) -> Self {
        self.last_event = kind;
        self
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MotionError;
    use crate::motion_processor::ProcessingStats;
    use crate::types::Attitude;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            authorization: Authorization::Authorized,
            connection: Connection::ConnectedMotionAvailable,
            update_state: UpdateState::Error(MotionError::StartFailed("timeout".into())),
            retry_count: 2,
            retry_pending: true,
            last_retry_delay_secs: Some(4.0),
            calibrating: false,
            calibration_offset: Some(Attitude::ZERO),
            samples_received: 120,
            events_emitted: 3,
            stats: ProcessingStats {
                samples_processed: 120,
                average_secs: 0.0002,
                max_secs: 0.001,
                window_len: 100,
            },
        }
    }

    #[test]
    fn test_from_snapshot() {
        let status = LiveStatus::from_snapshot(&snapshot(), 12).with_last_event(Some(GestureKind::HeadNod));
        assert_eq!(status.retry_count, 2);
        assert!(status.calibrated);
        assert_eq!(status.uptime_seconds, 12);
        assert!((status.avg_processing_ms - 0.2).abs() < 1e-9);
        assert_eq!(status.last_event, Some(GestureKind::HeadNod));
    }

    #[test]
    fn test_save_writes_json() {
        let path = std::env::temp_dir().join(format!("live_status_{}.json", std::process::id()));
        let status = LiveStatus::from_snapshot(&snapshot(), 1);
        status.save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(&path);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["retry_count"], 2);
        assert_eq!(value["update_state"]["Error"]["kind"], "start_failed");
        let back: LiveStatus = serde_json::from_str(&text).unwrap();
        assert_eq!(back.update_state, status.update_state);
        assert_eq!(back.connection, Connection::ConnectedMotionAvailable);
    }
}
