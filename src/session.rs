//! Connection/session state machine around the motion pipeline.
//!
//! Three independent states are tracked: authorization (polled from the
//! source on demand), connection (pushed by route changes) and update state
//! (driven by start/stop/errors). Delayed work (start grace window, backoff
//! restart, calibration commit) runs as spawned tokio timers recorded in the
//! session; every timer captures the session generation and does nothing if
//! a stop or a fresh start moved the generation on.
//!
//! All methods that may schedule timers (`start`, `handle_update`,
//! `request_calibration`, `handle_route_change`) must be called from inside a
//! tokio runtime.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::calibration::{CalibrationSkip, Calibrator};
use crate::config::SessionConfig;
use crate::error::MotionError;
use crate::motion_processor::{MotionDataProcessor, ProcessedSample, ProcessingStats, ProcessorConfig};
use crate::restart_manager::RestartState;
use crate::types::{Attitude, GestureEvent, MotionSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authorization {
    NotDetermined,
    Authorized,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connection {
    /// No compatible headset routed.
    Disconnected,
    /// Headset present, capability not reported yet.
    Connected,
    /// Headset present but cannot stream motion.
    ConnectedUnsupported,
    ConnectedMotionAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateState {
    Stopped,
    Starting,
    Active,
    Error(MotionError),
}

impl UpdateState {
    /// Starting or Active.
    pub fn is_running(&self) -> bool {
        matches!(self, UpdateState::Starting | UpdateState::Active)
    }
}

/// Upstream sensor acquisition. Calls must not block.
pub trait MotionSource: Send + Sync + 'static {
    fn authorization_status(&self) -> Authorization;
    /// Local device-motion availability, combined with the route signal.
    fn is_device_motion_available(&self) -> bool;
    fn start_updates(&self) -> Result<(), MotionError>;
    fn stop_updates(&self);
    fn is_active(&self) -> bool;
}

/// One acquisition callback.
#[derive(Debug, Clone)]
pub enum SourceUpdate {
    Sample(MotionSample),
    Error(MotionError),
    /// Callback fired with neither sample nor error.
    Empty,
}

/// Read-only view for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub authorization: Authorization,
    pub connection: Connection,
    pub update_state: UpdateState,
    pub retry_count: u32,
    pub retry_pending: bool,
    pub last_retry_delay_secs: Option<f64>,
    pub calibrating: bool,
    pub calibration_offset: Option<Attitude>,
    pub samples_received: u64,
    pub events_emitted: u64,
    pub stats: ProcessingStats,
}

#[derive(Default)]
struct Timers {
    grace: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
    calibration: Option<JoinHandle<()>>,
}

impl Timers {
    fn cancel_all(&mut self) {
        for handle in [self.grace.take(), self.retry.take(), self.calibration.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

struct SessionStatus {
    authorization: Authorization,
    connection: Connection,
    update_state: UpdateState,
    restart: RestartState,
    latest: Option<MotionSample>,
    calibrator: Calibrator,
    timers: Timers,
    generation: u64,
    samples_received: u64,
    events_emitted: u64,
}

struct Inner<S> {
    source: S,
    config: SessionConfig,
    status: Mutex<SessionStatus>,
    processor: Mutex<MotionDataProcessor>,
    samples_tx: broadcast::Sender<MotionSample>,
    events_tx: broadcast::Sender<GestureEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

/// Owned handle to one headset session. Clones share the same session.
pub struct MotionSession<S: MotionSource> {
    inner: Arc<Inner<S>>,
}

impl<S: MotionSource> Clone for MotionSession<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: MotionSource> MotionSession<S> {
    pub fn new(source: S, processor_config: ProcessorConfig, config: SessionConfig) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (samples_tx, _) = broadcast::channel(capacity);
        let (events_tx, _) = broadcast::channel(capacity);

        let status = SessionStatus {
            authorization: Authorization::NotDetermined,
            connection: Connection::Disconnected,
            update_state: UpdateState::Stopped,
            restart: RestartState::new("Headset", config.max_retry_count, config.max_retry_delay_secs),
            latest: None,
            calibrator: Calibrator::new(),
            timers: Timers::default(),
            generation: 0,
            samples_received: 0,
            events_emitted: 0,
        };
        let processor = MotionDataProcessor::new(processor_config);
        let initial = snapshot_of(&status, &processor);
        let (snapshot_tx, _) = watch::channel(initial);

        Self {
            inner: Arc::new(Inner {
                source,
                config,
                status: Mutex::new(status),
                processor: Mutex::new(processor),
                samples_tx,
                events_tx,
                snapshot_tx,
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<MotionSample> {
        self.inner.samples_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GestureEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.lock_status();
        self.build_snapshot(&status)
    }

    pub fn authorization(&self) -> Authorization {
        self.lock_status().authorization
    }

    pub fn connection(&self) -> Connection {
        self.lock_status().connection
    }

    pub fn update_state(&self) -> UpdateState {
        self.lock_status().update_state.clone()
    }

    pub fn retry_count(&self) -> u32 {
        self.lock_status().restart.attempts
    }

    pub fn latest_sample(&self) -> Option<MotionSample> {
        self.lock_status().latest.clone()
    }

    pub fn processing_stats(&self) -> ProcessingStats {
        self.lock_processor().stats()
    }

    // ── External state signals ───────────────────────────────────────────

    /// Re-query the permission state from the source.
    pub fn refresh_authorization(&self) -> Authorization {
        let mut status = self.lock_status();
        let authorization = self.inner.source.authorization_status();
        if authorization != status.authorization {
            info!("authorization {:?} -> {:?}", status.authorization, authorization);
            status.authorization = authorization;
            self.publish(&status);
        }
        authorization
    }

    /// Apply a route change. `motion_capable` is `None` while the headset
    /// has not reported its capability yet. Losing the headset ends a running
    /// or retrying session with `ConnectionLost`.
    pub fn handle_route_change(&self, device_present: bool, motion_capable: Option<bool>) -> Connection {
        let connection = match (device_present, motion_capable) {
            (false, _) => Connection::Disconnected,
            (true, None) => Connection::Connected,
            (true, Some(true)) if self.inner.source.is_device_motion_available() => {
                Connection::ConnectedMotionAvailable
            }
            (true, Some(_)) => Connection::ConnectedUnsupported,
        };

        let mut status = self.lock_status();
        if status.connection != connection {
            info!("connection {:?} -> {:?}", status.connection, connection);
            status.connection = connection;
        }

        let retrying = status.timers.retry.is_some();
        if connection == Connection::Disconnected && (status.update_state.is_running() || retrying) {
            warn!("headset disconnected during session; stopping updates");
            self.halt(&mut status);
            status.update_state =
                UpdateState::Error(MotionError::ConnectionLost("headset disconnected".to_string()));
        }

        self.publish(&status);
        connection
    }

    // ── Start / stop ─────────────────────────────────────────────────────

    /// User-requested start. Resets the retry budget and processor state for
    /// a fresh session; a no-op while already starting or active.
    pub fn start(&self) -> Result<(), MotionError> {
        let mut status = self.lock_status();
        if status.update_state.is_running() {
            debug!("start ignored: updates already {:?}", status.update_state);
            return Ok(());
        }

        status.generation += 1;
        status.timers.cancel_all();
        status.calibrator.cancel();
        status.restart.reset();
        self.lock_processor().reset_filters();

        let result = self.begin_start(&mut status);
        self.publish(&status);
        result
    }

    /// Cancel pending timers, halt acquisition and drop the last sample.
    pub fn stop(&self) {
        let mut status = self.lock_status();
        self.halt(&mut status);
        status.update_state = UpdateState::Stopped;
        info!("motion updates stopped");
        self.publish(&status);
    }

    fn halt(&self, status: &mut SessionStatus) {
        status.generation += 1;
        status.timers.cancel_all();
        status.calibrator.cancel();
        status.latest = None;
        self.inner.source.stop_updates();
    }

    fn begin_start(&self, status: &mut SessionStatus) -> Result<(), MotionError> {
        status.authorization = self.inner.source.authorization_status();
        if status.authorization == Authorization::Denied {
            let err = MotionError::PermissionDenied("motion access denied by user".to_string());
            warn!("{err}");
            status.update_state = UpdateState::Error(err.clone());
            return Err(err);
        }

        let motion_ready = status.connection == Connection::ConnectedMotionAvailable
            || (self.inner.config.allow_simulator && self.inner.source.is_device_motion_available());
        if !motion_ready {
            let err = MotionError::NotAvailable(format!(
                "no motion-capable headset ({:?})",
                status.connection
            ));
            warn!("{err}");
            status.update_state = UpdateState::Error(err.clone());
            return Err(err);
        }

        status.update_state = UpdateState::Starting;
        info!(
            "motion updates starting (retry {}/{})",
            status.restart.attempts, status.restart.max_attempts
        );

        if let Err(err) = self.inner.source.start_updates() {
            self.fail(status, err.clone());
            return Err(err);
        }

        let grace = self.inner.config.start_grace();
        let generation = status.generation;
        let this = self.clone();
        status.timers.grace = Some(tokio::spawn(async move {
            sleep(grace).await;
            this.on_grace_elapsed(generation);
        }));
        Ok(())
    }

    fn mark_active(&self, status: &mut SessionStatus) {
        if let Some(handle) = status.timers.grace.take() {
            handle.abort();
        }
        status.update_state = UpdateState::Active;
        status.restart.record_success();
        info!("motion updates active");
    }

    /// Route an error into `Error`, halting acquisition and scheduling a
    /// backoff restart when the error kind allows it.
    fn fail(&self, status: &mut SessionStatus, err: MotionError) {
        warn!("motion updates failed: {err}");
        status.generation += 1;
        status.timers.cancel_all();
        status.calibrator.cancel();
        self.inner.source.stop_updates();
        status.update_state = UpdateState::Error(err.clone());

        if !err.is_retryable() {
            return;
        }
        if let Some(delay) = status.restart.record_failed_attempt() {
            let generation = status.generation;
            let this = self.clone();
            status.timers.retry = Some(tokio::spawn(async move {
                sleep(delay).await;
                this.on_retry_due(generation);
            }));
        }
    }

    fn on_grace_elapsed(&self, generation: u64) {
        let mut status = self.lock_status();
        if status.generation != generation || status.update_state != UpdateState::Starting {
            return;
        }
        status.timers.grace = None;

        if self.inner.source.is_active() {
            self.mark_active(&mut status);
        } else {
            let grace = self.inner.config.start_grace_secs;
            self.fail(
                &mut status,
                MotionError::StartFailed(format!("updates not active after {grace:.1}s")),
            );
        }
        self.publish(&status);
    }

    fn on_retry_due(&self, generation: u64) {
        let mut status = self.lock_status();
        if status.generation != generation || !matches!(status.update_state, UpdateState::Error(_)) {
            return;
        }
        status.timers.retry = None;

        info!(
            "retrying motion updates (attempt {}/{})",
            status.restart.attempts, status.restart.max_attempts
        );
        // Failures are already reflected in the state.
        let _ = self.begin_start(&mut status);
        self.publish(&status);
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Feed one acquisition callback. Samples are only accepted while
    /// starting or active; the first sample promotes `Starting` to `Active`.
    pub fn handle_update(&self, update: SourceUpdate) -> Option<ProcessedSample> {
        let mut status = self.lock_status();
        if !status.update_state.is_running() {
            debug!("update dropped while {:?}", status.update_state);
            return None;
        }

        let sample = match update {
            SourceUpdate::Sample(sample) => sample,
            SourceUpdate::Error(err) => {
                self.fail(&mut status, err);
                self.publish(&status);
                return None;
            }
            SourceUpdate::Empty => {
                self.fail(
                    &mut status,
                    MotionError::NoData("callback carried neither sample nor error".to_string()),
                );
                self.publish(&status);
                return None;
            }
        };

        if status.update_state == UpdateState::Starting {
            self.mark_active(&mut status);
        }

        let sample = match (sample.delta_time, status.latest.as_ref()) {
            (None, Some(prev)) => {
                let dt = sample.timestamp - prev.timestamp;
                sample.with_delta_time(Some(dt))
            }
            _ => sample,
        };
        status.latest = Some(sample.clone());
        status.samples_received += 1;

        let processed = self.lock_processor().process(&sample);
        status.events_emitted += processed.events.len() as u64;

        // No receivers is fine.
        let _ = self.inner.samples_tx.send(processed.sample.clone());
        for event in &processed.events {
            let _ = self.inner.events_tx.send(event.clone());
        }

        self.publish(&status);
        Some(processed)
    }

    // ── Calibration ──────────────────────────────────────────────────────

    /// Zero the head pose after a settling delay, using whichever sample is
    /// current when the delay ends.
    pub fn request_calibration(&self) -> Result<(), CalibrationSkip> {
        let mut status = self.lock_status();
        let st = &mut *status;
        st.calibrator.begin(st.latest.as_ref())?;

        let settle = self.inner.config.calibration_settle();
        let generation = st.generation;
        let this = self.clone();
        st.timers.calibration = Some(tokio::spawn(async move {
            sleep(settle).await;
            this.on_calibration_due(generation);
        }));

        self.publish(&status);
        Ok(())
    }

    fn on_calibration_due(&self, generation: u64) {
        let mut status = self.lock_status();
        if status.generation != generation {
            return;
        }
        status.timers.calibration = None;

        let st = &mut *status;
        if let Some(reference) = st.calibrator.commit(st.latest.as_ref()) {
            self.lock_processor().calibrate_now(reference);
            debug!(
                "calibration committed: roll {:.1}° pitch {:.1}° yaw {:.1}°",
                reference.roll_degrees(),
                reference.pitch_degrees(),
                reference.yaw_degrees()
            );
        }
        self.publish(&status);
    }

    // ── Processor settings ───────────────────────────────────────────────

    pub fn update_processor_config(&self, config: ProcessorConfig) {
        self.lock_processor().update_filter_settings(config);
    }

    pub fn reset_processor(&self) {
        self.lock_processor().reset_filters();
    }

    pub fn clear_history(&self) {
        self.lock_processor().clear_history();
    }

    // ── Internals ────────────────────────────────────────────────────────

    // Lock order: status, then processor.
    fn lock_status(&self) -> MutexGuard<'_, SessionStatus> {
        self.inner.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_processor(&self) -> MutexGuard<'_, MotionDataProcessor> {
        self.inner.processor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_snapshot(&self, status: &SessionStatus) -> SessionSnapshot {
        snapshot_of(status, &self.lock_processor())
    }

    fn publish(&self, status: &SessionStatus) {
        self.inner.snapshot_tx.send_replace(self.build_snapshot(status));
    }
}

fn snapshot_of(status: &SessionStatus, processor: &MotionDataProcessor) -> SessionSnapshot {
    SessionSnapshot {
        authorization: status.authorization,
        connection: status.connection,
        update_state: status.update_state.clone(),
        retry_count: status.restart.attempts,
        retry_pending: status.timers.retry.is_some(),
        last_retry_delay_secs: status.restart.last_delay.map(|d| d.as_secs_f64()),
        calibrating: status.calibrator.in_flight(),
        calibration_offset: processor.calibration_offset(),
        samples_received: status.samples_received,
        events_emitted: status.events_emitted,
        stats: processor.stats(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Axis3, GestureKind};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    struct MockSource {
        authorization: Mutex<Authorization>,
        motion_available: AtomicBool,
        activate_on_start: AtomicBool,
        start_error: Mutex<Option<MotionError>>,
        active: AtomicBool,
        start_calls: AtomicU32,
        stop_calls: AtomicU32,
    }

    impl MockSource {
        fn new(activate_on_start: bool) -> Self {
            Self {
                authorization: Mutex::new(Authorization::Authorized),
                motion_available: AtomicBool::new(true),
                activate_on_start: AtomicBool::new(activate_on_start),
                start_error: Mutex::new(None),
                active: AtomicBool::new(false),
                start_calls: AtomicU32::new(0),
                stop_calls: AtomicU32::new(0),
            }
        }

        fn starts(&self) -> u32 {
            self.start_calls.load(Ordering::SeqCst)
        }

        fn stops(&self) -> u32 {
            self.stop_calls.load(Ordering::SeqCst)
        }
    }

    impl MotionSource for MockSource {
        fn authorization_status(&self) -> Authorization {
            *self.authorization.lock().unwrap()
        }

        fn is_device_motion_available(&self) -> bool {
            self.motion_available.load(Ordering::SeqCst)
        }

        fn start_updates(&self) -> Result<(), MotionError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.start_error.lock().unwrap().clone() {
                return Err(err);
            }
            if self.activate_on_start.load(Ordering::SeqCst) {
                self.active.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        fn stop_updates(&self) {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.active.store(false, Ordering::SeqCst);
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
    }

    fn session_with(source: MockSource, processor: ProcessorConfig) -> MotionSession<MockSource> {
        let session = MotionSession::new(source, processor, SessionConfig::default());
        session.handle_route_change(true, Some(true));
        session
    }

    fn connected(source: MockSource) -> MotionSession<MockSource> {
        session_with(source, ProcessorConfig::default())
    }

    fn unfiltered() -> ProcessorConfig {
        ProcessorConfig {
            filtering_enabled: false,
            ..ProcessorConfig::default()
        }
    }

    fn sample(t: f64, pitch: f64) -> MotionSample {
        MotionSample::new(
            t,
            Attitude::new(0.0, pitch, 0.0),
            Axis3::ZERO,
            Axis3::ZERO,
            Axis3::new(0.0, 0.0, -1.0),
        )
    }

    async fn advance_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_is_terminal() {
        let source = MockSource::new(true);
        *source.authorization.lock().unwrap() = Authorization::Denied;
        let session = connected(source);

        let err = session.start().unwrap_err();
        assert!(matches!(err, MotionError::PermissionDenied(_)));
        assert!(matches!(session.update_state(), UpdateState::Error(MotionError::PermissionDenied(_))));

        advance_ms(60_000).await;
        assert_eq!(session.source().starts(), 0);
        assert!(!session.snapshot().retry_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requires_motion_capable_route() {
        let session = MotionSession::new(
            MockSource::new(true),
            ProcessorConfig::default(),
            SessionConfig::default(),
        );
        assert!(matches!(session.start(), Err(MotionError::NotAvailable(_))));
        assert_eq!(session.source().starts(), 0);

        session.handle_route_change(true, Some(false));
        assert_eq!(session.connection(), Connection::ConnectedUnsupported);
        assert!(session.start().is_err());

        session.handle_route_change(true, Some(true));
        assert!(session.start().is_ok());
        assert_eq!(session.update_state(), UpdateState::Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulator_relaxation() {
        let config = SessionConfig {
            allow_simulator: true,
            ..SessionConfig::default()
        };
        let session = MotionSession::new(MockSource::new(true), ProcessorConfig::default(), config);
        assert!(session.start().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_changes() {
        let session = MotionSession::new(
            MockSource::new(true),
            ProcessorConfig::default(),
            SessionConfig::default(),
        );
        assert_eq!(session.handle_route_change(true, None), Connection::Connected);
        assert_eq!(
            session.handle_route_change(true, Some(true)),
            Connection::ConnectedMotionAvailable
        );
        session.source().motion_available.store(false, Ordering::SeqCst);
        assert_eq!(
            session.handle_route_change(true, Some(true)),
            Connection::ConnectedUnsupported
        );
        assert_eq!(session.handle_route_change(false, Some(true)), Connection::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_promotes_to_active() {
        let session = connected(MockSource::new(true));
        session.start().unwrap();
        assert_eq!(session.update_state(), UpdateState::Starting);

        advance_ms(1_050).await;
        assert_eq!(session.update_state(), UpdateState::Active);
        assert_eq!(session.retry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sample_promotes_to_active() {
        let session = connected(MockSource::new(false));
        session.start().unwrap();
        let out = session.handle_update(SourceUpdate::Sample(sample(0.0, 0.0)));
        assert!(out.is_some());
        assert_eq!(session.update_state(), UpdateState::Active);

        // The grace timer was disarmed by the sample.
        advance_ms(2_000).await;
        assert_eq!(session.update_state(), UpdateState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_doubles_then_resets_on_success() {
        let session = connected(MockSource::new(false));
        session.start().unwrap();

        let mut delays = Vec::new();

        // t=1.0 grace expires -> retry in 2s
        advance_ms(1_050).await;
        assert!(matches!(session.update_state(), UpdateState::Error(MotionError::StartFailed(_))));
        delays.push(session.snapshot().last_retry_delay_secs);
        assert_eq!(session.retry_count(), 1);

        // t=3.0 retry, t=4.0 fails -> retry in 4s
        advance_ms(2_000).await;
        assert_eq!(session.update_state(), UpdateState::Starting);
        advance_ms(1_000).await;
        delays.push(session.snapshot().last_retry_delay_secs);
        assert_eq!(session.retry_count(), 2);

        // t=8.0 retry, t=9.0 fails -> retry in 8s
        advance_ms(4_000).await;
        advance_ms(1_000).await;
        delays.push(session.snapshot().last_retry_delay_secs);
        assert_eq!(session.retry_count(), 3);

        assert_eq!(delays, vec![Some(2.0), Some(4.0), Some(8.0)]);
        assert_eq!(session.source().starts(), 3);

        // t=17.0 retry succeeds
        session.source().activate_on_start.store(true, Ordering::SeqCst);
        advance_ms(8_000).await;
        advance_ms(1_000).await;
        assert_eq!(session.update_state(), UpdateState::Active);
        assert_eq!(session.retry_count(), 0);
        assert_eq!(session.source().starts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_need_explicit_start() {
        let config = SessionConfig {
            max_retry_count: 2,
            ..SessionConfig::default()
        };
        let source = MockSource::new(false);
        *source.start_error.lock().unwrap() = Some(MotionError::NotAvailable("sensor busy".into()));
        let session = MotionSession::new(source, ProcessorConfig::default(), config);
        session.handle_route_change(true, Some(true));

        assert!(session.start().is_err());
        advance_ms(120_000).await;

        assert_eq!(session.source().starts(), 3);
        assert!(matches!(session.update_state(), UpdateState::Error(MotionError::NotAvailable(_))));
        assert!(!session.snapshot().retry_pending);

        *session.source().start_error.lock().unwrap() = None;
        session.source().activate_on_start.store(true, Ordering::SeqCst);
        session.start().unwrap();
        assert_eq!(session.retry_count(), 0);
        advance_ms(1_050).await;
        assert_eq!(session.update_state(), UpdateState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_retry() {
        let session = connected(MockSource::new(false));
        session.start().unwrap();
        advance_ms(1_050).await;
        assert!(session.snapshot().retry_pending);

        session.stop();
        assert_eq!(session.update_state(), UpdateState::Stopped);
        assert!(!session.snapshot().retry_pending);

        advance_ms(60_000).await;
        assert_eq!(session.source().starts(), 1);
        assert_eq!(session.update_state(), UpdateState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_start_replaces_pending_retry() {
        let session = connected(MockSource::new(false));
        session.start().unwrap();
        advance_ms(1_050).await; // retry due at t=3.0

        advance_ms(450).await; // t=1.5
        session.start().unwrap();
        assert_eq!(session.source().starts(), 2);
        assert_eq!(session.retry_count(), 0);

        advance_ms(1_700).await; // t=3.2: old retry must not have fired
        assert_eq!(session.source().starts(), 2);
        assert_eq!(session.retry_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_noop() {
        let session = connected(MockSource::new(true));
        session.start().unwrap();
        session.start().unwrap();
        assert_eq!(session.source().starts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_callback_is_no_data_and_retries() {
        let session = connected(MockSource::new(true));
        session.start().unwrap();
        session.handle_update(SourceUpdate::Sample(sample(0.0, 0.0)));

        assert!(session.handle_update(SourceUpdate::Empty).is_none());
        assert!(matches!(session.update_state(), UpdateState::Error(MotionError::NoData(_))));
        assert!(session.snapshot().retry_pending);
        assert!(session.latest_sample().is_some());

        advance_ms(2_050).await;
        assert_eq!(session.source().starts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_uses_retry_path() {
        let session = connected(MockSource::new(true));
        session.start().unwrap();
        session.handle_update(SourceUpdate::Error(MotionError::StartFailed("read failed".into())));
        assert_eq!(session.retry_count(), 1);
        assert_eq!(session.snapshot().last_retry_delay_secs, Some(2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_ignored_when_stopped() {
        let session = connected(MockSource::new(true));
        assert!(session.handle_update(SourceUpdate::Sample(sample(0.0, 0.0))).is_none());
        assert_eq!(session.snapshot().samples_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_ends_session_without_retry() {
        let session = connected(MockSource::new(true));
        session.start().unwrap();
        session.handle_update(SourceUpdate::Sample(sample(0.0, 0.0)));
        let stops = session.source().stops();

        session.handle_route_change(false, None);
        assert!(matches!(session.update_state(), UpdateState::Error(MotionError::ConnectionLost(_))));
        assert_eq!(session.source().stops(), stops + 1);
        assert!(session.latest_sample().is_none());

        advance_ms(60_000).await;
        assert_eq!(session.source().starts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_backoff() {
        let session = connected(MockSource::new(false));
        session.start().unwrap();
        advance_ms(1_050).await;
        assert!(session.snapshot().retry_pending);

        session.handle_route_change(false, None);
        advance_ms(60_000).await;
        assert_eq!(session.source().starts(), 1);
        assert!(matches!(session.update_state(), UpdateState::Error(MotionError::ConnectionLost(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delta_time_from_previous_sample() {
        let session = connected(MockSource::new(true));
        session.start().unwrap();
        session.handle_update(SourceUpdate::Sample(sample(1.0, 0.0)));
        let out = session.handle_update(SourceUpdate::Sample(sample(1.25, 0.0))).unwrap();
        assert_eq!(out.sample.delta_time, Some(0.25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_commits_latest_sample_after_settle() {
        let session = session_with(MockSource::new(true), unfiltered());
        session.start().unwrap();
        session.handle_update(SourceUpdate::Sample(sample(0.0, 0.3)));

        session.request_calibration().unwrap();
        assert_eq!(session.request_calibration(), Err(CalibrationSkip::AlreadyInFlight));
        assert!(session.snapshot().calibrating);

        session.handle_update(SourceUpdate::Sample(sample(0.1, 0.5)));
        advance_ms(600).await;

        let snapshot = session.snapshot();
        assert!(!snapshot.calibrating);
        assert_eq!(snapshot.calibration_offset, Some(Attitude::new(0.0, 0.5, 0.0)));

        let out = session.handle_update(SourceUpdate::Sample(sample(0.2, 0.5))).unwrap();
        assert_eq!(out.sample.attitude, Attitude::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_without_sample_is_noop() {
        let session = connected(MockSource::new(true));
        assert_eq!(session.request_calibration(), Err(CalibrationSkip::NoSample));
        assert!(!session.snapshot().calibrating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_calibration() {
        let session = connected(MockSource::new(true));
        session.start().unwrap();
        session.handle_update(SourceUpdate::Sample(sample(0.0, 0.3)));
        session.request_calibration().unwrap();
        session.stop();

        advance_ms(1_000).await;
        assert_eq!(session.snapshot().calibration_offset, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_start_drops_calibration_requested_in_error() {
        let config = SessionConfig {
            max_retry_count: 0,
            ..SessionConfig::default()
        };
        let session = MotionSession::new(MockSource::new(true), unfiltered(), config);
        session.handle_route_change(true, Some(true));
        session.start().unwrap();
        session.handle_update(SourceUpdate::Sample(sample(0.0, 0.3)));
        session.handle_update(SourceUpdate::Error(MotionError::StartFailed("read failed".into())));
        assert!(matches!(session.update_state(), UpdateState::Error(_)));

        // The last sample survives the failure, so a request is accepted.
        session.request_calibration().unwrap();
        session.start().unwrap();
        assert!(!session.snapshot().calibrating);

        session.handle_update(SourceUpdate::Sample(sample(1.0, 0.5)));
        advance_ms(5_000).await;
        let snapshot = session.snapshot();
        assert!(!snapshot.calibrating);
        assert_eq!(snapshot.calibration_offset, None);

        session.request_calibration().unwrap();
        advance_ms(600).await;
        let snapshot = session.snapshot();
        assert!(!snapshot.calibrating);
        assert_eq!(snapshot.calibration_offset, Some(Attitude::new(0.0, 0.5, 0.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers_receive_samples_events_and_state() {
        let session = session_with(MockSource::new(true), unfiltered());
        let mut samples = session.subscribe_samples();
        let mut events = session.subscribe_events();
        let mut status = session.watch_status();

        session.start().unwrap();
        session.handle_update(SourceUpdate::Sample(sample(0.0, (-60.0f64).to_radians())));

        let received = samples.recv().await.unwrap();
        assert_eq!(received.timestamp, 0.0);
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, GestureKind::LookingDown);

        assert!(status.has_changed().unwrap());
        let snapshot = status.borrow_and_update().clone();
        assert_eq!(snapshot.update_state, UpdateState::Active);
        assert_eq!(snapshot.samples_received, 1);
        assert_eq!(snapshot.events_emitted, 1);
        assert_eq!(snapshot.stats.samples_processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_start_resets_processor() {
        let session = connected(MockSource::new(true));
        session.start().unwrap();
        for i in 0..5 {
            session.handle_update(SourceUpdate::Sample(sample(i as f64 / 30.0, 0.0)));
        }
        assert_eq!(session.processing_stats().samples_processed, 5);

        session.stop();
        session.start().unwrap();
        assert_eq!(session.processing_stats().samples_processed, 0);
    }
}
