use log::{error, info, warn};
use std::time::Duration;

/// Backoff bookkeeping for automatic restarts of the motion stream.
///
/// Each failure bumps the attempt counter and schedules the next try after
/// `2^attempts` seconds, capped at `max_delay`. A successful start clears it.
#[derive(Clone, Debug)]
pub struct RestartState {
    pub name: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub max_delay: Duration,
    pub last_delay: Option<Duration>,
}

impl RestartState {
    pub fn new(name: &str, max_attempts: u32, max_delay_secs: u64) -> Self {
        RestartState {
            name: name.to_string(),
            attempts: 0,
            max_attempts,
            max_delay: Duration::from_secs(max_delay_secs),
            last_delay: None,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(1u64 << attempt.min(63)).min(self.max_delay)
    }

    /// Check if another automatic attempt is allowed
    pub fn can_restart(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Record a failure. Returns the delay for the next attempt, or `None`
    /// once the budget is spent.
    pub fn record_failed_attempt(&mut self) -> Option<Duration> {
        if !self.can_restart() {
            error!(
                "[RESTART] {} gave up after {} attempt(s); explicit restart required",
                self.name, self.attempts
            );
            self.last_delay = None;
            return None;
        }

        self.attempts += 1;
        let delay = self.delay_for(self.attempts);
        self.last_delay = Some(delay);

        warn!(
            "[RESTART] {} attempt {}/{} scheduled in {:.1}s (capped at {}s)",
            self.name,
            self.attempts,
            self.max_attempts,
            delay.as_secs_f64(),
            self.max_delay.as_secs()
        );
        Some(delay)
    }

    /// Record a successful start and reset state
    pub fn record_success(&mut self) {
        if self.attempts > 0 {
            info!(
                "[RESTART] ✓ {} started after {} retry attempt(s)",
                self.name, self.attempts
            );
        }
        self.attempts = 0;
        self.last_delay = None;
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_delay = None;
    }

    pub fn status(&self) -> String {
        match self.last_delay {
            None if self.attempts == 0 => format!("{}: OK", self.name),
            None => format!("{}: MAX_ATTEMPTS_EXCEEDED", self.name),
            Some(delay) => format!(
                "{}: RESTART_PENDING (in {:.1}s, attempt {}/{})",
                self.name,
                delay.as_secs_f64(),
                self.attempts,
                self.max_attempts
            ),
        }
    }
}

impl Default for RestartState {
    fn default() -> Self {
        Self::new("Headset", 5, 30)
    }
}
