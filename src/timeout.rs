//! Wait deadline
//!
//! `Process::wait` polls the manifest every `interval` until every Runner
//! is finished or `timeout` has elapsed. Timeouts are enforced locally;
//! nothing on the remote side is cancelled.

use std::time::{Duration, Instant};

/// Polling bounds for one `wait` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
        }
    }
}

impl WaitConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Interval and timeout must be nonzero, and the interval no longer
    /// than the timeout.
    pub fn validate(&self) -> Result<(), WaitValidationError> {
        if self.interval.is_zero() {
            return Err(WaitValidationError::ZeroInterval);
        }
        if self.timeout.is_zero() {
            return Err(WaitValidationError::ZeroTimeout);
        }
        if self.interval > self.timeout {
            return Err(WaitValidationError::IntervalExceedsTimeout {
                interval: self.interval,
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

/// Wait bound validation errors
#[derive(Debug, thiserror::Error)]
pub enum WaitValidationError {
    #[error("interval must be > 0")]
    ZeroInterval,

    #[error("timeout must be > 0")]
    ZeroTimeout,

    #[error("interval {interval:?} exceeds timeout {timeout:?}")]
    IntervalExceedsTimeout { interval: Duration, timeout: Duration },
}

/// Tracks the wall-clock budget of one `wait` call.
#[derive(Debug)]
pub struct Deadline {
    config: WaitConfig,
    start_time: Instant,
}

impl Deadline {
    pub fn start(config: WaitConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.config.timeout.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.config.timeout
    }

    /// Sleep for one interval, cut short so the deadline is never
    /// overshot. Returns false once the deadline has passed.
    pub fn sleep_interval(&self) -> bool {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return false;
        }
        std::thread::sleep(self.config.interval.min(remaining));
        true
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }
}
