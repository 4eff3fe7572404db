use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest uninterrupted sleep, so that cancellation is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Wait was cancelled")]
    Cancelled,
}

/// Shared flag used to abort a blocking wait from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How often, and for how long, to poll an external condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Upper bound for the interval once backoff has grown it.
    pub max_interval: Duration,
    /// Factor applied to the interval after every unsuccessful poll.
    pub backoff: f64,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(3),
            backoff: 1.0,
            timeout: None,
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: f64, max_interval: Duration) -> Self {
        self.backoff = backoff.max(1.0);
        self.max_interval = max_interval.max(self.interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff).min(self.max_interval)
    }

    /// Polls `done` until it returns `true`, the timeout elapses or `cancel` fires.
    ///
    /// The condition is always checked once before any sleep. Returns the
    /// number of polls performed.
    pub fn wait_until(
        &self,
        cancel: Option<&CancellationToken>,
        mut done: impl FnMut() -> bool,
    ) -> Result<usize, WaitError> {
        let start = Instant::now();
        let mut interval = self.interval;
        let mut polls = 0;
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(WaitError::Cancelled);
            }
            polls += 1;
            if done() {
                return Ok(polls);
            }

            let mut sleep_for = interval;
            if let Some(timeout) = self.timeout {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(WaitError::Timeout(elapsed));
                }
                sleep_for = sleep_for.min(timeout - elapsed);
            }
            sleep_interruptibly(sleep_for, cancel)?;
            interval = self.next_interval(interval);
        }
    }
}

fn sleep_interruptibly(
    duration: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<(), WaitError> {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(WaitError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
