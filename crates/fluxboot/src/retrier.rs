//! Capped, fixed-backoff retry of fallible operations.

use std::fmt::Display;
use std::time::Duration;

/// Default number of attempts for network-bound git and provider calls.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Runs a closure up to a fixed number of times with a fixed pause between
/// attempts. No jitter and no exponential growth: callers compose several
/// retriers and the total latency must stay predictable.
///
/// The closure must be idempotent or otherwise safe to repeat.
#[derive(Debug, Clone)]
pub struct Retrier {
    max_retries: u32,
    backoff: Duration,
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BACKOFF)
    }
}

impl Retrier {
    /// Creates a retrier that attempts an operation `max_retries` times,
    /// sleeping `backoff` between attempts.
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff,
        }
    }

    /// Runs `f` until it succeeds or the attempt budget is exhausted,
    /// returning the first success or the last error.
    pub fn retry<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        self.retry_if(f, |_| true)
    }

    /// Like [`Retrier::retry`], but stops early when `should_retry` returns
    /// false for the error. Used for operations whose failures can be
    /// definitive (a missing repository stays missing no matter how often
    /// it is asked for).
    pub fn retry_if<T, E, F, P>(&self, mut f: F, should_retry: P) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries && should_retry(&e) => {
                    log::warn!(
                        "attempt {}/{} failed, retrying in {:?}: {}",
                        attempt,
                        self.max_retries,
                        self.backoff,
                        e
                    );
                    std::thread::sleep(self.backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
