//! Bounded retry-polling for eventually consistent conditions.
//!
//! The operation reports [`Poll::Ready`] when the awaited condition holds,
//! [`Poll::NotReady`] with a reason when it may still become true, or an
//! error when it never can. Delay between attempts is fixed: no backoff,
//! no jitter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::HarnessError;

/// Outcome of one successful poll call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    NotReady(String),
}

impl<T> Poll<T> {
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self::NotReady(reason.into())
    }
}

/// Attempt budget and fixed delay for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts including the first (minimum 1).
    pub max_attempts: u32,
    /// Sleep between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Upper bound on time spent sleeping.
    pub fn max_wait(&self) -> Duration {
        self.delay * self.max_attempts.max(1).saturating_sub(1)
    }
}

/// Why a poll loop gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("'{description}' still not ready after {attempts} attempts: {last_reason}")]
    Exhausted {
        description: String,
        attempts: u32,
        last_reason: String,
    },

    #[error(transparent)]
    Fatal(E),
}

impl From<RetryError<HarnessError>> for HarnessError {
    fn from(err: RetryError<HarnessError>) -> Self {
        match err {
            RetryError::Exhausted {
                description,
                attempts,
                last_reason,
            } => HarnessError::RetriesExhausted {
                description,
                attempts,
                last_reason,
            },
            RetryError::Fatal(inner) => inner,
        }
    }
}

/// Blocks between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real-time sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps without blocking.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut guard) = self.slept.lock() {
            guard.push(duration);
        }
    }
}

/// Poll `op` until it is ready, fails fatally, or the budget runs out.
///
/// `op` receives the 1-based attempt number. No sleep follows the last
/// attempt.
pub fn poll_until<T, E, F>(
    description: &str,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Result<Poll<T>, E>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=max_attempts {
        debug!(description, attempt, max_attempts, "Polling");
        match op(attempt) {
            Ok(Poll::Ready(value)) => {
                info!(description, attempt, "Condition met");
                return Ok(value);
            }
            Ok(Poll::NotReady(reason)) => {
                info!(
                    description,
                    attempt,
                    max_attempts,
                    reason = %reason,
                    "Not ready yet"
                );
                last_reason = reason;
                if attempt < max_attempts {
                    sleeper.sleep(policy.delay);
                }
            }
            Err(err) => {
                warn!(description, attempt, error = %err, "Poll failed (non-retryable)");
                return Err(RetryError::Fatal(err));
            }
        }
    }

    warn!(description, attempts = max_attempts, last_reason = %last_reason, "Retries exhausted");
    Err(RetryError::Exhausted {
        description: description.to_string(),
        attempts: max_attempts,
        last_reason,
    })
}

/// Binds a policy to a sleeper so callers only pass the operation.
pub struct Poller<'a> {
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Poller<'a> {
    pub fn new(policy: RetryPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn poll<T, E, F>(&self, description: &str, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<Poll<T>, E>,
        E: std::fmt::Display,
    {
        poll_until(description, self.policy, self.sleeper, op)
    }
}
