//! Retry with exponential backoff and jitter
//!
//! Every network call goes through a [`Retrier`]. The retrier is an owned
//! object: it carries its RNG, its sleeper and its attempt counters, so a
//! test can swap the sleeper for [`NoSleep`] and inspect the counters.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Backoff policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,

    /// Fraction of the delay that may be shaved off at random, in `[0, 1]`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.initial_delay > self.max_delay {
            return Err("retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("retry.jitter must be in [0, 1]".to_string());
        }
        Ok(())
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based):
    /// `min(initial * 2^(attempt-1), max)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }
}

/// Errors that know whether another attempt could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Something that can wait.
pub trait Sleeper: Send {
    fn sleep(&self, delay: Duration);
}

/// Real sleeper
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Sleeper that returns immediately (tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _delay: Duration) {}
}

/// Counters accumulated across every operation run by one retrier
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RetryStats {
    pub operations: u64,
    pub attempts: u64,
    pub retries: u64,
    pub exhausted: u64,
    #[serde(with = "duration_ms")]
    pub total_delay: Duration,
}

/// Failure of a retried operation
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt failed with a retryable error
    #[error("{operation}: gave up after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: E,
    },

    /// The error is not worth retrying
    #[error("{operation}: {error}")]
    Determinate {
        operation: String,
        attempts: u32,
        #[source]
        error: E,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Determinate { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// The last underlying error
    pub fn error(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Determinate { error, .. } => error,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Determinate { error, .. } => error,
        }
    }
}

/// Owned retry executor
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
    rng: StdRng,
    stats: RetryStats,
}

impl fmt::Debug for Retrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Box::new(ThreadSleeper),
            rng: StdRng::from_entropy(),
            stats: RetryStats::default(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Deterministic jitter
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &RetryStats {
        &self.stats
    }

    /// Jittered delay after failed attempt `attempt`.
    fn delay(&mut self, attempt: u32) -> Duration {
        let base = self.policy.base_delay(attempt);
        if self.policy.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 - self.policy.jitter * self.rng.gen::<f64>();
        base.mul_f64(factor)
    }

    /// Run `op` until it succeeds, fails determinately, or the attempt budget
    /// runs out. `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&mut self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + Retryable + 'static,
        F: FnMut(u32) -> Result<T, E>,
    {
        self.stats.operations += 1;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.stats.attempts += 1;

            let error = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(RetryError::Determinate {
                    operation: operation.to_string(),
                    attempts: attempt,
                    error,
                });
            }

            if attempt >= max_attempts {
                self.stats.exhausted += 1;
                tracing::warn!(operation, attempts = attempt, error = %error, "retry budget exhausted");
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay(attempt);
            tracing::warn!(
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying"
            );
            self.stats.retries += 1;
            self.stats.total_delay += delay;
            self.sleeper.sleep(delay);
        }
    }
}

/// One-shot form: build a retrier for `policy` and run `op` once through it.
pub fn with_retry<T, E, F>(operation: &str, policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    E: std::error::Error + Retryable + 'static,
    F: FnMut(u32) -> Result<T, E>,
{
    Retrier::new(policy.clone()).run(operation, op)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
