//! Bounded exponential backoff
//!
//! The delay schedule is a pure function of the attempt number, and waiting
//! goes through [`Sleeper`] so the retry loop can be driven in tests without
//! real time passing.

use crate::error::CallFailure;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, counting the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delays for attempts 1, 2, 3, ...: `base * 2^(attempt - 1)`, capped at
    /// `max_delay`.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        // ExponentialBackoff starts at `2 * factor`; halving shifts it back to `base`.
        ExponentialBackoff::from_millis(2)
            .factor(base_ms)
            .max_delay(self.max_delay.saturating_mul(2))
            .map(|delay| delay / 2)
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Past 64 doublings the strategy has saturated at the cap.
        let index = attempt.saturating_sub(1).min(64) as usize;
        self.schedule().nth(index).unwrap_or(self.max_delay)
    }

    /// Delay after `failure`, stretched to any server-provided hint.
    pub fn backoff_for(&self, attempt: u32, failure: &CallFailure) -> Duration {
        let delay = self.delay_for(attempt);
        match failure.retry_after {
            Some(hint) => delay.max(hint.min(self.max_delay)),
            None => delay,
        }
    }

    pub fn has_budget_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested delay.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}
