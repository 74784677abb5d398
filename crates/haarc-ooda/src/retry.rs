//! Bounded retry with exponential backoff for act calls

use haarc_core::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts in total, first call included
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay added or removed at random
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` counts from 0.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * 2.0_f64.powi(attempt.min(30) as i32);
        let clamped = base.min(self.max_delay_ms as f64);

        let jitter_range = clamped * self.jitter_factor.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_millis((clamped + jitter).max(0.0) as u64)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Result of a retried call plus how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds or the policy is exhausted. Each attempt
/// is bounded by `per_attempt`; an elapsed attempt counts as a failure.
pub async fn retry_with_timeout<F, Fut, T>(
    policy: &RetryPolicy,
    per_attempt: Duration,
    operation_name: &str,
    mut operation: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max = policy.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(per_attempt, operation()).await {
            Ok(r) => r,
            Err(_) => Err(Error::timeout(operation_name, per_attempt.as_millis() as u64)),
        };
        match result {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if attempt >= max => {
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                }
            }
            Err(e) => {
                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(
                    "{} attempt {}/{} failed: {}. Retrying in {:?}",
                    operation_name, attempt, max, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
