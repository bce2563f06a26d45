//! Exponential backoff for failed sends.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How long to wait between attempts. The attempt budget itself travels
/// with each queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Delay after the first failure; doubles for each later one.
  pub base_delay: Duration,
  pub max_delay:  Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      base_delay: Duration::from_secs(5),
      max_delay:  Duration::from_secs(3600),
    }
  }
}

impl RetryPolicy {
  /// Delay after failed attempt `attempt` (1-based).
  pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self
      .base_delay
      .checked_mul(factor)
      .unwrap_or(self.max_delay)
      .min(self.max_delay)
  }

  /// When to try again after `attempts` failed attempts, or `None` once
  /// `max_attempts` is spent.
  pub fn next_attempt_at(
    &self,
    attempts: u32,
    max_attempts: u32,
    now: DateTime<Utc>,
  ) -> Option<DateTime<Utc>> {
    if attempts >= max_attempts {
      return None;
    }
    let delay = chrono::Duration::from_std(self.delay_for_attempt(attempts))
      .unwrap_or_else(|_| chrono::Duration::hours(1));
    Some(now + delay)
  }
}
