//! A fixed-window rate limiter.

use std::time::Duration;

use tokio::{
  sync::Mutex,
  time::{Instant, sleep},
};

#[derive(Debug)]
struct Window {
  started: Instant,
  used:    u32,
}

/// Admits at most `max` acquisitions per `window`. Callers over the limit
/// wait for the next window instead of failing.
#[derive(Debug)]
pub struct RateLimiter {
  max:    u32,
  window: Duration,
  state:  Mutex<Window>,
}

impl RateLimiter {
  pub fn new(max: u32, window: Duration) -> Self {
    Self {
      max: max.max(1),
      window,
      state: Mutex::new(Window { started: Instant::now(), used: 0 }),
    }
  }

  /// Wait until a slot in the current window is free and take it.
  pub async fn acquire(&self) {
    loop {
      let wait = {
        let mut w = self.state.lock().await;
        let now = Instant::now();
        if now.duration_since(w.started) >= self.window {
          w.started = now;
          w.used = 0;
        }
        if w.used < self.max {
          w.used += 1;
          return;
        }
        (w.started + self.window).saturating_duration_since(now)
      };
      sleep(wait).await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn admits_max_per_window() {
    let limiter = RateLimiter::new(5, Duration::from_millis(1000));
    let start = Instant::now();

    for _ in 0..5 {
      limiter.acquire().await;
    }
    assert!(start.elapsed() < Duration::from_millis(1000));

    limiter.acquire().await;
    assert!(start.elapsed() >= Duration::from_millis(1000));
  }

  #[tokio::test(start_paused = true)]
  async fn twelve_jobs_take_three_windows() {
    let limiter = RateLimiter::new(5, Duration::from_millis(1000));
    let start = Instant::now();

    for _ in 0..12 {
      limiter.acquire().await;
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(2000));
    assert!(elapsed < Duration::from_millis(3000));
  }

  #[tokio::test(start_paused = true)]
  async fn zero_max_still_admits_one() {
    let limiter = RateLimiter::new(0, Duration::from_millis(100));
    limiter.acquire().await;
  }
}
