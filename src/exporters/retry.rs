// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_elapsed_time: Duration,
    /// Ignore `max_elapsed_time` and keep retrying
    pub indefinite_retry: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(30),
            max_elapsed_time: Duration::from_secs(300),
            indefinite_retry: true,
        }
    }
}

/// Exponential backoff with jitter for retrying a single record.
pub struct Backoff {
    config: RetryConfig,
    current_backoff: Duration,
    start: Instant,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            current_backoff: config.initial_backoff,
            config,
            start: Instant::now(),
            attempts: 0,
        }
    }

    /// Number of delays handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Delay before the next attempt, or None when retrying should stop.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let backoff_ms = self.current_backoff.as_millis() as i64;

        let mut v = backoff_ms / 2;
        // avoid div by zero
        if v == 0 {
            v = 1;
        }

        let jitter = (rand::random::<i64>() % v) - (v / 2);
        let mut sleep_ms = backoff_ms + jitter;
        if sleep_ms < 0 {
            sleep_ms = 1;
        }
        let sleep_duration = Duration::from_millis(sleep_ms as u64);

        // Stop if sleeping would carry us past the maximum elapsed time
        if !self.config.indefinite_retry
            && self.start.elapsed() + sleep_duration > self.config.max_elapsed_time
        {
            return None;
        }

        self.attempts += 1;
        self.current_backoff = std::cmp::min(self.current_backoff * 2, self.config.max_backoff);

        Some(sleep_duration)
    }
}
