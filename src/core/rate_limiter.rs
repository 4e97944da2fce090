//! Fixed-window call throttle for one upstream.
//!
//! Callers over budget wait for the window boundary instead of being
//! rejected, so rate limiting alone only adds latency.

use crate::domain::ports::Clock;
use crate::utils::validation::{validate_positive_number, Validate};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub max_calls: u32,
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_calls: 30,
            window: Duration::from_secs(60),
        }
    }
}

impl Validate for RateLimiterConfig {
    fn validate(&self) -> crate::utils::error::Result<()> {
        validate_positive_number("rate_limit.max_calls", self.max_calls, 1)?;
        validate_positive_number("rate_limit.window_seconds", self.window.as_secs_f64(), 0.001)?;
        Ok(())
    }
}

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u32,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let start = clock.now();
        Self {
            config,
            clock,
            window: Mutex::new(Window { start, count: 0 }),
        }
    }

    /// Builds a limiter after checking the budget and window are non-zero.
    /// A zero budget would make `admit` wait forever.
    pub fn try_new(
        config: RateLimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> crate::utils::error::Result<Self> {
        config.validate()?;
        Ok(Self::new(config, clock))
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }

    /// Waits until a slot is free in the current window, then takes it.
    pub async fn admit(&self) {
        loop {
            let wait = match self.try_reserve() {
                None => return,
                Some(wait) => wait,
            };

            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                max_calls = self.config.max_calls,
                "Rate limit reached, waiting for next window"
            );
            // 在鎖外等待，其他呼叫者仍可在窗口重置後取得名額
            self.clock.sleep(wait).await;
        }
    }

    /// Reserves a slot if one is free; otherwise returns how long until the
    /// current window ends.
    fn try_reserve(&self) -> Option<Duration> {
        let now = self.clock.now();
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(window.start);
        if elapsed >= self.config.window {
            window.start = now;
            window.count = 0;
        }

        if window.count < self.config.max_calls {
            window.count += 1;
            return None;
        }

        let remaining = self
            .config
            .window
            .saturating_sub(now.saturating_duration_since(window.start));
        // never spin on a zero-length sleep
        Some(remaining.max(Duration::from_millis(1)))
    }

    /// Calls admitted in the window that is still running (0 once it lapsed).
    pub fn calls_in_current_window(&self) -> u32 {
        let now = self.clock.now();
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        if now.saturating_duration_since(window.start) >= self.config.window {
            0
        } else {
            window.count
        }
    }
}
