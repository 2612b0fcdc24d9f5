//! Per-minute and per-hour attempt limits.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A rate-limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateWindow {
    Minute,
    Hour,
}

impl RateWindow {
    pub fn duration(&self) -> Duration {
        match self {
            RateWindow::Minute => Duration::from_secs(60),
            RateWindow::Hour => Duration::from_secs(3600),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateWindow::Minute => "minute",
            RateWindow::Hour => "hour",
        }
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an attempt would exceed a window's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub window: RateWindow,
    pub limit: u32,
}

#[derive(Debug, Clone)]
struct WindowCounter {
    window: RateWindow,
    limit: u32,
    started: Instant,
    count: u32,
}

impl WindowCounter {
    fn new(window: RateWindow, limit: u32, now: Instant) -> Self {
        Self {
            window,
            limit,
            started: now,
            count: 0,
        }
    }

    /// Starts a fresh window once the current one has elapsed.
    fn maybe_reset(&mut self, now: Instant) {
        if now.saturating_duration_since(self.started) >= self.window.duration() {
            self.started = now;
            self.count = 0;
        }
    }

    fn is_full(&self) -> bool {
        self.count >= self.limit
    }
}

/// Independent fixed-window counters for minutes and hours.
///
/// Only accepted attempts are counted. Methods take `&mut self`; share it
/// behind a lock if several tasks need it.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    minute: WindowCounter,
    hour: WindowCounter,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32, max_per_hour: u32) -> Self {
        let now = Instant::now();
        Self {
            minute: WindowCounter::new(RateWindow::Minute, max_per_minute, now),
            hour: WindowCounter::new(RateWindow::Hour, max_per_hour, now),
        }
    }

    pub fn try_acquire(&mut self) -> Result<(), RateLimitExceeded> {
        self.try_acquire_at(Instant::now())
    }

    /// Counts one attempt at `now` unless a window is full.
    pub fn try_acquire_at(&mut self, now: Instant) -> Result<(), RateLimitExceeded> {
        self.minute.maybe_reset(now);
        self.hour.maybe_reset(now);

        for counter in [&self.minute, &self.hour] {
            if counter.is_full() {
                return Err(RateLimitExceeded {
                    window: counter.window,
                    limit: counter.limit,
                });
            }
        }

        self.minute.count += 1;
        self.hour.count += 1;
        Ok(())
    }

    /// Accepted attempts in the current minute and hour windows.
    pub fn counts(&self) -> (u32, u32) {
        (self.minute.count, self.hour.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_limit_resets_after_window() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(3, 100);
        limiter.minute.started = start;
        limiter.hour.started = start;

        for i in 0..3 {
            assert!(limiter.try_acquire_at(start + Duration::from_secs(i)).is_ok());
        }
        let err = limiter
            .try_acquire_at(start + Duration::from_secs(30))
            .unwrap_err();
        assert_eq!(
            err,
            RateLimitExceeded {
                window: RateWindow::Minute,
                limit: 3
            }
        );
        // Rejections are not counted.
        assert_eq!(limiter.counts(), (3, 3));

        assert!(limiter
            .try_acquire_at(start + Duration::from_secs(61))
            .is_ok());
        assert_eq!(limiter.counts(), (1, 4));
    }

    #[test]
    fn test_hour_limit_is_independent() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(3, 5);
        limiter.minute.started = start;
        limiter.hour.started = start;

        for _ in 0..3 {
            assert!(limiter.try_acquire_at(start).is_ok());
        }
        let later = start + Duration::from_secs(90);
        assert!(limiter.try_acquire_at(later).is_ok());
        assert!(limiter.try_acquire_at(later).is_ok());

        let err = limiter.try_acquire_at(later).unwrap_err();
        assert_eq!(err.window, RateWindow::Hour);

        assert!(limiter
            .try_acquire_at(start + Duration::from_secs(3600))
            .is_ok());
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let mut limiter = RateLimiter::new(0, 10);
        assert_eq!(limiter.try_acquire().unwrap_err().window, RateWindow::Minute);
    }
}
