//! Sliding-window rate limiter.
//!
//! Bounds how many calls a user can make within a trailing time window.
//! Windows live in process memory only; a restart clears them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Per-user call timestamps, oldest first.
#[derive(Debug, Default)]
struct RateWindow {
    calls: VecDeque<Instant>,
}

impl RateWindow {
    /// Drop calls that are no longer inside the window.
    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.calls.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-user sliding-window limiter (in-memory, lock-free per shard).
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<u64, RateWindow>>,
    max_calls: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            max_calls,
            window,
        }
    }

    /// Check and record a call for `user_id` at the current instant.
    pub fn allow(&self, user_id: u64) -> bool {
        self.allow_at(user_id, Instant::now())
    }

    /// Check and record a call for `user_id` at `now`.
    ///
    /// Denied calls are not recorded.
    pub fn allow_at(&self, user_id: u64, now: Instant) -> bool {
        let mut entry = self.windows.entry(user_id).or_default();
        entry.evict(now, self.window);

        if entry.calls.len() < self.max_calls {
            entry.calls.push_back(now);
            true
        } else {
            debug!("Rate limit hit for user {}", user_id);
            false
        }
    }

    /// Remove windows whose calls have all expired.
    pub fn cleanup(&self) {
        self.cleanup_at(Instant::now());
    }

    pub fn cleanup_at(&self, now: Instant) {
        let window = self.window;
        self.windows.retain(|_, w| {
            w.evict(now, window);
            !w.calls.is_empty()
        });
    }

    /// Number of users currently tracked.
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denies_call_over_limit() {
        let limiter = RateLimiter::new(30, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..30 {
            assert!(limiter.allow_at(1, start + Duration::from_millis(i * 100)));
        }
        assert!(!limiter.allow_at(1, start + Duration::from_secs(5)));
        // Other users are unaffected
        assert!(limiter.allow_at(2, start + Duration::from_secs(5)));
    }

    #[test]
    fn test_oldest_call_expires_after_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.allow_at(7, start));
        assert!(limiter.allow_at(7, start + Duration::from_secs(10)));
        assert!(limiter.allow_at(7, start + Duration::from_secs(20)));
        assert!(!limiter.allow_at(7, start + Duration::from_secs(59)));

        // The first call left the window, exactly one slot frees up
        assert!(limiter.allow_at(7, start + Duration::from_secs(60)));
        assert!(!limiter.allow_at(7, start + Duration::from_secs(61)));
    }

    #[test]
    fn test_denied_calls_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.allow_at(1, start));
        for s in 1..10 {
            assert!(!limiter.allow_at(1, start + Duration::from_secs(s)));
        }
        // Only the first call counted, so the window is free at t=10
        assert!(limiter.allow_at(1, start + Duration::from_secs(10)));
    }

    #[test]
    fn test_cleanup_drops_idle_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        let start = Instant::now();
        limiter.allow_at(1, start);
        limiter.allow_at(2, start + Duration::from_millis(900));
        assert_eq!(limiter.tracked_users(), 2);

        limiter.cleanup_at(start + Duration::from_millis(1500));
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn test_independent_instances() {
        let a = RateLimiter::new(1, Duration::from_secs(60));
        let b = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(a.allow_at(1, now));
        assert!(b.allow_at(1, now));
        assert!(!a.allow_at(1, now));
    }

    #[test]
    fn test_concurrent_callers_respect_limit() {
        let limiter = RateLimiter::new(50, Duration::from_secs(60));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.allow_at(9, now)).count())
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
