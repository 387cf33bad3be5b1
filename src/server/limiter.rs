//! Per-user sliding-window rate limiting for the inbound message path

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Sliding window limiter: at most `capacity` events per rolling `window`
/// per user. Violations are reported to the caller so the offending session
/// can be answered with an explicit error frame instead of a silent drop.
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    hits: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            hits: DashMap::new(),
        }
    }

    /// Record one inbound event for the user; true when within the cap
    pub fn allow(&self, user_id: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.hits.entry(user_id.to_string()).or_default();

        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= self.window {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.len() >= self.capacity {
            return false;
        }
        entry.push_back(now);
        true
    }

    /// Drop all recorded events for a user (e.g. on disconnect)
    pub fn forget(&self, user_id: &str) {
        self.hits.remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_within_capacity() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow("u1"));
        assert!(limiter.allow("u1"));
        assert!(limiter.allow("u1"));
        assert!(!limiter.allow("u1"));
    }

    #[test]
    fn test_users_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("u1"));
        assert!(!limiter.allow("u1"));
        assert!(limiter.allow("u2"));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_millis(40));
        assert!(limiter.allow("u1"));
        assert!(limiter.allow("u1"));
        assert!(!limiter.allow("u1"));

        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.allow("u1"));
    }

    #[test]
    fn test_forget_resets_user() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("u1"));
        limiter.forget("u1");
        assert!(limiter.allow("u1"));
    }
}
