use std::time::{Duration, Instant};

use dashmap::DashMap;

const MAX_FAILURES: u32 = 5;
const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Per-username brute force limiter for token issuance.
pub struct LoginRateLimiter {
    /// username -> (failed_count, window_start)
    entries: DashMap<String, (u32, Instant)>,
    window: Duration,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::with_window(WINDOW)
    }

    fn with_window(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    /// Check if a login attempt is allowed. 5 failures per 15 minutes.
    /// Does NOT increment the counter; call `record_failure()` on bad credentials.
    pub fn check(&self, username: &str) -> Result<(), u64> {
        let now = Instant::now();

        let Some(entry) = self.entries.get(&username.to_lowercase()) else {
            return Ok(());
        };

        let (count, start) = entry.value();

        if now.duration_since(*start) > self.window {
            return Ok(());
        }

        if *count >= MAX_FAILURES {
            let elapsed = now.duration_since(*start).as_secs();
            return Err(self.window.as_secs().saturating_sub(elapsed));
        }

        Ok(())
    }

    /// Record a failed login attempt for the given username.
    /// Entries whose window has lapsed are dropped first.
    pub fn record_failure(&self, username: &str) {
        let now = Instant::now();
        self.prune(now);

        let mut entry = self
            .entries
            .entry(username.to_lowercase())
            .or_insert((0, now));
        let (count, start) = entry.value_mut();

        if now.duration_since(*start) > self.window {
            *count = 1;
            *start = now;
        } else {
            *count += 1;
        }
    }

    /// Forget failures after a successful login and drop stale entries.
    pub fn reset(&self, username: &str) {
        self.entries.remove(&username.to_lowercase());
        self.prune(Instant::now());
    }

    fn prune(&self, now: Instant) {
        self.entries
            .retain(|_, (_, start)| now.duration_since(*start) < self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_five_failures() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("alice").is_ok());
            limiter.record_failure("alice");
        }
        assert!(limiter.check("alice").is_err());
        assert!(limiter.check("ALICE").is_err());
        assert!(limiter.check("bob").is_ok());
    }

    #[test]
    fn reset_clears_failures() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            limiter.record_failure("alice");
        }
        limiter.reset("alice");
        assert!(limiter.check("alice").is_ok());
    }

    #[test]
    fn failures_prune_lapsed_entries() {
        let limiter = LoginRateLimiter::with_window(Duration::from_millis(20));
        for i in 0..50 {
            limiter.record_failure(&format!("user{i}"));
        }
        assert_eq!(limiter.entries.len(), 50);

        std::thread::sleep(Duration::from_millis(40));
        limiter.record_failure("someone-else");
        assert_eq!(limiter.entries.len(), 1);
        assert!(limiter.check("someone-else").is_ok());
    }
}
