//! Sliding-window limit on renamer calls.
//!
//! A burst of downloads must not turn into a burst of paid API requests. Calls over
//! the limit are refused and the naming chain falls through to the local tiers.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Sliding window limiter keyed by provider
pub struct RenameRateLimiter {
    /// provider -> timestamps of recent calls
    calls: DashMap<String, Vec<Instant>>,
    max_calls: usize,
    window: Duration,
}

impl RenameRateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            calls: DashMap::new(),
            max_calls,
            window,
        }
    }

    /// Record a call if the provider is under its limit
    pub fn try_acquire(&self, provider: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.calls.entry(provider.to_string()).or_default();
        let timestamps = entry.value_mut();

        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_calls {
            tracing::warn!(
                provider,
                calls = timestamps.len(),
                max = self.max_calls,
                "Rename rate limit reached"
            );
            return false;
        }

        timestamps.push(now);
        true
    }
}

impl Default for RenameRateLimiter {
    fn default() -> Self {
        // 20 renames per minute
        Self::new(20, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_blocks_over_limit() {
        let limiter = RenameRateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire("anthropic"));
        assert!(limiter.try_acquire("anthropic"));
        assert!(!limiter.try_acquire("anthropic"));
        // Providers are tracked separately
        assert!(limiter.try_acquire("other"));
    }

    #[test]
    fn test_window_expiry() {
        let limiter = RenameRateLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.try_acquire("anthropic"));
        assert!(!limiter.try_acquire("anthropic"));

        sleep(Duration::from_millis(80));

        assert!(limiter.try_acquire("anthropic"));
    }
}
