//! Fixed-window admission control, one window per connection.

use dashmap::DashMap;
use tokio::time::Instant;

use super::config::{RateLimitConfig, RATE_WINDOW};
use crate::connection_manager::ConnectionId;

#[derive(Debug, Clone, Copy)]
struct RateState {
    count: u32,
    window_start: Instant,
}

/// Per-connection fixed-window rate limiter.
///
/// The window restarts on the first frame that arrives more than
/// [`RATE_WINDOW`] after the current window began. Because the window is fixed
/// rather than sliding, a client that bursts just before and just after a
/// boundary can get up to twice the configured maximum through in a short
/// span. That is accepted behavior.
pub struct RateLimiter {
    config: RateLimitConfig,
    states: DashMap<ConnectionId, RateState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one frame against the connection's window and report whether it is admitted.
    pub fn passes(&self, connection_id: ConnectionId) -> bool {
        let Some(max) = self.config.max_per_second else {
            return true;
        };

        let now = Instant::now();
        let mut state = self.states.entry(connection_id).or_insert(RateState {
            count: 0,
            window_start: now,
        });

        if now.duration_since(state.window_start) > RATE_WINDOW {
            state.count = 1;
            state.window_start = now;
        } else {
            state.count = state.count.saturating_add(1);
        }

        state.count <= max
    }

    /// Frames counted in the connection's current window
    pub fn count(&self, connection_id: ConnectionId) -> Option<u32> {
        self.states.get(&connection_id).map(|s| s.count)
    }

    pub fn cleanup(&self, connection_id: ConnectionId) {
        self.states.remove(&connection_id);
    }

    pub fn tracked(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unlimited_always_passes() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let conn = ConnectionId::new();
        for _ in 0..1000 {
            assert!(limiter.passes(conn));
        }
        assert_eq!(limiter.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_bound_and_reset() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, false));
        let conn = ConnectionId::new();

        for _ in 0..3 {
            assert!(limiter.passes(conn));
        }
        assert!(!limiter.passes(conn));

        tokio::time::advance(Duration::from_millis(1001)).await;

        assert!(limiter.passes(conn));
        assert_eq!(limiter.count(conn), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_window_boundary_does_not_reset() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, false));
        let conn = ConnectionId::new();

        assert!(limiter.passes(conn));
        tokio::time::advance(RATE_WINDOW).await;
        assert!(!limiter.passes(conn));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cross_boundary_burst_is_allowed() {
        let limiter = RateLimiter::new(RateLimitConfig::new(5, false));
        let conn = ConnectionId::new();

        assert!(limiter.passes(conn));
        tokio::time::advance(Duration::from_millis(990)).await;
        for _ in 0..4 {
            assert!(limiter.passes(conn));
        }
        tokio::time::advance(Duration::from_millis(20)).await;
        for _ in 0..5 {
            assert!(limiter.passes(conn));
        }
    }

    #[test]
    fn test_windows_are_per_connection() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, false));
        let (a, b) = (ConnectionId::new(), ConnectionId::new());

        assert!(limiter.passes(a));
        assert!(!limiter.passes(a));
        assert!(limiter.passes(b));

        limiter.cleanup(a);
        assert!(limiter.count(a).is_none());
        assert!(limiter.passes(a));
    }
}
