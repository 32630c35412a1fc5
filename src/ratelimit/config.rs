//! Rate limiting configuration

use serde::Deserialize;
use std::time::Duration;

/// Length of the fixed admission window
pub const RATE_WINDOW: Duration = Duration::from_millis(1000);

/// Configuration for per-connection rate limiting
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum inbound frames per window. `None` disables rate limiting.
    #[serde(default)]
    pub max_per_second: Option<u32>,
    /// Queue and delay rejected frames instead of answering with an `error` event
    #[serde(default)]
    pub throttle: bool,
}

impl RateLimitConfig {
    pub fn new(max_per_second: u32, throttle: bool) -> Self {
        Self {
            max_per_second: Some(max_per_second),
            throttle,
        }
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.max_per_second.is_some()
    }

    pub fn throttle_enabled(&self) -> bool {
        self.is_enabled() && self.throttle
    }

    /// Spacing between frames released from a throttle queue: `1000 / max` ms.
    pub fn drain_interval(&self) -> Duration {
        let max = u64::from(self.max_per_second.unwrap_or(1).max(1));
        Duration::from_micros(1_000_000 / max)
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.max_per_second {
            Some(0) => Err("rate_limit.max_per_second must be at least 1".to_string()),
            _ => Ok(()),
        }
    }
}
