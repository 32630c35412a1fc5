//! Per-connection admission control with optional queued delivery.
//!
//! [`RateLimiter`] decides whether a frame is admitted in the current fixed
//! window. When throttling is enabled, rejected frames go to
//! [`ThrottleQueues`] and are released one per `1000 / max` ms instead of being
//! answered with an `error` event.

mod config;
mod limiter;
mod throttle;

pub use config::{RateLimitConfig, RATE_WINDOW};
pub use limiter::RateLimiter;
pub use throttle::ThrottleQueues;
