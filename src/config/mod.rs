mod settings;

pub use crate::client::ClientConfig;
pub use crate::ratelimit::RateLimitConfig;
pub use settings::{BrokerConfig, ServerConfig, Settings};
