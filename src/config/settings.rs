use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::ratelimit::RateLimitConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Broker behaviour shared by every connection.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Per-connection admission control. Disabled unless `max_per_second` is set.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Verbose per-frame logging
    #[serde(default)]
    pub debug: bool,
    /// Text carried by the `welcome` event sent on accept
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_welcome_message() -> String {
    "Welcome to roomwire!".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("broker.debug", false)?
            .set_default("broker.rate_limit.throttle", false)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // ROOMWIRE__SERVER__PORT, ROOMWIRE__BROKER__RATE_LIMIT__MAX_PER_SECOND, ...
            .add_source(
                Environment::with_prefix("ROOMWIRE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject combinations that cannot be enforced.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.rate_limit.validate().map_err(ConfigError::Message)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            debug: false,
            welcome_message: default_welcome_message(),
        }
    }
}

impl BrokerConfig {
    /// Default `tracing` directive for this configuration.
    pub fn log_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}
