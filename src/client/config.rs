use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::error::ClientError;

/// Maps a reconnection attempt number (starting at 1) to the delay before it
pub type ReconnectStrategy = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

const DEFAULT_OUTBOUND_BUFFER: usize = 64;
const BACKOFF_STEP: Duration = Duration::from_millis(1000);
const BACKOFF_CAP: Duration = Duration::from_millis(10_000);

/// `min(attempt × 1s, 10s)`
pub fn default_backoff(attempt: u32) -> Duration {
    BACKOFF_STEP.saturating_mul(attempt).min(BACKOFF_CAP)
}

#[derive(Clone)]
pub struct ClientConfig {
    /// `ws://` or `wss://` endpoint
    pub url: String,
    /// Connect as soon as the client is built
    pub auto_connect: bool,
    /// Durable identity presented with the `reconnect` handshake
    pub id: Option<String>,
    /// Overrides [`default_backoff`]
    pub reconnect_strategy: Option<ReconnectStrategy>,
    /// Automatic attempts allowed in one streak before giving up
    pub max_attempts: Option<u32>,
    /// Time after the last successful open at which the attempt streak resets
    pub cooldown: Option<Duration>,
    /// Capacity of the channel feeding the transport writer
    pub outbound_buffer: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_connect: true,
            id: None,
            reconnect_strategy: None,
            max_attempts: None,
            cooldown: None,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }

    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_reconnect_strategy<F>(mut self, strategy: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.reconnect_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Delay before reconnection attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        match &self.reconnect_strategy {
            Some(strategy) => strategy(attempt),
            None => default_backoff(attempt),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.url.is_empty() {
            return Err(ClientError::InvalidConfig("url must not be empty".into()));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ClientError::InvalidConfig(format!(
                "url must use ws:// or wss://, got {}",
                self.url
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(ClientError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.outbound_buffer == 0 {
            return Err(ClientError::InvalidConfig(
                "outbound_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("auto_connect", &self.auto_connect)
            .field("id", &self.id)
            .field("custom_strategy", &self.reconnect_strategy.is_some())
            .field("max_attempts", &self.max_attempts)
            .field("cooldown", &self.cooldown)
            .field("outbound_buffer", &self.outbound_buffer)
            .finish()
    }
}
