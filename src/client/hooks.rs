use super::error::ClientError;

/// Client lifecycle callbacks. Every method defaults to a no-op.
///
/// Called from the driver task; keep them short.
pub trait ClientHooks: Send + Sync {
    fn on_open(&self) {}

    fn on_close(&self) {}

    fn on_error(&self, _error: &ClientError) {}

    fn on_reconnect_attempt(&self, _attempt: u32) {}

    fn on_reconnect_failed(&self, _error: &ClientError) {}

    /// Fired after `on_open` when the open ends a reconnection streak
    fn on_reconnected(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopClientHooks;

impl ClientHooks for NoopClientHooks {}
