//! Lifecycle callbacks fired by the broker.

use crate::connection_manager::{ConnectionHandle, ConnectionId};
use crate::error::BrokerError;

/// Observer for connection and room lifecycle events.
///
/// Every method defaults to a no-op so implementors only override what they
/// need. Hooks are invoked after the broker's own maps are consistent and
/// never while an internal lock is held, so they may call back into the
/// broker.
pub trait BrokerHooks: Send + Sync {
    fn on_start(&self) {}

    fn on_stop(&self) {}

    fn on_connect(&self, _connection: &ConnectionHandle) {}

    /// Fired after all per-connection state has been removed
    fn on_close(&self, _connection_id: ConnectionId) {}

    /// Transport failures never close the connection on their own
    fn on_transport_error(&self, _connection_id: ConnectionId, _error: &BrokerError) {}

    fn on_room_created(&self, _room: &str) {}

    fn on_room_joined(&self, _room: &str, _connection_id: ConnectionId) {}

    fn on_room_left(&self, _room: &str, _connection_id: ConnectionId) {}

    fn on_room_destroyed(&self, _room: &str) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl BrokerHooks for NoopHooks {}

/// Hooks that report lifecycle events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl BrokerHooks for TracingHooks {
    fn on_start(&self) {
        tracing::info!("Broker started");
    }

    fn on_stop(&self) {
        tracing::info!("Broker stopped");
    }

    fn on_connect(&self, connection: &ConnectionHandle) {
        tracing::info!(connection_id = %connection.id, "Connected");
    }

    fn on_close(&self, connection_id: ConnectionId) {
        tracing::info!(connection_id = %connection_id, "Disconnected");
    }

    fn on_transport_error(&self, connection_id: ConnectionId, error: &BrokerError) {
        tracing::warn!(connection_id = %connection_id, error = %error, "Transport error");
    }

    fn on_room_created(&self, room: &str) {
        tracing::info!(room = %room, "Room created");
    }

    fn on_room_joined(&self, room: &str, connection_id: ConnectionId) {
        tracing::info!(room = %room, connection_id = %connection_id, "Joined room");
    }

    fn on_room_left(&self, room: &str, connection_id: ConnectionId) {
        tracing::info!(room = %room, connection_id = %connection_id, "Left room");
    }

    fn on_room_destroyed(&self, room: &str) {
        tracing::info!(room = %room, "Room destroyed");
    }
}
