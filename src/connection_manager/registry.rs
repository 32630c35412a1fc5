use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::types::{ConnectionHandle, ConnectionId, OutboundMessage};

/// Owns the connection records of every live transport.
pub struct ConnectionManager {
    /// connection_id -> ConnectionHandle
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection around the writer side of its transport
    pub fn register(&self, sender: mpsc::Sender<OutboundMessage>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(sender));
        self.connections.insert(handle.id, handle.clone());

        tracing::debug!(connection_id = %handle.id, "Connection registered");

        handle
    }

    /// Unregister a connection, returning its record if it was present
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let removed = self.connections.remove(&connection_id).map(|(_, handle)| handle);
        if let Some(handle) = &removed {
            handle.mark_closed();
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
        removed
    }

    /// Get connection by ID
    pub fn get(&self, connection_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// Resolve a set of IDs to the records that still exist
    pub fn resolve<I>(&self, ids: I) -> Vec<Arc<ConnectionHandle>>
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Get all connections
    pub fn get_all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
