//! Advisory key/value metadata attached to each connection.
//!
//! The broker itself only reads the durable identity (`id`) key; every other
//! field belongs to application handlers.

use dashmap::DashMap;
use serde_json::{Map, Value};

use super::types::ConnectionId;

pub type Metadata = Map<String, Value>;

/// Metadata key under which the durable identity is stored
pub const DURABLE_ID_KEY: &str = "id";

pub struct ConnectionRegistry {
    entries: DashMap<ConnectionId, Metadata>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Shallow-merge `partial` into the connection's metadata, creating the entry if absent.
    pub fn store<I>(&self, connection_id: ConnectionId, partial: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut entry = self.entries.entry(connection_id).or_default();
        for (key, value) in partial {
            entry.insert(key, value);
        }
    }

    /// Snapshot of the connection's metadata
    pub fn get(&self, connection_id: ConnectionId) -> Option<Metadata> {
        self.entries.get(&connection_id).map(|m| m.clone())
    }

    pub fn get_field(&self, connection_id: ConnectionId, key: &str) -> Option<Value> {
        self.entries
            .get(&connection_id)
            .and_then(|m| m.get(key).cloned())
    }

    /// Durable identity presented by the client, if any
    pub fn durable_id(&self, connection_id: ConnectionId) -> Option<String> {
        match self.get_field(connection_id, DURABLE_ID_KEY) {
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    pub fn cleanup(&self, connection_id: ConnectionId) {
        self.entries.remove(&connection_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
