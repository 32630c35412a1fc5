//! Connection records and their advisory metadata.

mod metadata;
mod registry;
mod stats;
mod types;

pub use metadata::{ConnectionRegistry, Metadata, DURABLE_ID_KEY};
pub use registry::ConnectionManager;
pub use stats::{ConnectionStats, RoomInfo};
pub use types::{ConnectionHandle, ConnectionId, OutboundMessage};
