//! Session continuity across transient disconnects.
//!
//! A client presents a durable identity (an untrusted string of its own
//! choosing). The [`SessionStore`] keeps the last known rooms and tags for each
//! identity so a reconnecting client can be put back where it was.
//! State lives in memory only and is cleared when the broker stops.

mod continuity;
mod store;

pub use continuity::{capture_on_disconnect, register_continuity_handlers, restore};
pub use store::{SessionSnapshot, SessionStore};
