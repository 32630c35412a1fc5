//! Connection handle and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::BrokerError;

/// Process-unique identity assigned when a transport is accepted.
///
/// Every per-connection map in the broker is keyed by this value rather than
/// by the transport itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Items queued for the transport writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// A serialized envelope, shared between every recipient of a broadcast
    Frame(Arc<str>),
    /// Ask the writer to close the transport
    Close,
}

impl OutboundMessage {
    pub fn as_frame(&self) -> Option<&str> {
        match self {
            Self::Frame(text) => Some(&**text),
            Self::Close => None,
        }
    }
}

/// The single record holding a connection's transport.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
    open: AtomicBool,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: ConnectionId::new(),
            connected_at: Utc::now(),
            sender,
            open: AtomicBool::new(true),
        }
    }

    /// True while the transport accepts frames.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Flag the transport as gone. Sends after this are skipped.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Send a pre-serialized frame
    pub async fn send_frame(&self, frame: Arc<str>) -> Result<(), BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::Transport(format!(
                "connection {} is not open",
                self.id
            )));
        }

        self.sender
            .send(OutboundMessage::Frame(frame))
            .await
            .map_err(|_| {
                self.mark_closed();
                BrokerError::Transport(format!("writer for connection {} has stopped", self.id))
            })
    }

    /// Ask the writer task to close the transport.
    pub async fn close(&self) {
        if self.is_open() {
            let _ = self.sender.send(OutboundMessage::Close).await;
        }
        self.mark_closed();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_frame_reaches_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(tx);

        handle.send_frame(Arc::from("hello")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().as_frame(), Some("hello"));
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_frames() {
        let (tx, _rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(tx);
        handle.mark_closed();

        assert!(!handle.is_open());
        assert!(matches!(
            handle.send_frame(Arc::from("x")).await,
            Err(BrokerError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver_means_not_open() {
        let (tx, rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(tx);
        drop(rx);
        assert!(!handle.is_open());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
