//! Transport establishment for the client.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::error::ClientError;

/// Something that happened on an established transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    /// Reported to the error callback; does not close the transport by itself
    Error(String),
    Closed,
}

/// Channels of an established transport.
///
/// Dropping `outbound` asks the transport to close.
pub struct Transport {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str, buffer: usize) -> Result<Transport, ClientError>;
}

/// WebSocket transport over `tokio-tungstenite`
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str, buffer: usize) -> Result<Transport, ClientError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(buffer);
        let (in_tx, in_rx) = mpsc::channel(buffer);

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(TransportEvent::Frame(text.to_string())).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
            let _ = in_tx.send(TransportEvent::Closed).await;
        });

        Ok(Transport {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
