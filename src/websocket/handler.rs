use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broker::Broker;
use crate::connection_manager::{ConnectionHandle, ConnectionId, OutboundMessage};
use crate::metrics::WS_CONNECTION_DURATION;
use crate::server::AppState;

const CHANNEL_BUFFER_SIZE: usize = 32;

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broker))
}

/// Drive an established WebSocket until either side goes away
async fn handle_socket(socket: WebSocket, broker: Broker) {
    let connection_start = std::time::Instant::now();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(CHANNEL_BUFFER_SIZE);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer first, so the welcome frame queued by accept has somewhere to go
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                OutboundMessage::Frame(frame) => {
                    if ws_sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                OutboundMessage::Close => {
                    let _ = ws_sender.close().await;
                    break;
                }
            }
        }
    });

    let handle = broker.accept(tx).await;
    let connection_id = handle.id;

    let recv_broker = broker.clone();
    let recv_handle = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &recv_broker, &recv_handle).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %recv_handle.id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    join_first(connection_id, send_task, recv_task).await;

    broker.disconnect(connection_id);

    let duration = connection_start.elapsed().as_secs_f64();
    WS_CONNECTION_DURATION.observe(duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Wait for either pump to finish, then abort the other one.
async fn join_first(
    connection_id: ConnectionId,
    mut send_task: JoinHandle<()>,
    mut recv_task: JoinHandle<()>,
) {
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, broker: &Broker, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            if let Err(e) = broker.handle_inbound(handle.id, text.to_string()).await {
                tracing::debug!(connection_id = %handle.id, error = %e, "Inbound frame not handled");
                return broker.is_connected(handle.id);
            }
            true
        }
        Message::Binary(_) => {
            tracing::debug!(connection_id = %handle.id, "Ignoring binary frame");
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    /// A task that never finishes on its own and reports when it is dropped
    fn parked_task() -> (JoinHandle<()>, oneshot::Receiver<()>) {
        let (guard, dropped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        (task, dropped)
    }

    #[tokio::test]
    async fn test_finished_writer_aborts_reader() {
        let (reader, reader_dropped) = parked_task();
        let writer = tokio::spawn(async {});

        join_first(ConnectionId::new(), writer, reader).await;
        assert!(reader_dropped.await.is_err());
    }

    #[tokio::test]
    async fn test_finished_reader_aborts_writer() {
        let (writer, writer_dropped) = parked_task();
        let reader = tokio::spawn(async {});

        join_first(ConnectionId::new(), writer, reader).await;
        assert!(writer_dropped.await.is_err());
    }
}
