//! Deferred FIFO delivery for frames that failed admission.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::connection_manager::{ConnectionHandle, ConnectionId};

#[derive(Default)]
struct ThrottleQueue {
    backlog: VecDeque<String>,
    /// Present while a drain loop runs. Dropping it wakes the loop so it exits.
    cancel: Option<oneshot::Sender<()>>,
}

/// Per-connection throttle queues with at most one drain loop each.
pub struct ThrottleQueues {
    queues: Arc<DashMap<ConnectionId, ThrottleQueue>>,
    interval: Duration,
}

impl ThrottleQueues {
    pub fn new(interval: Duration) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            interval,
        }
    }

    /// Append a raw frame to the connection's queue, starting a drain loop if none is running.
    ///
    /// The loop hands frames to `deliver` oldest first, one per interval, and
    /// only while the transport is open. Returns true if a loop was started.
    pub fn enqueue<F>(&self, handle: &Arc<ConnectionHandle>, raw: String, deliver: F) -> bool
    where
        F: Fn(String) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let mut queue = self.queues.entry(handle.id).or_default();
        queue.backlog.push_back(raw);

        if queue.cancel.is_some() {
            return false;
        }

        // Spawned while the entry is locked, so the loop cannot observe the
        // queue before the cancel handle is in place.
        let (cancel_tx, cancel_rx) = oneshot::channel();
        queue.cancel = Some(cancel_tx);
        tokio::spawn(drain(
            self.queues.clone(),
            handle.clone(),
            self.interval,
            cancel_rx,
            deliver,
        ));

        tracing::debug!(connection_id = %handle.id, "Throttle drain started");
        true
    }

    pub fn is_draining(&self, connection_id: ConnectionId) -> bool {
        self.queues
            .get(&connection_id)
            .map(|q| q.cancel.is_some())
            .unwrap_or(false)
    }

    /// Frames still waiting in the connection's queue
    pub fn pending(&self, connection_id: ConnectionId) -> usize {
        self.queues
            .get(&connection_id)
            .map(|q| q.backlog.len())
            .unwrap_or(0)
    }

    /// Drop the connection's queue. A running drain loop stops on its next tick.
    pub fn cleanup(&self, connection_id: ConnectionId) {
        if let Some((_, queue)) = self.queues.remove(&connection_id) {
            if !queue.backlog.is_empty() {
                tracing::debug!(
                    connection_id = %connection_id,
                    dropped = queue.backlog.len(),
                    "Discarding throttled frames"
                );
            }
        }
    }
}

async fn drain<F>(
    queues: Arc<DashMap<ConnectionId, ThrottleQueue>>,
    handle: Arc<ConnectionHandle>,
    interval: Duration,
    mut cancel: oneshot::Receiver<()>,
    deliver: F,
) where
    F: Fn(String) -> BoxFuture<'static, ()> + Send + Sync + 'static,
{
    let connection_id = handle.id;

    loop {
        let next = match queues.get_mut(&connection_id) {
            // Torn down
            None => break,
            Some(mut queue) => {
                let popped = queue.backlog.pop_front();
                match popped {
                    Some(raw) => raw,
                    None => {
                        queue.cancel = None;
                        drop(queue);
                        queues.remove_if(&connection_id, |_, q| {
                            q.backlog.is_empty() && q.cancel.is_none()
                        });
                        break;
                    }
                }
            }
        };

        if handle.is_open() {
            deliver(next).await;
        } else {
            tracing::debug!(connection_id = %connection_id, "Dropping throttled frame for closed transport");
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut cancel => break,
        }
    }

    tracing::debug!(connection_id = %connection_id, "Throttle drain stopped");
}
