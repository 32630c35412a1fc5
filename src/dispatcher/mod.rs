//! Routes decoded envelopes to one handler per event name.

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::broker::Broker;
use crate::connection_manager::{ConnectionHandle, ConnectionId};
use crate::error::BrokerError;
use crate::websocket::Envelope;

pub type HandlerResult = Result<(), BrokerError>;

/// What a handler gets alongside the payload: the broker and the sender's connection.
#[derive(Clone)]
pub struct EventContext {
    pub broker: Broker,
    pub connection: Arc<ConnectionHandle>,
}

impl EventContext {
    pub fn new(broker: Broker, connection: Arc<ConnectionHandle>) -> Self {
        Self { broker, connection }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id
    }

    /// Decode the payload into a typed structure
    pub fn decode<T: DeserializeOwned>(&self, data: Value) -> Result<T, BrokerError> {
        Envelope::decode(data)
    }

    /// Send an event back to the sender
    pub async fn reply(&self, event: &str, data: Value) -> bool {
        self.broker.signal(self.connection.id, event, data).await
    }
}

/// Handler invoked with an event's payload.
///
/// Implemented for any `Fn(Value, EventContext) -> impl Future<Output = HandlerResult>`.
pub trait EventHandler: Send + Sync + 'static {
    fn call(&self, data: Value, ctx: EventContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(Value, EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, data: Value, ctx: EventContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(data, ctx))
    }
}

pub struct EventDispatcher {
    handlers: DashMap<String, Arc<dyn EventHandler>>,
    /// Runs once per accepted connection, outside the event namespace
    connect: RwLock<Option<Arc<dyn EventHandler>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            connect: RwLock::new(None),
        }
    }

    /// Register the handler for `event`, replacing any earlier one.
    ///
    /// Returns true if a handler was replaced.
    pub fn on<H: EventHandler>(&self, event: impl Into<String>, handler: H) -> bool {
        self.handlers
            .insert(event.into(), Arc::new(handler))
            .is_some()
    }

    /// Register the connect handler, replacing any earlier one.
    ///
    /// It is called with a `null` payload. Clients cannot trigger it by event name.
    pub fn on_connect<H: EventHandler>(&self, handler: H) -> bool {
        let mut slot = self.connect.write().unwrap_or_else(|e| e.into_inner());
        slot.replace(Arc::new(handler)).is_some()
    }

    pub async fn handle_connect(&self, ctx: EventContext) -> HandlerResult {
        let handler = self
            .connect
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        match handler {
            Some(handler) => handler.call(Value::Null, ctx).await,
            None => Ok(()),
        }
    }

    /// Decode a raw frame and run its handler.
    ///
    /// Fails with `Protocol` for undecodable frames and `Unroutable` for
    /// events nobody handles. Neither closes the connection.
    pub async fn handle(&self, raw: &str, ctx: EventContext) -> HandlerResult {
        let envelope = Envelope::parse(raw)?;

        // Clone out of the map so no shard lock is held across the await.
        let handler = self
            .handlers
            .get(&envelope.event)
            .map(|h| h.value().clone())
            .ok_or_else(|| BrokerError::Unroutable(envelope.event.clone()))?;

        handler.call(envelope.data, ctx).await
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
