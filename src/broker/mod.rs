//! The broker orchestrator.
//!
//! [`Broker`] owns one of each per-connection component and wires transport
//! accept and close events to them. It is cheap to clone; clones share state.

mod hooks;

pub use hooks::{BrokerHooks, NoopHooks, TracingHooks};

use futures::future::BoxFuture;
use rand::{distr::Alphanumeric, Rng};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::BrokerConfig;
use crate::connection_manager::{
    ConnectionHandle, ConnectionId, ConnectionManager, ConnectionRegistry, ConnectionStats,
    Metadata, OutboundMessage,
};
use crate::dispatcher::{EventContext, EventDispatcher, EventHandler, HandlerResult};
use crate::error::BrokerError;
use crate::metrics::{
    BroadcastMetrics, FrameMetrics, CONNECTIONS_ACTIVE, WS_CONNECTIONS_CLOSED,
    WS_CONNECTIONS_OPENED,
};
use crate::ratelimit::{RateLimiter, ThrottleQueues};
use crate::rooms::RoomDirectory;
use crate::session::{self, SessionStore};
use crate::tags::TagIndex;
use crate::websocket::{events, format, format_payload, ErrorPayload, WelcomePayload};

const GENERATED_ID_LEN: usize = 8;

type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// What happened to an inbound frame at admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Admitted and handed to the dispatcher
    Dispatched,
    /// Deferred to the connection's throttle queue
    Queued,
    /// Refused; the sender was told with an `error` event
    Rejected,
}

#[derive(Clone)]
pub struct Broker {
    config: Arc<BrokerConfig>,
    connections: Arc<ConnectionManager>,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomDirectory>,
    tags: Arc<TagIndex>,
    rate_limiter: Arc<RateLimiter>,
    throttle: Arc<ThrottleQueues>,
    dispatcher: Arc<EventDispatcher>,
    sessions: Arc<SessionStore>,
    hooks: Arc<dyn BrokerHooks>,
    id_generator: IdGenerator,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_hooks(config, Arc::new(NoopHooks))
    }

    pub fn with_hooks(config: BrokerConfig, hooks: Arc<dyn BrokerHooks>) -> Self {
        let broker = Self {
            connections: Arc::new(ConnectionManager::new()),
            registry: Arc::new(ConnectionRegistry::new()),
            rooms: Arc::new(RoomDirectory::new(hooks.clone())),
            tags: Arc::new(TagIndex::new()),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            throttle: Arc::new(ThrottleQueues::new(config.rate_limit.drain_interval())),
            dispatcher: Arc::new(EventDispatcher::new()),
            sessions: Arc::new(SessionStore::new()),
            config: Arc::new(config),
            hooks,
            id_generator: Arc::new(random_id),
        };

        session::register_continuity_handlers(&broker);
        broker.on(events::LOGOUT, on_logout);
        broker
    }

    /// Replace the generator behind [`Broker::generate_id`]
    pub fn with_id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Arc::new(generator);
        self
    }

    pub fn start(&self) {
        tracing::info!(
            rate_limit = ?self.config.rate_limit.max_per_second,
            throttle = self.config.rate_limit.throttle_enabled(),
            "Starting broker"
        );
        self.hooks.on_start();
    }

    /// Ask every open transport to close and forget all recorded sessions.
    ///
    /// Per-connection state is torn down by the transports' normal close path.
    pub async fn stop(&self) {
        for handle in self.connections.get_all() {
            handle.close().await;
        }
        self.sessions.clear();
        self.hooks.on_stop();
    }

    /// Register a new transport, greet it and fire `on_connect`.
    pub async fn accept(&self, sender: mpsc::Sender<OutboundMessage>) -> Arc<ConnectionHandle> {
        let handle = self.connections.register(sender);
        self.registry
            .store(handle.id, std::iter::empty::<(String, Value)>());

        WS_CONNECTIONS_OPENED.inc();
        CONNECTIONS_ACTIVE.set(self.connections.len() as i64);

        let welcome = WelcomePayload {
            message: self.config.welcome_message.clone(),
        };
        if let Err(e) = self
            .signal_payload(handle.id, events::WELCOME, &welcome)
            .await
        {
            tracing::warn!(connection_id = %handle.id, error = %e, "Failed to encode welcome");
        }

        self.hooks.on_connect(&handle);

        let ctx = EventContext::new(self.clone(), handle.clone());
        if let Err(e) = self.dispatcher.handle_connect(ctx).await {
            self.report_handler_error(handle.id, e);
        }
        handle
    }

    /// Run one inbound frame through admission control and, if admitted, the dispatcher.
    pub async fn handle_inbound(
        &self,
        connection_id: ConnectionId,
        raw: String,
    ) -> Result<InboundOutcome, BrokerError> {
        let handle = self
            .connections
            .get(connection_id)
            .ok_or(BrokerError::NotConnected(connection_id))?;

        let admitted = self.rate_limiter.passes(connection_id);

        // Older queued frames go first, even when this one would pass.
        if self.config.rate_limit.throttle_enabled()
            && (!admitted || self.throttle.is_draining(connection_id))
        {
            FrameMetrics::record_throttled();
            if self.config.debug {
                tracing::debug!(
                    connection_id = %connection_id,
                    pending = self.throttle.pending(connection_id) + 1,
                    "[RateLimit] frame queued"
                );
            }
            let broker = self.clone();
            let drain_handle = handle.clone();
            self.throttle
                .enqueue(&handle, raw, move |raw: String| -> BoxFuture<'static, ()> {
                    let broker = broker.clone();
                    let handle = drain_handle.clone();
                    Box::pin(async move { broker.dispatch(&handle, &raw).await })
                });
            return Ok(InboundOutcome::Queued);
        }

        if !admitted {
            FrameMetrics::record_rejected();
            tracing::debug!(connection_id = %connection_id, "[RateLimit] frame rejected");
            let payload = ErrorPayload::new(BrokerError::RateLimitExceeded.to_string());
            self.signal_payload(connection_id, events::ERROR, &payload)
                .await?;
            return Ok(InboundOutcome::Rejected);
        }

        FrameMetrics::record_admitted();
        self.dispatch(&handle, &raw).await;
        Ok(InboundOutcome::Dispatched)
    }

    /// Route a frame that has already cleared admission.
    async fn dispatch(&self, handle: &Arc<ConnectionHandle>, raw: &str) {
        if self.config.debug {
            tracing::debug!(connection_id = %handle.id, frame = %raw, "[Message]");
        }

        let ctx = EventContext::new(self.clone(), handle.clone());
        if let Err(e) = self.dispatcher.handle(raw, ctx).await {
            self.report_handler_error(handle.id, e);
        }
    }

    fn report_handler_error(&self, connection_id: ConnectionId, error: BrokerError) {
        match error {
            BrokerError::Protocol(reason) => {
                FrameMetrics::record_protocol_error();
                tracing::warn!(connection_id = %connection_id, reason = %reason, "Dropping malformed frame");
            }
            BrokerError::Unroutable(event) => {
                FrameMetrics::record_unrouted();
                tracing::warn!(connection_id = %connection_id, event = %event, "No handler for event");
            }
            e @ BrokerError::Transport(_) => {
                self.hooks.on_transport_error(connection_id, &e);
            }
            e => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Handler failed");
            }
        }
    }

    /// Tear down every piece of per-connection state. Idempotent.
    ///
    /// The session snapshot is captured first since it reads rooms and tags.
    /// Returns false if the connection was already gone.
    pub fn disconnect(&self, connection_id: ConnectionId) -> bool {
        if self.connections.unregister(connection_id).is_none() {
            return false;
        }

        session::capture_on_disconnect(self, connection_id);

        let rooms = self.rooms.leave_all(connection_id);
        self.registry.cleanup(connection_id);
        self.rate_limiter.cleanup(connection_id);
        self.throttle.cleanup(connection_id);
        self.tags.cleanup(connection_id);

        WS_CONNECTIONS_CLOSED.inc();
        CONNECTIONS_ACTIVE.set(self.connections.len() as i64);

        if self.config.debug {
            tracing::debug!(connection_id = %connection_id, rooms = ?rooms, "[Disconnect]");
        }
        self.hooks.on_close(connection_id);
        true
    }

    /// Register the handler for `event`, replacing any earlier one.
    pub fn on<H: EventHandler>(&self, event: impl Into<String>, handler: H) -> bool {
        self.dispatcher.on(event, handler)
    }

    /// Register the handler run for every accepted connection, after the welcome.
    pub fn on_connect<H: EventHandler>(&self, handler: H) -> bool {
        self.dispatcher.on_connect(handler)
    }

    /// Send one envelope to one connection.
    ///
    /// Returns false when the connection is unknown or its transport is not open.
    pub async fn signal(&self, connection_id: ConnectionId, event: &str, data: Value) -> bool {
        self.send_frame(connection_id, format(event, data)).await
    }

    pub async fn signal_payload<T: Serialize>(
        &self,
        connection_id: ConnectionId,
        event: &str,
        payload: &T,
    ) -> Result<bool, BrokerError> {
        let frame = format_payload(event, payload)?;
        Ok(self.send_frame(connection_id, frame).await)
    }

    async fn send_frame(&self, connection_id: ConnectionId, frame: Arc<str>) -> bool {
        let Some(handle) = self.connections.get(connection_id) else {
            return false;
        };
        if !handle.is_open() {
            return false;
        }

        match handle.send_frame(frame).await {
            Ok(()) => true,
            Err(e) => {
                self.hooks.on_transport_error(connection_id, &e);
                false
            }
        }
    }

    /// Broadcast to every open member of `room`. Returns the number reached.
    pub async fn broadcast_to(&self, room: &str, event: &str, data: Value) -> usize {
        let delivered = self
            .rooms
            .broadcast(&self.connections, room, format(event, data))
            .await;
        BroadcastMetrics::record_room(delivered);
        delivered
    }

    /// Broadcast to every open connection tagged `tag`. Returns the number reached.
    pub async fn broadcast_to_tag(&self, tag: &str, event: &str, data: Value) -> usize {
        let frame = format(event, data);
        let mut delivered = 0;

        for handle in self.connections.resolve(self.tags.find(tag)) {
            if !handle.is_open() {
                continue;
            }
            match handle.send_frame(frame.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => self.hooks.on_transport_error(handle.id, &e),
            }
        }

        BroadcastMetrics::record_tag(delivered);
        delivered
    }

    /// Join a live connection to a room. False for unknown connections.
    pub fn join_room(&self, connection_id: ConnectionId, room: &str) -> bool {
        if !self.is_connected(connection_id) {
            return false;
        }
        let joined = self.rooms.join(connection_id, room);

        // Lost a race with disconnect; don't leave an orphaned membership behind.
        if !self.is_connected(connection_id) {
            self.rooms.leave(connection_id, room);
            return false;
        }
        joined
    }

    pub fn leave_room(&self, connection_id: ConnectionId, room: &str) -> bool {
        self.rooms.leave(connection_id, room)
    }

    /// Leave every room the connection is in, returning their names
    pub fn leave_all_rooms(&self, connection_id: ConnectionId) -> Vec<String> {
        self.rooms.leave_all(connection_id)
    }

    pub fn add_tags<I, S>(&self, connection_id: ConnectionId, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.is_connected(connection_id) {
            return false;
        }
        self.tags.add(connection_id, tags);

        if !self.is_connected(connection_id) {
            self.tags.cleanup(connection_id);
            return false;
        }
        true
    }

    pub fn find_tagged(&self, tag: &str) -> Vec<ConnectionId> {
        self.tags.find(tag)
    }

    /// Shallow-merge fields into a live connection's metadata
    pub fn store<I>(&self, connection_id: ConnectionId, partial: I) -> bool
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if !self.is_connected(connection_id) {
            return false;
        }
        self.registry.store(connection_id, partial);

        if !self.is_connected(connection_id) {
            self.registry.cleanup(connection_id);
            return false;
        }
        true
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<Metadata> {
        self.registry.get(connection_id)
    }

    pub fn generate_id(&self) -> String {
        (self.id_generator)()
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections.get(connection_id).is_some()
    }

    pub fn stats(&self) -> ConnectionStats {
        let rooms: HashMap<String, usize> = self
            .rooms
            .list_room_info()
            .into_iter()
            .map(|info| (info.name, info.member_count))
            .collect();

        ConnectionStats {
            total_connections: self.connections.len(),
            rooms,
            tracked_sessions: self.sessions.len(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn throttle(&self) -> &ThrottleQueues {
        &self.throttle
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

fn random_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

async fn on_logout(_data: Value, ctx: EventContext) -> HandlerResult {
    let left = ctx.broker.leave_all_rooms(ctx.connection_id());
    tracing::debug!(connection_id = %ctx.connection_id(), rooms = left.len(), "Logged out");
    Ok(())
}
