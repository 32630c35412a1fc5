//! Built-in handlers that keep durable identities in step with live state.

use serde_json::Value;

use crate::broker::Broker;
use crate::connection_manager::{ConnectionId, DURABLE_ID_KEY};
use crate::dispatcher::{EventContext, HandlerResult};
use crate::metrics::SessionMetrics;
use crate::websocket::{
    events, ReconnectPayload, RoomPayload, SessionRestoredPayload, TagsPayload,
};

pub fn register_continuity_handlers(broker: &Broker) {
    broker.on(events::RECONNECT, on_reconnect);
    broker.on(events::JOIN_ROOM, on_join_room);
    broker.on(events::LEAVE_ROOM, on_leave_room);
    broker.on(events::SET_TAGS, on_set_tags);
}

/// Put a connection back into the rooms and tags last recorded for `id`.
///
/// An unknown identity restores nothing. The identity is stored in the
/// connection's metadata so the snapshot is refreshed at disconnect.
pub fn restore(broker: &Broker, connection_id: ConnectionId, id: &str) -> SessionRestoredPayload {
    broker.store(
        connection_id,
        [(DURABLE_ID_KEY.to_string(), Value::String(id.to_string()))],
    );

    let snapshot = broker.sessions().get(id).unwrap_or_default();
    for room in &snapshot.rooms {
        broker.join_room(connection_id, room);
    }
    broker.add_tags(connection_id, snapshot.tags.iter().cloned());

    tracing::info!(
        connection_id = %connection_id,
        durable_id = %id,
        rooms = snapshot.rooms.len(),
        tags = snapshot.tags.len(),
        "Session restored"
    );

    SessionRestoredPayload {
        id: id.to_string(),
        rooms: snapshot.rooms,
        tags: snapshot.tags,
    }
}

/// Record what the connection actually holds under its durable identity.
///
/// Must run before any per-connection state is torn down.
pub fn capture_on_disconnect(broker: &Broker, connection_id: ConnectionId) {
    let Some(id) = broker.registry().durable_id(connection_id) else {
        return;
    };

    let rooms = broker.rooms().rooms_of(connection_id);
    let tags = broker.tags().get_all(connection_id);
    tracing::debug!(
        connection_id = %connection_id,
        durable_id = %id,
        rooms = ?rooms,
        tags = ?tags,
        "Captured session snapshot"
    );
    broker.sessions().capture(&id, rooms, tags);
}

async fn on_reconnect(data: Value, ctx: EventContext) -> HandlerResult {
    let payload: ReconnectPayload = ctx.decode(data)?;
    if payload.id.is_empty() {
        return Ok(());
    }

    let restored = restore(&ctx.broker, ctx.connection_id(), &payload.id);
    SessionMetrics::record_restored();
    ctx.broker
        .signal_payload(ctx.connection_id(), events::SESSION_RESTORED, &restored)
        .await?;
    Ok(())
}

async fn on_join_room(data: Value, ctx: EventContext) -> HandlerResult {
    let payload: RoomPayload = ctx.decode(data)?;
    ctx.broker.join_room(ctx.connection_id(), &payload.room);
    if let Some(id) = payload.id.as_deref().filter(|id| !id.is_empty()) {
        ctx.broker.sessions().record_room(id, &payload.room);
    }
    Ok(())
}

async fn on_leave_room(data: Value, ctx: EventContext) -> HandlerResult {
    let payload: RoomPayload = ctx.decode(data)?;
    ctx.broker.leave_room(ctx.connection_id(), &payload.room);
    if let Some(id) = payload.id.as_deref().filter(|id| !id.is_empty()) {
        ctx.broker.sessions().forget_room(id, &payload.room);
    }
    Ok(())
}

async fn on_set_tags(data: Value, ctx: EventContext) -> HandlerResult {
    let payload: TagsPayload = ctx.decode(data)?;
    ctx.broker
        .add_tags(ctx.connection_id(), payload.tags.iter().cloned());
    if let Some(id) = payload.id.as_deref().filter(|id| !id.is_empty()) {
        ctx.broker.sessions().record_tags(id, &payload.tags);
    }
    Ok(())
}
