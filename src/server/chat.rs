//! Demo chat application served by the `roomwire` binary.
//!
//! Each connection is given a generated `userId` as soon as it is accepted
//! and told about it with a `connected` event. Clients keep that id and send
//! it back in `reconnect`. Chat goes to the last room the connection joined.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::broker::Broker;
use crate::dispatcher::{EventContext, HandlerResult};

const USER_ID_KEY: &str = "userId";
const ROOM_KEY: &str = "room";

#[derive(Debug, Deserialize)]
struct RoomRequest {
    room: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct TestRequest {
    #[serde(default)]
    index: Value,
}

pub fn register_chat_handlers(broker: &Broker) {
    broker.on_connect(assign_user_id);
    broker.on("joinRoom", join_room);
    broker.on("leaveRoom", leave_room);
    broker.on("chat", chat);
    broker.on("test", test);
}

async fn assign_user_id(_data: Value, ctx: EventContext) -> HandlerResult {
    let user = ctx.broker.generate_id();
    ctx.broker.store(
        ctx.connection_id(),
        [(USER_ID_KEY.to_string(), Value::String(user.clone()))],
    );
    ctx.reply("connected", json!({ "userId": user })).await;
    Ok(())
}

fn user_id(ctx: &EventContext) -> String {
    match ctx.broker.registry().get_field(ctx.connection_id(), USER_ID_KEY) {
        Some(Value::String(user)) => user,
        _ => "anon".to_string(),
    }
}

async fn join_room(data: Value, ctx: EventContext) -> HandlerResult {
    let RoomRequest { room } = ctx.decode(data)?;
    let id = ctx.connection_id();
    let user = user_id(&ctx);

    ctx.broker.join_room(id, &room);
    ctx.broker
        .store(id, [(ROOM_KEY.to_string(), Value::String(room.clone()))]);
    tracing::info!(user_id = %user, room = %room, "User joined room");

    ctx.reply("roomJoined", json!({ "room": room })).await;
    Ok(())
}

async fn leave_room(data: Value, ctx: EventContext) -> HandlerResult {
    let RoomRequest { room } = ctx.decode(data)?;
    let id = ctx.connection_id();

    ctx.broker.leave_room(id, &room);
    ctx.reply("roomLeft", json!({ "room": room })).await;

    let current = ctx.broker.registry().get_field(id, ROOM_KEY);
    if current.as_ref().and_then(Value::as_str) == Some(room.as_str()) {
        ctx.broker.store(id, [(ROOM_KEY.to_string(), Value::Null)]);
    }
    Ok(())
}

async fn chat(data: Value, ctx: EventContext) -> HandlerResult {
    let ChatRequest { text } = ctx.decode(data)?;
    let id = ctx.connection_id();

    let Some(Value::String(room)) = ctx.broker.registry().get_field(id, ROOM_KEY) else {
        tracing::debug!(connection_id = %id, "Chat outside of a room ignored");
        return Ok(());
    };
    let from = user_id(&ctx);

    ctx.broker
        .broadcast_to(&room, "chat", json!({ "from": from, "text": text }))
        .await;
    Ok(())
}

async fn test(data: Value, ctx: EventContext) -> HandlerResult {
    let TestRequest { index } = ctx.decode(data)?;
    tracing::debug!(connection_id = %ctx.connection_id(), index = %index, "Test frame");

    ctx.reply(
        "test-reply",
        json!({ "index": index, "time": Utc::now().to_rfc3339() }),
    )
    .await;
    Ok(())
}
