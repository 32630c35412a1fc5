//! Room introspection endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::connection_manager::RoomInfo;
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomInfo>,
    pub total_rooms: usize,
}

#[derive(Debug, Serialize)]
pub struct RoomDetailResponse {
    pub name: String,
    pub member_count: usize,
}

/// GET /api/v1/rooms - List all rooms with member counts
pub async fn list_rooms(State(state): State<AppState>) -> Json<RoomListResponse> {
    let mut rooms = state.broker.rooms().list_room_info();
    rooms.sort_by(|a, b| a.name.cmp(&b.name));
    let total = rooms.len();

    Json(RoomListResponse {
        rooms,
        total_rooms: total,
    })
}

/// GET /api/v1/rooms/{name} - Get room details
pub async fn get_room(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RoomDetailResponse>> {
    let info = state
        .broker
        .rooms()
        .room_info(&name)
        .ok_or_else(|| AppError::NotFound(format!("Room '{}' does not exist", name)))?;

    Ok(Json(RoomDetailResponse {
        name: info.name,
        member_count: info.member_count,
    }))
}
