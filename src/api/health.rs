//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub rooms: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStatsResponse,
    pub rate_limit: RateLimitStatsResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatsResponse {
    pub total_connections: usize,
    pub rooms: HashMap<String, usize>,
    pub tracked_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct RateLimitStatsResponse {
    pub enabled: bool,
    pub max_per_second: Option<u32>,
    pub throttle: bool,
    pub tracked_connections: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: state.broker.connections().len(),
        rooms: state.broker.rooms().len(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let conn_stats = state.broker.stats();
    let limiter = state.broker.rate_limiter();

    Json(StatsResponse {
        connections: ConnectionStatsResponse {
            total_connections: conn_stats.total_connections,
            rooms: conn_stats.rooms,
            tracked_sessions: conn_stats.tracked_sessions,
        },
        rate_limit: RateLimitStatsResponse {
            enabled: limiter.is_enabled(),
            max_per_second: limiter.config().max_per_second,
            throttle: limiter.config().throttle_enabled(),
            tracked_connections: limiter.tracked(),
        },
    })
}
