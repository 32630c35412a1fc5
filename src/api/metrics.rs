//! Prometheus metrics endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::error::Result;
use crate::metrics;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    update_metrics_from_state(&state);

    let output = metrics::encode_metrics()?;
    Ok((
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    ))
}

/// Refresh gauges that mirror broker state
fn update_metrics_from_state(state: &AppState) {
    let stats = state.broker.stats();
    metrics::CONNECTIONS_ACTIVE.set(stats.total_connections as i64);
    metrics::ROOMS_ACTIVE.set(stats.rooms.len() as i64);
    metrics::SESSIONS_TRACKED.set(stats.tracked_sessions as i64);
}
