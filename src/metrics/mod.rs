//! Prometheus metrics for the broker.
//!
//! - Connection metrics (opened, closed, active, lifetime)
//! - Inbound frame outcomes (admitted, throttled, rejected)
//! - Routing failures (protocol errors, unrouted events)
//! - Room, tag and session activity

mod helpers;

pub use helpers::{encode_metrics, BroadcastMetrics, FrameMetrics, SessionMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "roomwire";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Total WebSocket connections accepted
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections accepted"
    ).unwrap();

    /// Total WebSocket connections torn down
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connection lifetime in seconds
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 86400.0]
    ).unwrap();

    /// Currently registered connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of currently registered connections"
    ).unwrap();

    // ============================================================================
    // Frame Metrics
    // ============================================================================

    /// Inbound frames by admission outcome
    pub static ref INBOUND_FRAMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_inbound_frames_total", METRIC_PREFIX),
        "Inbound frames by admission outcome",
        &["outcome"]
    ).unwrap();

    /// Frames that failed to decode as an envelope
    pub static ref PROTOCOL_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_protocol_errors_total", METRIC_PREFIX),
        "Frames dropped because they could not be decoded"
    ).unwrap();

    /// Envelopes naming an event with no handler
    pub static ref UNROUTED_EVENTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_unrouted_events_total", METRIC_PREFIX),
        "Envelopes naming an event with no registered handler"
    ).unwrap();

    // ============================================================================
    // Room / Tag / Session Metrics
    // ============================================================================

    /// Rooms with at least one member
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of rooms with at least one member"
    ).unwrap();

    /// Frames delivered by broadcast target type
    pub static ref BROADCAST_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_broadcast_delivered_total", METRIC_PREFIX),
        "Frames delivered by broadcast target type",
        &["target"]
    ).unwrap();

    /// Durable identities with a recorded snapshot
    pub static ref SESSIONS_TRACKED: IntGauge = register_int_gauge!(
        format!("{}_sessions_tracked", METRIC_PREFIX),
        "Durable identities with a recorded snapshot"
    ).unwrap();

    /// Successful session restorations
    pub static ref SESSIONS_RESTORED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sessions_restored_total", METRIC_PREFIX),
        "Total reconnect handshakes answered with session-restored"
    ).unwrap();
}
