//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BROADCAST_DELIVERED_TOTAL, INBOUND_FRAMES_TOTAL, PROTOCOL_ERRORS_TOTAL,
    SESSIONS_RESTORED_TOTAL, UNROUTED_EVENTS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording inbound frame outcomes
pub struct FrameMetrics;

impl FrameMetrics {
    pub fn record_admitted() {
        INBOUND_FRAMES_TOTAL.with_label_values(&["admitted"]).inc();
    }

    pub fn record_throttled() {
        INBOUND_FRAMES_TOTAL.with_label_values(&["throttled"]).inc();
    }

    pub fn record_rejected() {
        INBOUND_FRAMES_TOTAL.with_label_values(&["rejected"]).inc();
    }

    pub fn record_protocol_error() {
        PROTOCOL_ERRORS_TOTAL.inc();
    }

    pub fn record_unrouted() {
        UNROUTED_EVENTS_TOTAL.inc();
    }
}

/// Helper struct for recording fan-out deliveries
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record_room(delivered: usize) {
        BROADCAST_DELIVERED_TOTAL
            .with_label_values(&["room"])
            .inc_by(delivered as u64);
    }

    pub fn record_tag(delivered: usize) {
        BROADCAST_DELIVERED_TOTAL
            .with_label_values(&["tag"])
            .inc_by(delivered as u64);
    }
}

pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_restored() {
        SESSIONS_RESTORED_TOTAL.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_metrics() {
        FrameMetrics::record_admitted();
        FrameMetrics::record_throttled();
        FrameMetrics::record_rejected();
        FrameMetrics::record_protocol_error();
        FrameMetrics::record_unrouted();
        // Just verify no panics
    }

    #[test]
    fn test_encode_contains_prefix() {
        BroadcastMetrics::record_room(2);
        SessionMetrics::record_restored();
        let output = encode_metrics().unwrap();
        assert!(output.contains("roomwire_broadcast_delivered_total"));
    }
}
