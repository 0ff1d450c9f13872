//! Turns raw MQTT publications into outbound envelopes.
//!
//! Topics look like `classroom/<device>/telemetry`: segment 0 is a namespace
//! and segment 1 names the device.

use serde_json::Value;

use crate::relay::envelope::OutboundEnvelope;
use crate::utils::Result;

pub const TOPIC_DELIMITER: char = '/';
pub const DEVICE_SEGMENT: usize = 1;

/// One message as received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundEvent {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Returns the device segment of `topic`, or "" when the topic is too short.
pub fn device_id_from_topic(topic: &str) -> &str {
    topic.split(TOPIC_DELIMITER).nth(DEVICE_SEGMENT).unwrap_or("")
}

/// Decodes `raw` as JSON and wraps it in a telemetry envelope stamped now.
pub fn transform(topic: &str, raw: &[u8]) -> Result<OutboundEnvelope> {
    transform_at(topic, raw, chrono::Utc::now().timestamp_millis())
}

/// Same as [`transform`] with an explicit timestamp.
pub fn transform_at(topic: &str, raw: &[u8], timestamp: i64) -> Result<OutboundEnvelope> {
    let payload: Value = serde_json::from_slice(raw)?;
    Ok(OutboundEnvelope::telemetry(
        device_id_from_topic(topic).to_string(),
        topic.to_string(),
        payload,
        timestamp,
    ))
}
