use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text sent to every client right after it connects.
pub const WELCOME_MESSAGE: &str = "Connected to MQTT -> WebSocket bridge";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Telemetry,
    Connected,
}

/// Represents one message pushed to WebSocket clients.
///
/// Telemetry envelopes carry the device id, the source topic and the decoded
/// payload; the welcome envelope carries only a human readable `message`.
/// Absent fields are left out of the JSON entirely.
///
/// # Example
///
/// ```rust
/// use telemetry_bridge::relay::envelope::OutboundEnvelope;
///
/// let env = OutboundEnvelope::telemetry(
///     "device42".to_string(),
///     "classroom/device42/telemetry".to_string(),
///     serde_json::json!({ "temp": 21.5 }),
///     1_725_000_000_000,
/// );
/// assert_eq!(env.device_id.as_deref(), Some("device42"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix time in milliseconds at which the bridge built the envelope.
    pub timestamp: i64,
}

impl OutboundEnvelope {
    pub fn telemetry(device_id: String, topic: String, payload: Value, timestamp: i64) -> Self {
        Self {
            kind: EnvelopeKind::Telemetry,
            device_id: Some(device_id),
            topic: Some(topic),
            payload: Some(payload),
            message: None,
            timestamp,
        }
    }

    pub fn connected(timestamp: i64) -> Self {
        Self {
            kind: EnvelopeKind::Connected,
            device_id: None,
            topic: None,
            payload: None,
            message: Some(WELCOME_MESSAGE.to_string()),
            timestamp,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
