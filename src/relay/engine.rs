//! Relay engine
//!
//! This module contains the fan-out from the MQTT side to every WebSocket
//! client:
//! - transforming inbound publications into envelopes
//! - serializing each envelope once and pushing the same frame to every open
//!   connection in a registry snapshot
//! - pruning connections whose delivery fails
//!
//! Delivery is fire-and-forget. Each connection has its own unbounded queue
//! and writer task, so a slow client never holds up the relay or other
//! clients; a dead one is found on the next failed push and dropped.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tungstenite::protocol::Message as WsMessage;

use crate::client::Connection;
use crate::relay::envelope::OutboundEnvelope;
use crate::relay::registry::ConnectionRegistry;
use crate::relay::transform::{InboundEvent, transform};
use crate::utils::Result;

#[derive(Debug, Clone)]
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
}

impl Relay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Consumes inbound events in arrival order until every sender is dropped.
    pub async fn run(&self, mut events: UnboundedReceiver<InboundEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        tracing::info!("Inbound event channel closed, relay stopping");
    }

    /// Transforms and broadcasts a single event. Returns the delivery count;
    /// a payload that fails to parse is logged and delivers to nobody.
    pub fn handle(&self, event: InboundEvent) -> usize {
        tracing::debug!(topic = %event.topic, "Message received");

        match transform(&event.topic, &event.payload) {
            Ok(envelope) => self.broadcast(&envelope),
            Err(e) => {
                tracing::warn!(topic = %event.topic, "Dropping message: {e}");
                0
            }
        }
    }

    /// Pushes `envelope` to every open connection and returns how many
    /// accepted it. The count is informational only.
    pub fn broadcast(&self, envelope: &OutboundEnvelope) -> usize {
        let frame = match encode(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to serialize envelope: {e}");
                return 0;
            }
        };

        let mut sent = 0;
        for conn in self.registry.snapshot() {
            if !conn.is_open() {
                self.registry.remove(&conn.id);
                continue;
            }
            match conn.send(frame.clone()) {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!("{e}; removing client");
                    self.registry.remove(&conn.id);
                }
            }
        }

        tracing::info!("Sent to {sent} client(s)");
        sent
    }

    /// Sends the welcome envelope to `conn` alone.
    pub fn send_welcome(&self, conn: &Connection) -> Result<()> {
        let envelope = OutboundEnvelope::connected(chrono::Utc::now().timestamp_millis());
        conn.send(encode(&envelope)?)
    }
}

/// Serializes an envelope into a text frame. The frame's buffer is shared,
/// so cloning it per connection does not copy the JSON.
pub fn encode(envelope: &OutboundEnvelope) -> Result<WsMessage> {
    Ok(WsMessage::text(envelope.to_json()?))
}
