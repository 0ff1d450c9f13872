//! MQTT transport
//!
//! Wraps a `rumqttc` client subscribed to the configured topic pattern and
//! forwards every publication to the relay as an `InboundEvent`.
//! Responsibilities:
//! - (Re)subscribe each time the broker acknowledges a connection, so a
//!   reconnect restores the subscription
//! - Report whether the broker granted the subscription
//! - Keep polling through broker outages; `rumqttc` reconnects on the next poll
//!
//! The loop only hands events to an unbounded channel and never waits on the
//! relay, so the client keeps up with the broker's keep-alive.

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubAck, SubscribeReasonCode};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::MqttSettings;
use crate::relay::InboundEvent;
use crate::utils::{BridgeError, Result};

/// Capacity of the request queue between `AsyncClient` and the event loop.
const REQUEST_CAPACITY: usize = 10;
const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    broker_url: String,
    topic_pattern: String,
}

impl MqttSubscriber {
    /// Builds the client. The connection itself is opened lazily by the first
    /// poll in [`MqttSubscriber::run`].
    pub fn new(settings: &MqttSettings) -> Result<Self> {
        let (host, port) = settings.endpoint()?;
        let keep_alive = settings.keep_alive()?;
        tracing::info!(broker = %settings.broker_url, "Connecting to MQTT broker...");
        let mut opts = MqttOptions::new(settings.client_id.clone(), host, port);
        opts.set_keep_alive(keep_alive);

        let (client, eventloop) = AsyncClient::new(opts, REQUEST_CAPACITY);
        Ok(Self {
            client,
            eventloop,
            broker_url: settings.broker_url.clone(),
            topic_pattern: settings.topic_pattern.clone(),
        })
    }

    pub fn topic_pattern(&self) -> &str {
        &self.topic_pattern
    }

    /// Polls the broker until `events` is closed by the relay side.
    pub async fn run(mut self, events: UnboundedSender<InboundEvent>) {
        loop {
            tokio::select! {
                _ = events.closed() => {
                    tracing::info!("Relay gone, MQTT subscriber stopping");
                    break;
                }
                polled = self.eventloop.poll() => match polled {
                    Ok(Event::Incoming(packet)) => {
                        if !self.on_packet(packet, &events) {
                            break;
                        }
                    }
                    Ok(Event::Outgoing(_)) => {}
                    Err(e) => {
                        tracing::error!(broker = %self.broker_url, "MQTT error: {e} (retrying)");
                        tokio::select! {
                            _ = events.closed() => break,
                            _ = tokio::time::sleep(RETRY_DELAY) => {}
                        }
                    }
                }
            }
        }
    }

    /// Reacts to one incoming packet. Returns false once the relay has hung up.
    fn on_packet(&self, packet: Packet, events: &UnboundedSender<InboundEvent>) -> bool {
        match packet {
            Packet::ConnAck(_) => {
                tracing::info!("Connected to MQTT broker");
                if let Err(e) = self.subscribe() {
                    tracing::error!("{e}");
                }
                true
            }
            Packet::SubAck(ack) => {
                match check_suback(&ack) {
                    Ok(()) => tracing::info!(topic = %self.topic_pattern, "Subscription successful"),
                    Err(e) => tracing::error!("{e}"),
                }
                true
            }
            Packet::Publish(publish) => {
                tracing::debug!(topic = %publish.topic, "Message received");
                events
                    .send(InboundEvent::new(publish.topic, publish.payload.to_vec()))
                    .is_ok()
            }
            Packet::Disconnect => {
                tracing::warn!("Broker sent disconnect");
                true
            }
            _ => true,
        }
    }

    fn subscribe(&self) -> Result<()> {
        tracing::info!(topic = %self.topic_pattern, "Subscribing to topic");
        self.client
            .try_subscribe(self.topic_pattern.clone(), QoS::AtMostOnce)
            .map_err(|e| {
                BridgeError::Subscription(format!(
                    "could not request subscription to '{}': {e}",
                    self.topic_pattern
                ))
            })
    }
}

/// Maps a SUBACK onto success or a `Subscription` error.
pub fn check_suback(ack: &SubAck) -> Result<()> {
    if ack
        .return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
    {
        return Err(BridgeError::Subscription(format!(
            "broker rejected subscription (packet id {})",
            ack.pkid
        )));
    }
    Ok(())
}
