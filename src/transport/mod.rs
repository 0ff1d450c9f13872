//! The `transport` module connects the relay to the outside world.
//!
//! `mqtt` subscribes to the broker and produces inbound events; `websocket`
//! accepts browser and dashboard clients and registers them with the relay.

pub mod mqtt;
pub mod websocket;

pub use mqtt::MqttSubscriber;
pub use websocket::WebSocketListener;
