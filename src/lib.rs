//! # Telemetry Bridge
//!
//! `telemetry_bridge` relays MQTT telemetry to WebSocket clients. Every
//! message published on a topic matching the configured pattern is decoded,
//! wrapped in a small JSON envelope and pushed to every connected client.
//!
//! ## Core Modules
//!
//! - `relay`: transforms inbound messages and broadcasts them over the
//!   registry of open connections.
//! - `client`: the handle representing one connected WebSocket client.
//! - `config`: loading and validating configuration.
//! - `transport`: the MQTT subscriber and the WebSocket listener.
//! - `utils`: the shared error type and logging setup.

pub mod client;
pub mod config;
pub mod relay;
pub mod transport;
pub mod utils;
