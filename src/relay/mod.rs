//! The `relay` module is the core of the bridge.
//!
//! - `transform`: raw MQTT publication -> `OutboundEnvelope`.
//! - `envelope`: the JSON shape sent to WebSocket clients.
//! - `registry`: the concurrent set of open client connections.
//! - `engine`: `Relay`, which broadcasts envelopes over a registry snapshot.

pub mod engine;
pub mod envelope;
pub mod registry;
pub mod transform;

pub use engine::Relay;
pub use envelope::{EnvelopeKind, OutboundEnvelope};
pub use registry::ConnectionRegistry;
pub use transform::{InboundEvent, transform};

#[cfg(test)]
mod tests;
