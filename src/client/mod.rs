//! The `client` module defines the representation of a connected WebSocket
//! client in the bridge.
//!
//! It provides the `Connection` handle, which encapsulates the identity and
//! lifecycle state of a single client together with the channel used to push
//! frames to it.

pub mod connection;
pub use connection::{Connection, ConnectionId, ConnectionState};
