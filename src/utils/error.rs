//! The `error` module defines the error type shared by every part of the bridge.
//!
//! Only configuration errors (and a listener that cannot bind) are allowed to
//! stop the process. Everything else is produced per message or per
//! connection, logged by the caller, and then dropped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or invalid setting detected during validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configuration sources could not be read or deserialized.
    #[error("configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// An inbound payload was not a valid JSON document.
    #[error("payload parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A write to a single client failed; the client is considered gone.
    #[error("delivery to {connection} failed: {reason}")]
    Delivery { connection: String, reason: String },

    /// The registry already holds the configured maximum of clients.
    #[error("connection limit of {0} reached")]
    CapacityReached(usize),

    /// The broker refused the topic subscription.
    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("listener error: {0}")]
    Listener(#[from] std::io::Error),

    #[error("websocket handshake error: {0}")]
    Handshake(#[from] tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
