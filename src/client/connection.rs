//! Connection handle
//!
//! `Connection` models one connected WebSocket client. It holds the sending
//! side of a per-client channel; a dedicated writer task owned by the
//! transport drains the other side onto the socket, so pushing a frame here
//! never waits on the network.

use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::utils::{BridgeError, Result};

pub type ConnectionId = String;

/// Lifecycle of a client connection. Only `Open` connections receive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    sender: UnboundedSender<WsMessage>,
    state: AtomicU8,
}

impl Connection {
    /// Create a new open connection around a sender channel. The `id` is a
    /// UUID used to identify the client in the registry and in logs.
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            state: AtomicU8::new(ConnectionState::Open as u8),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open && !self.sender.is_closed()
    }

    /// Queues a frame for the writer task.
    ///
    /// Fails if the connection is no longer open or its writer has exited.
    pub fn send(&self, msg: WsMessage) -> Result<()> {
        if self.state() != ConnectionState::Open {
            return Err(self.delivery_error("connection is not open"));
        }
        self.sender
            .send(msg)
            .map_err(|_| self.delivery_error("writer channel closed"))
    }

    /// Moves an open connection to `Closing`. Returns false if it was not open.
    pub fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Marks the connection closed. Returns true only for the call that
    /// performed the transition, so cleanup can run exactly once.
    pub fn close(&self) -> bool {
        self.state.swap(ConnectionState::Closed as u8, Ordering::AcqRel)
            != ConnectionState::Closed as u8
    }

    fn delivery_error(&self, reason: &str) -> BridgeError {
        BridgeError::Delivery {
            connection: self.id.clone(),
            reason: reason.to_string(),
        }
    }
}
