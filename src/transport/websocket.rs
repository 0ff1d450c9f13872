//! WebSocket transport
//!
//! This file implements the listener side of the bridge. Responsibilities:
//! - Accept TCP/WebSocket connections
//! - Create a `Connection` for each client and register it with the registry
//! - Send the welcome envelope to the new client only
//! - Run a writer task that drains the client's queue onto the socket
//! - Remove the client exactly once when it closes, errors, or its writer fails
//!
//! Frames sent by clients are read only to notice close and error; their
//! content is ignored.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::client::Connection;
use crate::relay::{ConnectionRegistry, Relay};
use crate::utils::{BridgeError, Result};

/// Pause after a failed accept, e.g. when the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct WebSocketListener {
    listener: TcpListener,
    relay: Relay,
}

impl WebSocketListener {
    /// Binds the listening socket. Failing to bind is a startup error.
    pub async fn bind(addr: &str, relay: Relay) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("WebSocket server listening on ws://{}", listener.local_addr()?);
        Ok(Self { listener, relay })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts clients until the task is dropped. Accept failures are logged
    /// and do not affect clients that are already connected.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let relay = self.relay.clone();
                    spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, relay).await {
                            tracing::warn!(%peer, "Client connection failed: {e}");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("WebSocket server error: {}", BridgeError::Listener(e));
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, relay: Relay) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let conn = Arc::new(Connection::new(tx));
    let client_id = conn.id.clone();
    let registry = relay.registry().clone();

    // Register client before doing anything else
    if let Err(e) = registry.add(conn.clone()) {
        tracing::warn!(%peer, "Rejecting client: {e}");
        let frame = CloseFrame {
            code: CloseCode::Again,
            reason: e.to_string().into(),
        };
        let _ = ws_sender.send(WsMessage::Close(Some(frame))).await;
        return Err(e);
    }
    tracing::info!(client = %client_id, %peer, "New client connected");

    if let Err(e) = relay.send_welcome(&conn) {
        tracing::warn!(client = %client_id, "Failed to queue welcome message: {e}");
    }

    // Forward queued frames to the socket. The writer must not own the
    // connection, or its own sender would keep `rx` open forever.
    let writer = {
        let client_id = client_id.clone();
        let registry = registry.clone();
        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    tracing::warn!(client = %client_id, "Failed to send message: {e}");
                    registry.remove(&client_id);
                    break;
                }
            }
            let _ = ws_sender.close().await;
        })
    };

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Close(_)) => {
                conn.begin_close();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(client = %client_id, "Client error: {e}");
                conn.begin_close();
                break;
            }
        }
    }

    cleanup(&registry, &conn);
    // Dropping the last sender lets the writer finish once the queue drains.
    drop(conn);
    let _ = writer.await;
    Ok(())
}

/// Removes the client from the registry and marks it `Closed`. Returns true
/// only for the first call, which logs the disconnect. The client may already
/// be gone from the registry if its writer or the relay removed it first.
pub(super) fn cleanup(registry: &ConnectionRegistry, conn: &Connection) -> bool {
    registry.remove(&conn.id);
    let first = conn.close();
    if first {
        tracing::info!(client = %conn.id, "Client disconnected");
    }
    first
}
