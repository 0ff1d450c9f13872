//! Connection registry
//!
//! The set of clients that are currently open. It is the only shared mutable
//! state in the bridge: the listener adds and removes entries from per-client
//! tasks while the relay takes snapshots to broadcast over.
//!
//! Concurrency notes:
//! - Backed by `DashMap`, so `add`, `remove` and `snapshot` may be called from
//!   any task without an outer lock.
//! - `snapshot` copies the `Arc` handles out before returning. Broadcasting
//!   iterates that copy, so a client closing mid-broadcast only contends on a
//!   shard lock for the duration of the copy and can never deadlock with it.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use crate::client::{Connection, ConnectionId};
use crate::utils::{BridgeError, Result};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// 0 means no limit.
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_connections,
        }
    }

    pub fn new_shared(max_connections: usize) -> Arc<Self> {
        Arc::new(Self::new(max_connections))
    }

    /// Registers an open connection.
    ///
    /// Returns `Ok(false)` if the same connection is already present. Closed
    /// connections are never admitted.
    pub fn add(&self, conn: Arc<Connection>) -> Result<bool> {
        if !conn.is_open() {
            return Err(BridgeError::Delivery {
                connection: conn.id.clone(),
                reason: "connection closed before registration".to_string(),
            });
        }
        // The limit check is not atomic with the insert, so concurrent
        // accepts may overshoot it by a few entries.
        if self.max_connections > 0
            && self.connections.len() >= self.max_connections
            && !self.connections.contains_key(&conn.id)
        {
            return Err(BridgeError::CapacityReached(self.max_connections));
        }

        match self.connections.entry(conn.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                tracing::debug!(connection = %conn.id, "Connection added");
                slot.insert(conn);
                Ok(true)
            }
        }
    }

    /// Unregisters a connection and moves it to `Closing`, so it refuses new
    /// frames. It becomes `Closed` when its socket handler finishes. Returns
    /// whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        match self.connections.remove(id) {
            Some((_, conn)) => {
                conn.begin_close();
                tracing::debug!(connection = %id, "Connection removed");
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of the current members.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
