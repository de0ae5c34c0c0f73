//! Process-wide registry of open connections.
//!
//! A connection is present from the moment its upgrade is accepted until its
//! close hook runs. The registry is only ever inserted into, removed from,
//! and counted; it is never iterated.

use std::sync::Arc;

use dashmap::DashMap;
use gqlws_core::{Connection, ConnectionId};

/// Set of live connections keyed by id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<dyn Connection>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened connection.
    pub fn insert(&self, conn: Arc<dyn Connection>) {
        let _ = self.connections.insert(conn.id().clone(), conn);
    }

    /// Stop tracking a connection. Returns whether it was present.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    /// Whether a connection with this id is tracked.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections.len())
            .finish()
    }
}
