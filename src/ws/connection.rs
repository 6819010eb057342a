//! Per-connection state for node sync sessions.

use std::time::Instant;
use uuid::Uuid;

/// State for one node's live socket.
#[derive(Debug)]
pub struct NodeConnection {
    /// Server-generated session id; registry handles carry it so stale
    /// sessions cannot tear down a newer connection.
    pub id: Uuid,
    /// The authenticated node on the other end.
    pub node_id: Uuid,
    /// Last inbound activity (for timeout detection).
    pub last_activity: Instant,
}

impl NodeConnection {
    pub fn new(node_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id,
            last_activity: Instant::now(),
        }
    }

    /// Update last activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}
