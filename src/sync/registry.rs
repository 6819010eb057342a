//! Registry of live node connections.
//!
//! Maps a node id to the outbound message handle bound to its current socket.
//! Exactly one handle is live per node: a reconnect replaces the old handle,
//! and the superseding session closes the stale socket.

use crate::ws::protocol::HiveFrame;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Error from registry sends.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("node is offline")]
    NodeOffline,
}

/// Message queued for delivery to a node's socket.
#[derive(Debug, Clone)]
pub enum Outgoing {
    Frame(HiveFrame),
    /// Tell the session task to close the socket (used when a newer
    /// connection supersedes it).
    Close,
}

/// Outbound handle for one live node connection.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    /// Identifies the session that owns this handle, so a stale session's
    /// cleanup cannot tear down a newer connection.
    pub connection_id: Uuid,
    pub sender: mpsc::Sender<Outgoing>,
}

impl NodeHandle {
    pub fn new(connection_id: Uuid, sender: mpsc::Sender<Outgoing>) -> Self {
        Self {
            connection_id,
            sender,
        }
    }

    /// Non-blocking send; drops the message if the channel is full or closed.
    pub fn try_send(&self, msg: Outgoing) -> bool {
        self.sender.try_send(msg).is_ok()
    }
}

/// Tracks which nodes are connected and how to reach them.
pub struct NodeConnectionRegistry {
    handles: RwLock<HashMap<Uuid, NodeHandle>>,
}

impl Default for NodeConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeConnectionRegistry {
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Register the handle for a node's live socket, replacing and returning
    /// any prior handle. The caller closes the superseded connection.
    pub async fn register(&self, node_id: Uuid, handle: NodeHandle) -> Option<NodeHandle> {
        self.handles.write().await.insert(node_id, handle)
    }

    /// Remove the node's handle, but only if it still belongs to the given
    /// connection. Returns whether a handle was removed.
    pub async fn unregister(&self, node_id: Uuid, connection_id: Uuid) -> bool {
        let mut handles = self.handles.write().await;
        match handles.get(&node_id) {
            Some(h) if h.connection_id == connection_id => {
                handles.remove(&node_id);
                true
            }
            _ => false,
        }
    }

    /// Queue a frame for the node, failing with `NodeOffline` when it has no
    /// live connection (a closed channel counts as offline).
    pub async fn send(&self, node_id: Uuid, frame: HiveFrame) -> Result<(), RegistryError> {
        let handles = self.handles.read().await;
        let handle = handles.get(&node_id).ok_or(RegistryError::NodeOffline)?;
        if handle.try_send(Outgoing::Frame(frame)) {
            Ok(())
        } else {
            Err(RegistryError::NodeOffline)
        }
    }

    /// Whether the node currently has a live connection.
    pub async fn is_online(&self, node_id: Uuid) -> bool {
        self.handles.read().await.contains_key(&node_id)
    }

    /// Ids of all currently connected nodes.
    pub async fn online_nodes(&self) -> Vec<Uuid> {
        self.handles.read().await.keys().copied().collect()
    }
}
