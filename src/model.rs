//! Shared data model for the hive and its nodes.
//!
//! The hive keeps shadow records of task attempts executed on nodes; nodes keep
//! the authoritative local copies. Snapshot types defined here are reused as
//! wire payloads by both backfill and ordinary live streaming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncState;

/// Connectivity status of a node, as seen by the hive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    #[default]
    Offline,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(NodeStatus::Online),
            "offline" => Ok(NodeStatus::Offline),
            _ => Err(format!("Unknown node status: {}", s)),
        }
    }
}

/// A worker node registered with the hive.
///
/// Created on registration. `status` and `last_seen_at` are mutated only by the
/// sync session on connect/disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: Uuid,
    pub name: String,
    pub status: NodeStatus,
    pub last_seen_at: DateTime<Utc>,
    /// Opaque auth secret presented by the node on connect.
    pub token: String,
}

/// Operator-facing view of a node (no auth secret).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: Uuid,
    pub name: String,
    pub status: NodeStatus,
    pub last_seen_at: DateTime<Utc>,
}

impl From<&NodeRecord> for NodeSummary {
    fn from(node: &NodeRecord) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            status: node.status,
            last_seen_at: node.last_seen_at,
        }
    }
}

/// A project tracked by the hive.
///
/// `link_id` is the remote swarm counterpart; `None` means the project is
/// unlinked and its tasks/attempts are local-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub name: String,
    pub link_id: Option<Uuid>,
}

/// A task belonging to a project.
///
/// `shared_task_id` names the shared counterpart fanned out across nodes. A
/// task that still carries one after its project is unlinked is orphaned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub shared_task_id: Option<Uuid>,
}

/// Hive-side shadow record of a task attempt executed on a node.
///
/// Invariant: `backfill_request_id` is non-null iff `sync_state` is
/// `PendingBackfill`. Mutated only by the backfill service and sync sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub task_id: Uuid,
    pub node_id: Uuid,
    pub executor: String,
    pub branch: String,
    pub sync_state: SyncState,
    pub backfill_request_id: Option<Uuid>,
    pub sync_requested_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Execution outcome of a single process run within an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// Attempt metadata as carried on the wire and stored node-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSnapshot {
    pub id: Uuid,
    pub task_id: Uuid,
    pub node_id: Uuid,
    pub executor: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One execution process record within an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One log line emitted by an execution.
///
/// `entry_id` is a per-attempt monotonic cursor: `Logs { since }` backfills
/// return entries with `entry_id > since`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntrySnapshot {
    pub entry_id: i64,
    pub execution_id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Full backfill payload for one attempt: metadata plus every execution record
/// and every log entry the node holds for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptBackfill {
    pub attempt: AttemptSnapshot,
    pub executions: Vec<ExecutionSnapshot>,
    pub logs: Vec<LogEntrySnapshot>,
}

/// Node-local attempt row.
///
/// `shared_task_id` is the hive link; a local attempt without one cannot be
/// backfilled and reports `NotLinked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAttempt {
    pub id: Uuid,
    pub shared_task_id: Option<Uuid>,
    pub node_id: Uuid,
    pub executor: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalAttempt {
    /// Wire snapshot of this attempt. Only valid for linked attempts; the
    /// caller checks `shared_task_id` first.
    pub fn snapshot(&self, shared_task_id: Uuid) -> AttemptSnapshot {
        AttemptSnapshot {
            id: self.id,
            task_id: shared_task_id,
            node_id: self.node_id,
            executor: self.executor.clone(),
            branch: self.branch.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
