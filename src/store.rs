//! Hive-side durable store.
//!
//! Holds node registrations, projects, tasks, and the shadow attempt records
//! whose sync state this service maintains. Rows are JSON-encoded into redb
//! tables keyed by id. Every multi-row mutation (backfill apply, unlink) runs
//! in a single write transaction so readers never observe a half-applied
//! state.

use crate::model::{
    AttemptRecord, ExecutionSnapshot, LogEntrySnapshot, NodeRecord, NodeStatus, ProjectRecord,
    TaskRecord,
};
use crate::sync::SyncState;
use crate::ws::protocol::BackfillPayload;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

const NODES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("nodes");
const PROJECTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("projects");
const TASKS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("tasks");
const ATTEMPTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("attempts");
// Keyed "{attempt_id}:{execution_id}" for per-attempt range scans.
const EXECUTIONS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("executions");
// Keyed "{attempt_id}:{entry_id:020}" so entries scan in cursor order.
const LOGS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("logs");

/// Error from hive store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

fn db_err<E: Into<redb::Error>>(e: E) -> StoreError {
    StoreError::Database(e.into().to_string())
}

fn encode_row<T: serde::Serialize>(row: &T) -> Result<String, StoreError> {
    serde_json::to_string(row).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode_row<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn log_key(attempt_id: Uuid, entry_id: i64) -> String {
    format!("{}:{:020}", attempt_id, entry_id)
}

fn prefix_range(id: Uuid) -> (String, String) {
    // ':' sorts immediately before ';' in the key encoding.
    (format!("{}:", id), format!("{};", id))
}

/// Counts returned by the transactional unlink-and-reset.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct UnlinkSummary {
    pub tasks_unlinked: u64,
    pub attempts_reset: u64,
}

/// Hive-side store of nodes, projects, tasks and attempt shadows.
pub struct HiveStore {
    db: Arc<RwLock<Database>>,
}

impl HiveStore {
    /// Create or open the hive store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(db_err)?;
        // Make sure all tables exist so first reads do not fail.
        {
            let txn = db.begin_write().map_err(db_err)?;
            txn.open_table(NODES_TABLE).map_err(db_err)?;
            txn.open_table(PROJECTS_TABLE).map_err(db_err)?;
            txn.open_table(TASKS_TABLE).map_err(db_err)?;
            txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
            txn.open_table(EXECUTIONS_TABLE).map_err(db_err)?;
            txn.open_table(LOGS_TABLE).map_err(db_err)?;
            txn.commit().map_err(db_err)?;
        }
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    // --- nodes ---

    pub async fn upsert_node(&self, node: &NodeRecord) -> Result<(), StoreError> {
        let json = encode_row(node)?;
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(NODES_TABLE).map_err(db_err)?;
            table
                .insert(node.id.to_string().as_str(), json.as_str())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    pub async fn get_node(&self, id: Uuid) -> Result<Option<NodeRecord>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(NODES_TABLE).map_err(db_err)?;
        match table.get(id.to_string().as_str()).map_err(db_err)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(NODES_TABLE).map_err(db_err)?;
        let mut nodes = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            nodes.push(decode_row(v.value())?);
        }
        Ok(nodes)
    }

    /// Verify the node's auth token, returning the record on success.
    pub async fn authenticate_node(
        &self,
        id: Uuid,
        token: &str,
    ) -> Result<Option<NodeRecord>, StoreError> {
        Ok(self
            .get_node(id)
            .await?
            .filter(|node| node.token == token))
    }

    /// Update connectivity, stamping `last_seen_at`.
    pub async fn set_node_status(&self, id: Uuid, status: NodeStatus) -> Result<(), StoreError> {
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(NODES_TABLE).map_err(db_err)?;
            let key = id.to_string();
            let existing: Option<NodeRecord> = match table.get(key.as_str()).map_err(db_err)? {
                Some(guard) => Some(decode_row(guard.value())?),
                None => None,
            };
            if let Some(mut node) = existing {
                node.status = status;
                node.last_seen_at = Utc::now();
                let json = encode_row(&node)?;
                table.insert(key.as_str(), json.as_str()).map_err(db_err)?;
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    // --- projects and tasks ---

    pub async fn upsert_project(&self, project: &ProjectRecord) -> Result<(), StoreError> {
        let json = encode_row(project)?;
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(PROJECTS_TABLE).map_err(db_err)?;
            table
                .insert(project.id.to_string().as_str(), json.as_str())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    pub async fn get_project(&self, id: Uuid) -> Result<Option<ProjectRecord>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(PROJECTS_TABLE).map_err(db_err)?;
        match table.get(id.to_string().as_str()).map_err(db_err)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    pub async fn upsert_task(&self, task: &TaskRecord) -> Result<(), StoreError> {
        let json = encode_row(task)?;
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(TASKS_TABLE).map_err(db_err)?;
            table
                .insert(task.id.to_string().as_str(), json.as_str())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(TASKS_TABLE).map_err(db_err)?;
        match table.get(id.to_string().as_str()).map_err(db_err)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    pub async fn tasks_for_project(&self, project_id: Uuid) -> Result<Vec<TaskRecord>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(TASKS_TABLE).map_err(db_err)?;
        let mut tasks = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let task: TaskRecord = decode_row(v.value())?;
            if task.project_id == project_id {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    // --- attempt shadows ---

    pub async fn upsert_attempt(&self, attempt: &AttemptRecord) -> Result<(), StoreError> {
        let json = encode_row(attempt)?;
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
            table
                .insert(attempt.id.to_string().as_str(), json.as_str())
                .map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    pub async fn get_attempt(&self, id: Uuid) -> Result<Option<AttemptRecord>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
        match table.get(id.to_string().as_str()).map_err(db_err)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn attempts_matching<F>(&self, mut pred: F) -> Result<Vec<AttemptRecord>, StoreError>
    where
        F: FnMut(&AttemptRecord) -> bool,
    {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
        let mut attempts = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let attempt: AttemptRecord = decode_row(v.value())?;
            if pred(&attempt) {
                attempts.push(attempt);
            }
        }
        Ok(attempts)
    }

    pub async fn attempts_for_node(&self, node_id: Uuid) -> Result<Vec<AttemptRecord>, StoreError> {
        self.attempts_matching(|a| a.node_id == node_id).await
    }

    pub async fn attempts_for_task(&self, task_id: Uuid) -> Result<Vec<AttemptRecord>, StoreError> {
        self.attempts_matching(|a| a.task_id == task_id).await
    }

    /// Ids of the node's attempts currently eligible for a backfill trigger.
    pub async fn partial_attempts_for_node(&self, node_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .attempts_matching(|a| a.node_id == node_id && a.sync_state == SyncState::Partial)
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect())
    }

    /// All attempts with an outstanding backfill request.
    pub async fn pending_attempts(&self) -> Result<Vec<AttemptRecord>, StoreError> {
        self.attempts_matching(|a| a.sync_state == SyncState::PendingBackfill)
            .await
    }

    /// Attempts whose persisted request id matches. This is the recovery path
    /// after tracker-state loss: a response can be honored without an
    /// in-memory record as long as the persisted id still matches.
    pub async fn attempts_pending_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .attempts_matching(|a| a.backfill_request_id == Some(request_id))
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect())
    }

    /// Mark attempts as pending backfill, storing the request id so responses
    /// can be correlated even if the in-memory tracker state is lost.
    ///
    /// Only rows currently `Partial` are updated; returns how many were.
    pub async fn mark_pending_backfill(
        &self,
        ids: &[Uuid],
        request_id: Uuid,
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        let mut updated = 0;
        {
            let mut table = txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
            for id in ids {
                let key = id.to_string();
                let existing: Option<AttemptRecord> = match table.get(key.as_str()).map_err(db_err)?
                {
                    Some(guard) => Some(decode_row(guard.value())?),
                    None => None,
                };
                if let Some(mut attempt) = existing {
                    if attempt.sync_state != SyncState::Partial {
                        continue;
                    }
                    attempt.sync_state = SyncState::PendingBackfill;
                    attempt.backfill_request_id = Some(request_id);
                    attempt.sync_requested_at = Some(now);
                    let json = encode_row(&attempt)?;
                    table.insert(key.as_str(), json.as_str()).map_err(db_err)?;
                    updated += 1;
                }
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(updated)
    }

    /// Reset one attempt to `Partial`, clearing its sync request fields.
    ///
    /// Only applies to rows currently `PendingBackfill`; returns whether the
    /// row was updated.
    pub async fn reset_attempt_to_partial(&self, id: Uuid) -> Result<bool, StoreError> {
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        let mut updated = false;
        {
            let mut table = txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
            let key = id.to_string();
            let existing: Option<AttemptRecord> = match table.get(key.as_str()).map_err(db_err)? {
                Some(guard) => Some(decode_row(guard.value())?),
                None => None,
            };
            if let Some(mut attempt) = existing {
                if attempt.sync_state == SyncState::PendingBackfill {
                    attempt.sync_state = SyncState::Partial;
                    attempt.backfill_request_id = None;
                    attempt.sync_requested_at = None;
                    let json = encode_row(&attempt)?;
                    table.insert(key.as_str(), json.as_str()).map_err(db_err)?;
                    updated = true;
                }
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(updated)
    }

    /// Write a successful backfill payload and mark the attempt `Complete` in
    /// one transaction, so no reader observes `Complete` with stale data.
    ///
    /// Returns false (and writes nothing) when the attempt is missing or has
    /// been detached from sync.
    pub async fn apply_backfill(
        &self,
        attempt_id: Uuid,
        payload: &BackfillPayload,
    ) -> Result<bool, StoreError> {
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        let mut applied = false;
        {
            let mut attempts = txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
            let key = attempt_id.to_string();
            let existing: Option<AttemptRecord> = match attempts.get(key.as_str()).map_err(db_err)?
            {
                Some(guard) => Some(decode_row(guard.value())?),
                None => None,
            };
            if let Some(mut attempt) = existing {
                if attempt.sync_state.is_synced() {
                    let mut executions = txn.open_table(EXECUTIONS_TABLE).map_err(db_err)?;
                    let mut logs = txn.open_table(LOGS_TABLE).map_err(db_err)?;

                    match payload {
                        BackfillPayload::Full(full) => {
                            attempt.executor = full.attempt.executor.clone();
                            attempt.branch = full.attempt.branch.clone();
                            attempt.updated_at = full.attempt.updated_at;
                            for exec in &full.executions {
                                let ekey = format!("{}:{}", attempt_id, exec.id);
                                let json = encode_row(exec)?;
                                executions
                                    .insert(ekey.as_str(), json.as_str())
                                    .map_err(db_err)?;
                            }
                            for entry in &full.logs {
                                let lkey = log_key(attempt_id, entry.entry_id);
                                let json = encode_row(entry)?;
                                logs.insert(lkey.as_str(), json.as_str()).map_err(db_err)?;
                            }
                        }
                        BackfillPayload::Executions { executions: execs } => {
                            for exec in execs {
                                let ekey = format!("{}:{}", attempt_id, exec.id);
                                let json = encode_row(exec)?;
                                executions
                                    .insert(ekey.as_str(), json.as_str())
                                    .map_err(db_err)?;
                            }
                        }
                        BackfillPayload::Logs { entries } => {
                            for entry in entries {
                                let lkey = log_key(attempt_id, entry.entry_id);
                                let json = encode_row(entry)?;
                                logs.insert(lkey.as_str(), json.as_str()).map_err(db_err)?;
                            }
                        }
                    }

                    attempt.sync_state = SyncState::Complete;
                    attempt.backfill_request_id = None;
                    attempt.sync_requested_at = None;
                    attempt.last_synced_at = Some(Utc::now());
                    let json = encode_row(&attempt)?;
                    attempts
                        .insert(key.as_str(), json.as_str())
                        .map_err(db_err)?;
                    applied = true;
                }
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(applied)
    }

    /// Apply a live-streamed attempt envelope with last-writer-wins by
    /// `updated_at`. A strictly newer mutation demotes a `Complete` shadow
    /// back to `Partial`; an older write is dropped.
    pub async fn apply_attempt_sync(
        &self,
        snapshot: &crate::model::AttemptSnapshot,
    ) -> Result<(), StoreError> {
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
            let key = snapshot.id.to_string();
            let existing: Option<AttemptRecord> = match table.get(key.as_str()).map_err(db_err)? {
                Some(guard) => Some(decode_row(guard.value())?),
                None => None,
            };
            let row = match existing {
                Some(mut attempt) => {
                    // Last writer wins; older envelopes and detached rows are
                    // left alone.
                    if snapshot.updated_at <= attempt.updated_at
                        || !attempt.sync_state.is_synced()
                    {
                        None
                    } else {
                        attempt.executor = snapshot.executor.clone();
                        attempt.branch = snapshot.branch.clone();
                        attempt.updated_at = snapshot.updated_at;
                        if attempt.sync_state == SyncState::Complete {
                            attempt.sync_state = SyncState::Partial;
                        }
                        Some(attempt)
                    }
                }
                None => Some(AttemptRecord {
                    id: snapshot.id,
                    task_id: snapshot.task_id,
                    node_id: snapshot.node_id,
                    executor: snapshot.executor.clone(),
                    branch: snapshot.branch.clone(),
                    sync_state: SyncState::Partial,
                    backfill_request_id: None,
                    sync_requested_at: None,
                    last_synced_at: None,
                    created_at: snapshot.created_at,
                    updated_at: snapshot.updated_at,
                }),
            };
            if let Some(row) = row {
                let json = encode_row(&row)?;
                table.insert(key.as_str(), json.as_str()).map_err(db_err)?;
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    /// Store a live-streamed execution record.
    pub async fn apply_execution_sync(&self, exec: &ExecutionSnapshot) -> Result<(), StoreError> {
        let json = encode_row(exec)?;
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(EXECUTIONS_TABLE).map_err(db_err)?;
            let key = format!("{}:{}", exec.attempt_id, exec.id);
            table.insert(key.as_str(), json.as_str()).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    /// Store a live-streamed batch of log entries.
    pub async fn apply_logs_batch(
        &self,
        attempt_id: Uuid,
        entries: &[LogEntrySnapshot],
    ) -> Result<(), StoreError> {
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(LOGS_TABLE).map_err(db_err)?;
            for entry in entries {
                let key = log_key(attempt_id, entry.entry_id);
                let json = encode_row(entry)?;
                table.insert(key.as_str(), json.as_str()).map_err(db_err)?;
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    pub async fn executions_for_attempt(
        &self,
        attempt_id: Uuid,
    ) -> Result<Vec<ExecutionSnapshot>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(EXECUTIONS_TABLE).map_err(db_err)?;
        let (start, end) = prefix_range(attempt_id);
        let mut execs = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(db_err)?
        {
            let (_, v) = entry.map_err(db_err)?;
            execs.push(decode_row(v.value())?);
        }
        Ok(execs)
    }

    pub async fn logs_for_attempt(
        &self,
        attempt_id: Uuid,
    ) -> Result<Vec<LogEntrySnapshot>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(LOGS_TABLE).map_err(db_err)?;
        let (start, end) = prefix_range(attempt_id);
        let mut entries = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(db_err)?
        {
            let (_, v) = entry.map_err(db_err)?;
            entries.push(decode_row(v.value())?);
        }
        Ok(entries)
    }

    /// Transactional unlink-and-reset for a project.
    ///
    /// In one write transaction: clear the project's link id, clear every
    /// affected task's shared-task id, and move every attempt under those
    /// tasks to the neutral `LocalOnly` status with all sync fields cleared.
    pub async fn unlink_project(&self, project_id: Uuid) -> Result<UnlinkSummary, StoreError> {
        let db = self.db.write().await;
        let txn = db.begin_write().map_err(db_err)?;
        let mut tasks_unlinked = 0;
        let mut attempts_reset = 0;
        {
            let mut projects = txn.open_table(PROJECTS_TABLE).map_err(db_err)?;
            let mut tasks = txn.open_table(TASKS_TABLE).map_err(db_err)?;
            let mut attempts = txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;

            let pkey = project_id.to_string();
            let project: Option<ProjectRecord> = match projects.get(pkey.as_str()).map_err(db_err)?
            {
                Some(guard) => Some(decode_row(guard.value())?),
                None => None,
            };
            if let Some(mut project) = project {
                project.link_id = None;
                let json = encode_row(&project)?;
                projects
                    .insert(pkey.as_str(), json.as_str())
                    .map_err(db_err)?;
            }

            // Collect the project's tasks, then rewrite them.
            let mut project_tasks: Vec<TaskRecord> = Vec::new();
            for entry in tasks.iter().map_err(db_err)? {
                let (_, v) = entry.map_err(db_err)?;
                let task: TaskRecord = decode_row(v.value())?;
                if task.project_id == project_id {
                    project_tasks.push(task);
                }
            }
            let task_ids: Vec<Uuid> = project_tasks.iter().map(|t| t.id).collect();
            for mut task in project_tasks {
                if task.shared_task_id.take().is_some() {
                    tasks_unlinked += 1;
                }
                let json = encode_row(&task)?;
                tasks
                    .insert(task.id.to_string().as_str(), json.as_str())
                    .map_err(db_err)?;
            }

            // Reset every attempt under those tasks.
            let mut project_attempts: Vec<AttemptRecord> = Vec::new();
            for entry in attempts.iter().map_err(db_err)? {
                let (_, v) = entry.map_err(db_err)?;
                let attempt: AttemptRecord = decode_row(v.value())?;
                if task_ids.contains(&attempt.task_id) {
                    project_attempts.push(attempt);
                }
            }
            for mut attempt in project_attempts {
                if attempt.sync_state != SyncState::LocalOnly {
                    attempts_reset += 1;
                }
                attempt.sync_state = SyncState::LocalOnly;
                attempt.backfill_request_id = None;
                attempt.sync_requested_at = None;
                attempt.last_synced_at = None;
                let json = encode_row(&attempt)?;
                attempts
                    .insert(attempt.id.to_string().as_str(), json.as_str())
                    .map_err(db_err)?;
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(UnlinkSummary {
            tasks_unlinked,
            attempts_reset,
        })
    }
}
