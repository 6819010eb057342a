//! Node-side durable store.
//!
//! Nodes are authoritative for their own attempts, executions and logs; the
//! backfill responder reads from here. Layout mirrors the hive store: JSON
//! rows in redb tables, with per-attempt key prefixes for range scans.

use crate::model::{ExecutionSnapshot, LocalAttempt, LogEntrySnapshot};
use crate::store::StoreError;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const ATTEMPTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("local_attempts");
const EXECUTIONS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("local_executions");
const LOGS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("local_logs");

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

/// Store of a node's own attempts, executions and logs.
pub struct NodeStore {
    db: Arc<RwLock<Database>>,
}

impl NodeStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(db_err)?;
        {
            let txn = db.begin_write().map_err(db_err)?;
            txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
            txn.open_table(EXECUTIONS_TABLE).map_err(db_err)?;
            txn.open_table(LOGS_TABLE).map_err(db_err)?;
            txn.commit().map_err(db_err)?;
        }
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    pub async fn upsert_attempt(&self, attempt: &LocalAttempt) -> Result<(), StoreError> {
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

    pub async fn get_attempt(&self, id: Uuid) -> Result<Option<LocalAttempt>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(ATTEMPTS_TABLE).map_err(db_err)?;
        match table.get(id.to_string().as_str()).map_err(db_err)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    pub async fn insert_execution(&self, exec: &ExecutionSnapshot) -> Result<(), StoreError> {
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

    pub async fn executions_for_attempt(
        &self,
        attempt_id: Uuid,
    ) -> Result<Vec<ExecutionSnapshot>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(EXECUTIONS_TABLE).map_err(db_err)?;
        let start = format!("{}:", attempt_id);
        let end = format!("{};", attempt_id);
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

    pub async fn append_logs(
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

    /// Log entries with `entry_id` strictly greater than the cursor, in
    /// cursor order.
    pub async fn logs_after(
        &self,
        attempt_id: Uuid,
        since: i64,
    ) -> Result<Vec<LogEntrySnapshot>, StoreError> {
        let db = self.db.read().await;
        let txn = db.begin_read().map_err(db_err)?;
        let table = txn.open_table(LOGS_TABLE).map_err(db_err)?;
        let start = log_key(attempt_id, since.saturating_add(1));
        let end = format!("{};", attempt_id);
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store() -> (NodeStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = NodeStore::new(dir.path().join("node.redb")).unwrap();
        (store, dir)
    }

    fn entry(id: i64) -> LogEntrySnapshot {
        LogEntrySnapshot {
            entry_id: id,
            execution_id: Uuid::new_v4(),
            content: format!("line {}", id),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_logs_after_is_strictly_greater() {
        let (store, _dir) = store();
        let attempt = Uuid::new_v4();
        let entries: Vec<_> = (0..5).map(entry).collect();
        store.append_logs(attempt, &entries).await.unwrap();

        let tail = store.logs_after(attempt, 2).await.unwrap();
        let ids: Vec<i64> = tail.iter().map(|e| e.entry_id).collect();
        assert_eq!(ids, vec![3, 4]);

        // Cursor at the tip returns nothing.
        assert!(store.logs_after(attempt, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logs_are_scoped_per_attempt() {
        let (store, _dir) = store();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append_logs(a, &[entry(1), entry(2)]).await.unwrap();
        store.append_logs(b, &[entry(1)]).await.unwrap();

        assert_eq!(store.logs_after(a, 0).await.unwrap().len(), 2);
        assert_eq!(store.logs_after(b, 0).await.unwrap().len(), 1);
    }
}
