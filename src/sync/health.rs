//! Read-only sync health diagnostics.
//!
//! Surfaces inconsistencies an operator should know about: tasks or attempts
//! left attached to sync after their project was unlinked, and attempt rows
//! that violate the pending/request-id pairing. Evaluation never mutates
//! anything; repair goes through the unlink and reconciliation paths.

use crate::store::{HiveStore, StoreError};
use crate::sync::SyncState;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Health report for one project's sync state.
#[derive(Debug, Clone, Serialize)]
pub struct SyncHealthReport {
    pub project_id: Uuid,
    pub is_linked: bool,
    /// Total orphaned tasks plus orphaned attempts.
    pub orphaned_count: usize,
    pub has_issues: bool,
    /// Tasks still carrying a shared-task id in an unlinked project.
    pub orphaned_tasks: Vec<Uuid>,
    /// Attempts still attached to sync in an unlinked project.
    pub orphaned_attempts: Vec<Uuid>,
    /// Human-readable issue descriptions, one per finding.
    pub issues: Vec<String>,
}

impl SyncHealthReport {
    pub fn healthy(&self) -> bool {
        !self.has_issues
    }
}

/// Evaluates sync health for a project.
pub struct SyncHealthEvaluator {
    store: Arc<HiveStore>,
}

impl SyncHealthEvaluator {
    pub fn new(store: Arc<HiveStore>) -> Self {
        Self { store }
    }

    /// Build the report, or `None` if the project does not exist.
    pub async fn evaluate(
        &self,
        project_id: Uuid,
    ) -> Result<Option<SyncHealthReport>, StoreError> {
        let Some(project) = self.store.get_project(project_id).await? else {
            return Ok(None);
        };
        let is_linked = project.link_id.is_some();

        let tasks = self.store.tasks_for_project(project_id).await?;
        let mut report = SyncHealthReport {
            project_id,
            is_linked,
            orphaned_count: 0,
            has_issues: false,
            orphaned_tasks: Vec::new(),
            orphaned_attempts: Vec::new(),
            issues: Vec::new(),
        };

        for task in &tasks {
            if !is_linked && task.shared_task_id.is_some() {
                report.orphaned_tasks.push(task.id);
                report
                    .issues
                    .push(format!("task {} is shared but its project is unlinked", task.id));
            }

            let attempts = self.store.attempts_for_task(task.id).await?;
            for attempt in attempts {
                if !is_linked && attempt.sync_state.is_synced() {
                    report.orphaned_attempts.push(attempt.id);
                    report.issues.push(format!(
                        "attempt {} is {} but its project is unlinked",
                        attempt.id, attempt.sync_state
                    ));
                }
                // The pending state and the persisted request id travel
                // together.
                let pending = attempt.sync_state == SyncState::PendingBackfill;
                if pending != attempt.backfill_request_id.is_some() {
                    report.issues.push(format!(
                        "attempt {} is {} but its backfill request id is {}",
                        attempt.id,
                        attempt.sync_state,
                        if attempt.backfill_request_id.is_some() {
                            "set"
                        } else {
                            "missing"
                        }
                    ));
                }
            }
        }

        report.orphaned_count = report.orphaned_tasks.len() + report.orphaned_attempts.len();
        report.has_issues = !report.issues.is_empty();
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_report_serializes_summary_fields() {
        let report = SyncHealthReport {
            project_id: Uuid::new_v4(),
            is_linked: false,
            orphaned_count: 2,
            has_issues: true,
            orphaned_tasks: vec![Uuid::new_v4()],
            orphaned_attempts: vec![Uuid::new_v4()],
            issues: vec!["task orphaned".into(), "attempt orphaned".into()],
        };
        let json: Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["has_issues"], true);
        assert_eq!(json["orphaned_count"], 2);
        assert_eq!(json["is_linked"], false);
        assert!(!report.healthy());
    }
}
