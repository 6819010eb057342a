//! Node-side backfill responder.
//!
//! Assembles exactly one `BackfillResponse` for every `BackfillRequest`,
//! whatever happens per attempt: missing and unlinked attempts get explicit
//! per-attempt errors rather than being silently dropped, so the hive can
//! resolve its outstanding request either way.

use crate::model::AttemptBackfill;
use crate::node_store::NodeStore;
use crate::store::StoreError;
use crate::sync::BackfillKind;
use crate::ws::protocol::{
    AttemptBackfillResult, BackfillErrorReason, BackfillOutcome, BackfillPayload, NodeFrame,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Builds backfill responses from the node's own store.
#[derive(Clone)]
pub struct NodeBackfillResponder {
    store: Arc<NodeStore>,
}

impl NodeBackfillResponder {
    pub fn new(store: Arc<NodeStore>) -> Self {
        Self { store }
    }

    /// Assemble the response on a detached task and queue it on the outgoing
    /// channel, so a slow store read never stalls the caller's frame loop.
    /// Assembly errors log and drop the response; the hive's sweep retries.
    pub fn spawn_respond(
        &self,
        request_id: Uuid,
        kind: BackfillKind,
        attempt_ids: Vec<Uuid>,
        out: mpsc::Sender<NodeFrame>,
    ) {
        let responder = self.clone();
        tokio::spawn(async move {
            match responder.respond(request_id, kind, &attempt_ids).await {
                Ok(frame) => {
                    if out.send(frame).await.is_err() {
                        debug!(%request_id, "connection gone before backfill response was queued");
                    }
                }
                Err(e) => {
                    warn!(%request_id, "failed to assemble backfill response: {}", e);
                }
            }
        });
    }

    /// Build the single response frame for a backfill request.
    pub async fn respond(
        &self,
        request_id: Uuid,
        kind: BackfillKind,
        attempt_ids: &[Uuid],
    ) -> Result<NodeFrame, StoreError> {
        let mut results = Vec::with_capacity(attempt_ids.len());
        for &attempt_id in attempt_ids {
            let outcome = self.outcome_for(attempt_id, kind).await?;
            if let BackfillOutcome::Err { reason } = &outcome {
                debug!(%attempt_id, %reason, "backfill attempt refused");
            }
            results.push(AttemptBackfillResult {
                attempt_id,
                outcome,
            });
        }
        Ok(NodeFrame::BackfillResponse {
            request_id,
            results,
        })
    }

    async fn outcome_for(
        &self,
        attempt_id: Uuid,
        kind: BackfillKind,
    ) -> Result<BackfillOutcome, StoreError> {
        let attempt = match self.store.get_attempt(attempt_id).await? {
            Some(attempt) => attempt,
            None => {
                return Ok(BackfillOutcome::Err {
                    reason: BackfillErrorReason::AttemptNotFound,
                })
            }
        };
        let shared_task_id = match attempt.shared_task_id {
            Some(id) => id,
            None => {
                return Ok(BackfillOutcome::Err {
                    reason: BackfillErrorReason::NotLinked,
                })
            }
        };

        let payload = match kind {
            BackfillKind::FullAttempt => {
                let executions = self.store.executions_for_attempt(attempt_id).await?;
                let logs = self.store.logs_after(attempt_id, -1).await?;
                BackfillPayload::Full(AttemptBackfill {
                    attempt: attempt.snapshot(shared_task_id),
                    executions,
                    logs,
                })
            }
            BackfillKind::Executions => BackfillPayload::Executions {
                executions: self.store.executions_for_attempt(attempt_id).await?,
            },
            BackfillKind::Logs { since } => BackfillPayload::Logs {
                entries: self.store.logs_after(attempt_id, since).await?,
            },
        };
        Ok(BackfillOutcome::Ok { payload })
    }
}
