//! Backfill orchestration.
//!
//! The service owns the request lifecycle: pick eligible attempts, persist
//! the pending state, register the correlation record, send the request, and
//! later resolve it from the response, a disconnect, or the reconciliation
//! sweep. All three triggers (reconnect, on-demand, sweep) funnel through
//! [`BackfillService::request_backfill`], so the single-live-request rule is
//! enforced in one place.

use crate::store::{HiveStore, StoreError};
use crate::sync::registry::{NodeConnectionRegistry, RegistryError};
use crate::sync::tracker::{BackfillKind, BackfillRequestTracker, TrackerError};
use crate::sync::SyncConfig;
use crate::ws::protocol::{AttemptBackfillResult, BackfillOutcome, HiveFrame};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error from backfill orchestration.
#[derive(Debug, Error)]
pub enum BackfillServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Orchestrates backfill requests between the store, the tracker and the
/// connection registry.
pub struct BackfillService {
    store: Arc<HiveStore>,
    tracker: Arc<BackfillRequestTracker>,
    registry: Arc<NodeConnectionRegistry>,
    config: SyncConfig,
}

impl BackfillService {
    pub fn new(
        store: Arc<HiveStore>,
        tracker: Arc<BackfillRequestTracker>,
        registry: Arc<NodeConnectionRegistry>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            registry,
            config,
        }
    }

    pub fn tracker(&self) -> &Arc<BackfillRequestTracker> {
        &self.tracker
    }

    /// Issue a backfill request to a node for a set of attempts.
    ///
    /// Attempts that already have a request in flight, or that are no longer
    /// `Partial` by the time the state is persisted, are silently skipped;
    /// when nothing remains this is a no-op returning `Ok(None)`. The pending
    /// state (including the persisted request id) is written before the frame
    /// is sent, so a fast response can always be correlated. If the send
    /// fails, both the tracker record and the persisted state are rolled
    /// back.
    pub async fn request_backfill(
        &self,
        node_id: Uuid,
        attempt_ids: &[Uuid],
        kind: BackfillKind,
    ) -> Result<Option<Uuid>, BackfillServiceError> {
        let registered = match self.tracker.register(node_id, attempt_ids, kind) {
            Ok(registered) => registered,
            Err(TrackerError::EmptyAttemptSet) | Err(TrackerError::AllInFlight) => {
                // Benign: a concurrent trigger got there first.
                debug!(%node_id, "no attempts left to backfill");
                return Ok(None);
            }
        };
        let request_id = registered.request_id;

        let marked = self
            .store
            .mark_pending_backfill(&registered.attempt_ids, request_id)
            .await?;
        if marked == 0 {
            self.tracker.complete(request_id);
            debug!(%node_id, %request_id, "attempts changed state before request; dropped");
            return Ok(None);
        }

        let frame = HiveFrame::BackfillRequest {
            request_id,
            kind,
            attempt_ids: registered.attempt_ids.clone(),
        };
        if let Err(e) = self.registry.send(node_id, frame).await {
            // Roll back so the attempts stay eligible for the next trigger.
            self.tracker.complete(request_id);
            for id in &registered.attempt_ids {
                self.store.reset_attempt_to_partial(*id).await?;
            }
            debug!(%node_id, %request_id, "backfill request not delivered: {}", e);
            return Err(e.into());
        }

        info!(
            %node_id,
            %request_id,
            attempts = registered.attempt_ids.len(),
            "backfill requested"
        );
        Ok(Some(request_id))
    }

    /// Reconnect trigger: request a full backfill for everything the node
    /// owns that is still `Partial`. Detached from the session loop; failures
    /// only log, the sweep retries later.
    pub fn spawn_reconnect_backfill(self: &Arc<Self>, node_id: Uuid) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.reconnect_backfill(node_id).await {
                warn!(%node_id, "reconnect backfill failed: {}", e);
            }
        });
    }

    /// Synchronous body of the reconnect trigger.
    pub async fn reconnect_backfill(&self, node_id: Uuid) -> Result<(), BackfillServiceError> {
        let partial = self.store.partial_attempts_for_node(node_id).await?;
        if partial.is_empty() {
            return Ok(());
        }
        match self
            .request_backfill(node_id, &partial, BackfillKind::FullAttempt)
            .await
        {
            Ok(_) => Ok(()),
            // The node raced away again; the sweep picks it up on the next
            // reconnect.
            Err(BackfillServiceError::Registry(RegistryError::NodeOffline)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// On-demand trigger from the read path. Detached: the read returns the
    /// partial data it has, this fires in the background.
    pub fn spawn_on_demand_backfill(self: &Arc<Self>, attempt_id: Uuid) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.on_demand_backfill(attempt_id).await {
                warn!(%attempt_id, "on-demand backfill failed: {}", e);
            }
        });
    }

    /// Synchronous body of the on-demand trigger.
    pub async fn on_demand_backfill(&self, attempt_id: Uuid) -> Result<(), BackfillServiceError> {
        let Some(attempt) = self.store.get_attempt(attempt_id).await? else {
            return Ok(());
        };
        if !attempt.sync_state.is_backfill_eligible() {
            return Ok(());
        }
        if !self.registry.is_online(attempt.node_id).await {
            // Leave the attempt Partial; the reconnect trigger covers it.
            debug!(%attempt_id, node_id = %attempt.node_id, "node offline, on-demand backfill skipped");
            return Ok(());
        }
        match self
            .request_backfill(attempt.node_id, &[attempt_id], BackfillKind::FullAttempt)
            .await
        {
            Ok(_) | Err(BackfillServiceError::Registry(RegistryError::NodeOffline)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Resolve a backfill response from a node.
    ///
    /// The tracker record is consumed first (idempotently, and only when the
    /// sender owns it); if it is gone, the persisted request id on the
    /// attempts is the fallback, so a response can be honored even after
    /// in-memory state loss. Either path only covers attempts the sending
    /// node owns. A response matching nothing is stale and is discarded.
    pub async fn handle_response(
        &self,
        node_id: Uuid,
        request_id: Uuid,
        results: &[AttemptBackfillResult],
    ) -> Result<(), BackfillServiceError> {
        let mut expected: Vec<Uuid> = match self.tracker.complete_for_node(request_id, node_id) {
            Some(record) => record.attempt_ids,
            None => {
                let mut owned = Vec::new();
                for id in self.store.attempts_pending_request(request_id).await? {
                    match self.store.get_attempt(id).await? {
                        Some(attempt) if attempt.node_id == node_id => owned.push(id),
                        _ => {}
                    }
                }
                owned
            }
        };
        if expected.is_empty() {
            debug!(%node_id, %request_id, "stale backfill response discarded");
            return Ok(());
        }

        for result in results {
            let Some(pos) = expected.iter().position(|id| *id == result.attempt_id) else {
                debug!(%request_id, attempt_id = %result.attempt_id, "unexpected attempt in response");
                continue;
            };
            expected.swap_remove(pos);

            match &result.outcome {
                BackfillOutcome::Ok { payload } => {
                    let applied = self.store.apply_backfill(result.attempt_id, payload).await?;
                    if applied {
                        info!(attempt_id = %result.attempt_id, %request_id, "backfill applied");
                    } else {
                        debug!(attempt_id = %result.attempt_id, "attempt detached before backfill applied");
                    }
                }
                BackfillOutcome::Err { reason } => {
                    warn!(attempt_id = %result.attempt_id, %reason, "node refused backfill");
                    self.store.reset_attempt_to_partial(result.attempt_id).await?;
                }
            }
        }

        // Attempts the response did not cover must not stay pending forever.
        for id in expected {
            self.store.reset_attempt_to_partial(id).await?;
        }
        Ok(())
    }

    /// Node disconnect: abandon its outstanding requests so the attempts are
    /// retry-eligible on the next reconnect, and mark the node offline.
    pub async fn handle_disconnect(&self, node_id: Uuid) -> Result<(), BackfillServiceError> {
        let abandoned = self.tracker.cleanup_for_node(node_id);
        for id in &abandoned {
            self.store.reset_attempt_to_partial(*id).await?;
        }
        if !abandoned.is_empty() {
            info!(%node_id, attempts = abandoned.len(), "abandoned in-flight backfills on disconnect");
        }
        self.store
            .set_node_status(node_id, crate::model::NodeStatus::Offline)
            .await?;
        Ok(())
    }

    /// One reconciliation pass: expire requests past the deadline, and repair
    /// pending attempts whose tracker record is gone or whose node is
    /// offline.
    pub async fn reconcile_once(&self) -> Result<(), BackfillServiceError> {
        let expired = self.tracker.expire_older_than(self.config.backfill_timeout);
        for id in &expired {
            self.store.reset_attempt_to_partial(*id).await?;
        }
        if !expired.is_empty() {
            info!(attempts = expired.len(), "expired unanswered backfill requests");
        }

        let deadline = chrono::Duration::from_std(self.config.backfill_timeout)
            .unwrap_or_else(|_| chrono::Duration::max_value());
        for attempt in self.store.pending_attempts().await? {
            let timed_out = attempt
                .sync_requested_at
                .map(|at| Utc::now() - at >= deadline)
                .unwrap_or(true);
            let node_online = self.registry.is_online(attempt.node_id).await;
            if timed_out || !node_online {
                if self.store.reset_attempt_to_partial(attempt.id).await? {
                    debug!(attempt_id = %attempt.id, timed_out, node_online, "reconciled stuck pending attempt");
                }
            }
        }
        Ok(())
    }

    /// Periodic reconciliation sweep. A failed pass logs and waits for the
    /// next tick.
    pub fn spawn_reconciler(self: &Arc<Self>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.config.reconcile_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = service.reconcile_once().await {
                    warn!("reconciliation pass failed: {}", e);
                }
            }
        })
    }
}
