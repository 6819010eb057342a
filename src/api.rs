//! Operator-facing HTTP API.
//!
//! Read paths return whatever the hive currently holds; a read that finds a
//! `Partial` attempt fires the on-demand backfill trigger in the background
//! rather than blocking the response.

use crate::model::{NodeSummary, NodeStatus};
use crate::store::{HiveStore, StoreError};
use crate::sync::health::SyncHealthEvaluator;
use crate::sync::registry::NodeConnectionRegistry;
use crate::sync::service::BackfillService;
use crate::ws::protocol::HiveFrame;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// State shared across API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<HiveStore>,
    pub registry: Arc<NodeConnectionRegistry>,
    pub service: Arc<BackfillService>,
}

/// Error from API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Router for the operator API.
pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/nodes", get(list_nodes))
        .route("/attempts/:id", get(get_attempt))
        .route("/projects/:id/sync-health", get(project_sync_health))
        .route("/projects/:id/unlink", post(unlink_project))
        .with_state(state)
}

async fn list_nodes(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let mut nodes = state.store.list_nodes().await?;
    // Connection registry is the liveness truth; the stored status can lag.
    for node in &mut nodes {
        if state.registry.is_online(node.id).await {
            node.status = NodeStatus::Online;
        }
    }
    let summaries: Vec<NodeSummary> = nodes.iter().map(NodeSummary::from).collect();
    Ok(Json(summaries))
}

#[derive(Debug, Serialize)]
struct AttemptView {
    attempt: crate::model::AttemptRecord,
    executions: Vec<crate::model::ExecutionSnapshot>,
    logs: Vec<crate::model::LogEntrySnapshot>,
}

/// Return the hive's current copy of an attempt. A `Partial` attempt also
/// fires the on-demand backfill trigger in the background.
async fn get_attempt(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let attempt = state.store.get_attempt(id).await?.ok_or(ApiError::NotFound)?;
    if attempt.sync_state.is_backfill_eligible() {
        debug!(attempt_id = %id, "partial read, firing on-demand backfill");
        state.service.spawn_on_demand_backfill(id);
    }
    let executions = state.store.executions_for_attempt(id).await?;
    let logs = state.store.logs_for_attempt(id).await?;
    Ok(Json(AttemptView {
        attempt,
        executions,
        logs,
    }))
}

async fn project_sync_health(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let evaluator = SyncHealthEvaluator::new(state.store.clone());
    let report = evaluator.evaluate(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
struct UnlinkRequest {
    /// Whether to tell the owning nodes their project was unlinked.
    #[serde(default)]
    notify_nodes: bool,
}

#[derive(Debug, Serialize)]
struct UnlinkResponse {
    tasks_unlinked: u64,
    attempts_reset: u64,
    nodes_notified: usize,
}

/// Unlink a project: one transaction clears the link and detaches every task
/// and attempt, then (optionally) the owning nodes are notified best-effort.
async fn unlink_project(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    body: Option<Json<UnlinkRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.get_project(id).await?.ok_or(ApiError::NotFound)?;
    let Json(request) = body.unwrap_or_default();

    // Owning nodes, collected before the attempts are detached.
    let mut node_ids = HashSet::new();
    for task in state.store.tasks_for_project(id).await? {
        for attempt in state.store.attempts_for_task(task.id).await? {
            node_ids.insert(attempt.node_id);
        }
    }

    let summary = state.store.unlink_project(id).await?;
    info!(
        project_id = %id,
        tasks = summary.tasks_unlinked,
        attempts = summary.attempts_reset,
        "project unlinked"
    );

    let mut nodes_notified = 0;
    if request.notify_nodes {
        for node_id in node_ids {
            // Best effort: an offline node just never hears about it.
            if state
                .registry
                .send(node_id, HiveFrame::ProjectUnlinked { project_id: id })
                .await
                .is_ok()
            {
                nodes_notified += 1;
            }
        }
    }

    Ok(Json(UnlinkResponse {
        tasks_unlinked: summary.tasks_unlinked,
        attempts_reset: summary.attempts_reset,
        nodes_notified,
    }))
}
