//! WebSocket session handling for node connections.
//!
//! A node connects to `/ws/nodes`, authenticating with its id and token.
//! The session registers an outbound handle in the connection registry
//! (superseding any prior socket for the same node), fires the reconnect
//! backfill trigger, then pumps frames until close, timeout, or error.

use super::connection::NodeConnection;
use super::protocol::{self, NodeFrame};
use crate::store::HiveStore;
use crate::sync::registry::{NodeConnectionRegistry, NodeHandle, Outgoing};
use crate::sync::service::BackfillService;
use crate::sync::SyncConfig;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Keep-alive ping interval (30 seconds)
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for considering a connection dead (90 seconds = 3 missed pings)
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(90);

/// State shared across node sync sessions.
#[derive(Clone)]
pub struct WsState {
    pub store: Arc<HiveStore>,
    pub registry: Arc<NodeConnectionRegistry>,
    pub service: Arc<BackfillService>,
    pub config: SyncConfig,
}

/// Router for the node sync endpoint.
pub fn ws_router(state: WsState) -> Router {
    Router::new()
        .route("/ws/nodes", get(ws_handler))
        .with_state(state)
}

/// Handle a node's WebSocket upgrade request.
///
/// Auth: `x-node-id` names the node, `Authorization: Bearer <token>` carries
/// its registration secret.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    let node_id = headers
        .get("x-node-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let node = state
        .store
        .authenticate_node(node_id, token)
        .await
        .map_err(|e| {
            error!(%node_id, "auth lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    info!(node_id = %node.id, name = %node.name, "node sync upgrade request");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, node_id)))
}

/// Handle an established node sync connection.
async fn handle_socket(mut socket: WebSocket, state: WsState, node_id: Uuid) {
    // Bounded channel for outgoing frames (backpressure).
    let (tx, mut rx) = mpsc::channel::<Outgoing>(256);

    let mut conn = NodeConnection::new(node_id);
    let conn_id = conn.id;
    info!(%conn_id, %node_id, "node connected");

    // Register, superseding any prior socket for this node.
    if let Some(old) = state
        .registry
        .register(node_id, NodeHandle::new(conn_id, tx))
        .await
    {
        debug!(%node_id, old_conn = %old.connection_id, "superseding prior connection");
        old.try_send(Outgoing::Close);
    }

    if let Err(e) = state
        .store
        .set_node_status(node_id, crate::model::NodeStatus::Online)
        .await
    {
        warn!(%node_id, "failed to mark node online: {}", e);
    }

    // Reconnect trigger: detached, so a slow store never blocks the session.
    state.service.spawn_reconnect_backfill(node_id);

    let mut ping_interval = interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Outgoing frames queued by the registry
            Some(msg) = rx.recv() => {
                let ws_msg = match msg {
                    Outgoing::Frame(frame) => Message::Text(protocol::encode(&frame)),
                    Outgoing::Close => {
                        let _ = socket.close().await;
                        break;
                    }
                };
                if let Err(e) = socket.send(ws_msg).await {
                    debug!(%conn_id, "failed to send frame: {}", e);
                    break;
                }
            }

            // Keep-alive ping
            _ = ping_interval.tick() => {
                if conn.last_activity.elapsed() > CONNECTION_TIMEOUT {
                    warn!(%conn_id, "connection timed out (no activity for {:?})", CONNECTION_TIMEOUT);
                    let _ = socket.close().await;
                    break;
                }
                if let Err(e) = socket.send(Message::Ping(vec![])).await {
                    debug!(%conn_id, "failed to send ping: {}", e);
                    break;
                }
            }

            // Incoming frames
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        conn.touch();
                        if let Err(e) = handle_node_frame(&state, node_id, &text).await {
                            warn!(%conn_id, "error handling frame: {}", e);
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        conn.touch();
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(%conn_id, "node initiated close");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Protocol is JSON text frames only.
                        warn!(%conn_id, "unexpected binary frame");
                    }
                    Some(Err(e)) => {
                        error!(%conn_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(%conn_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    info!(%conn_id, %node_id, "node disconnected");
    // A superseded session must not tear down the newer connection.
    if state.registry.unregister(node_id, conn_id).await {
        if let Err(e) = state.service.handle_disconnect(node_id).await {
            warn!(%node_id, "disconnect cleanup failed: {}", e);
        }
    }
}

/// Dispatch one inbound frame from a node.
async fn handle_node_frame(state: &WsState, node_id: Uuid, text: &str) -> Result<(), String> {
    let frame =
        protocol::decode_node_frame(text, state.config.max_frame_bytes).map_err(|e| e.to_string())?;
    match frame {
        NodeFrame::BackfillResponse {
            request_id,
            results,
        } => state
            .service
            .handle_response(node_id, request_id, &results)
            .await
            .map_err(|e| e.to_string()),
        NodeFrame::AttemptSync { attempt } => {
            if attempt.node_id != node_id {
                return Err(format!(
                    "attempt {} belongs to node {}, not the sender",
                    attempt.id, attempt.node_id
                ));
            }
            state
                .store
                .apply_attempt_sync(&attempt)
                .await
                .map_err(|e| e.to_string())
        }
        NodeFrame::ExecutionSync { execution } => {
            check_attempt_owner(state, execution.attempt_id, node_id).await?;
            state
                .store
                .apply_execution_sync(&execution)
                .await
                .map_err(|e| e.to_string())
        }
        NodeFrame::LogsBatch {
            attempt_id,
            entries,
        } => {
            check_attempt_owner(state, attempt_id, node_id).await?;
            state
                .store
                .apply_logs_batch(attempt_id, &entries)
                .await
                .map_err(|e| e.to_string())
        }
    }
}

/// Reject frames touching an attempt the sender does not own. An attempt the
/// hive has not seen yet passes; its envelopes arrive in any order.
async fn check_attempt_owner(
    state: &WsState,
    attempt_id: Uuid,
    node_id: Uuid,
) -> Result<(), String> {
    match state
        .store
        .get_attempt(attempt_id)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(attempt) if attempt.node_id != node_id => Err(format!(
            "attempt {} belongs to node {}, not the sender",
            attempt_id, attempt.node_id
        )),
        _ => Ok(()),
    }
}
