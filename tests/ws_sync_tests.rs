//! End-to-end tests over real WebSocket connections: a spawned server, a
//! tungstenite client playing the node, and the HTTP API as the observer.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use hive_sync::model::{
    AttemptBackfill, AttemptRecord, AttemptSnapshot, ExecutionSnapshot, ExecutionStatus,
    LogEntrySnapshot, NodeRecord, NodeStatus, ProjectRecord, TaskRecord,
};
use hive_sync::store::HiveStore;
use hive_sync::sync::{SyncConfig, SyncState};
use hive_sync::ws::protocol::{
    self, AttemptBackfillResult, BackfillOutcome, BackfillPayload, HiveFrame, NodeFrame,
};
use hive_sync::{create_router_with_config, RouterConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

const TIMEOUT: Duration = Duration::from_secs(5);
const NODE_TOKEN: &str = "node-secret";

/// Start a test server over the given store and return its address.
async fn start_test_server(store: Arc<HiveStore>) -> SocketAddr {
    let app = create_router_with_config(RouterConfig {
        store,
        sync: SyncConfig::default(),
    })
    .await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    addr
}

fn new_store() -> (Arc<HiveStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(HiveStore::new(dir.path().join("hive.redb")).unwrap());
    (store, dir)
}

async fn seed_node(store: &HiveStore) -> Uuid {
    let node = NodeRecord {
        id: Uuid::new_v4(),
        name: "worker-1".into(),
        status: NodeStatus::Offline,
        last_seen_at: Utc::now(),
        token: NODE_TOKEN.into(),
    };
    store.upsert_node(&node).await.unwrap();
    node.id
}

async fn seed_linked_attempt(store: &HiveStore, node_id: Uuid, state: SyncState) -> AttemptRecord {
    let project = ProjectRecord {
        id: Uuid::new_v4(),
        name: "proj".into(),
        link_id: Some(Uuid::new_v4()),
    };
    store.upsert_project(&project).await.unwrap();
    let task = TaskRecord {
        id: Uuid::new_v4(),
        project_id: project.id,
        title: "task".into(),
        shared_task_id: Some(Uuid::new_v4()),
    };
    store.upsert_task(&task).await.unwrap();
    let attempt = AttemptRecord {
        id: Uuid::new_v4(),
        task_id: task.id,
        node_id,
        executor: "claude".into(),
        branch: "attempt/1".into(),
        sync_state: state,
        backfill_request_id: None,
        sync_requested_at: None,
        last_synced_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.upsert_attempt(&attempt).await.unwrap();
    attempt
}

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Connect as a node with proper auth headers.
async fn connect_node(addr: &SocketAddr, node_id: Uuid, token: &str) -> WsClient {
    let mut request = format!("ws://{}/ws/nodes", addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("x-node-id", node_id.to_string().parse().unwrap());
    request
        .headers_mut()
        .insert("authorization", format!("Bearer {}", token).parse().unwrap());
    let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    ws
}

/// Receive the next text frame, skipping pings, with a timeout.
async fn recv_hive_frame(ws: &mut WsClient) -> HiveFrame {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => {
                return protocol::decode_hive_frame(&text, protocol::DEFAULT_MAX_FRAME_BYTES)
                    .unwrap()
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

async fn send_node_frame(ws: &mut WsClient, frame: &NodeFrame) {
    ws.send(Message::Text(protocol::encode(frame))).await.unwrap();
}

/// Poll the attempt read endpoint until its sync state matches.
async fn wait_for_sync_state(
    addr: &SocketAddr,
    attempt_id: Uuid,
    expected: &str,
) -> serde_json::Value {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        let response = client
            .get(format!("http://{}/attempts/{}", addr, attempt_id))
            .send()
            .await
            .unwrap();
        let json: serde_json::Value = response.json().await.unwrap();
        if json["attempt"]["sync_state"] == expected {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("attempt {} never reached state {}", attempt_id, expected);
}

fn full_response(request_id: Uuid, attempt: &AttemptRecord) -> NodeFrame {
    let exec = ExecutionSnapshot {
        id: Uuid::new_v4(),
        attempt_id: attempt.id,
        status: ExecutionStatus::Completed,
        started_at: Utc::now(),
        completed_at: Some(Utc::now()),
    };
    let logs: Vec<LogEntrySnapshot> = (0..4)
        .map(|i| LogEntrySnapshot {
            entry_id: i,
            execution_id: exec.id,
            content: format!("line {}", i),
            timestamp: Utc::now(),
        })
        .collect();
    NodeFrame::BackfillResponse {
        request_id,
        results: vec![AttemptBackfillResult {
            attempt_id: attempt.id,
            outcome: BackfillOutcome::Ok {
                payload: BackfillPayload::Full(AttemptBackfill {
                    attempt: AttemptSnapshot {
                        id: attempt.id,
                        task_id: attempt.task_id,
                        node_id: attempt.node_id,
                        executor: attempt.executor.clone(),
                        branch: attempt.branch.clone(),
                        created_at: attempt.created_at,
                        updated_at: attempt.updated_at,
                    },
                    executions: vec![exec],
                    logs,
                }),
            },
        }],
    }
}

#[tokio::test]
async fn test_bad_token_is_rejected() {
    let (store, _dir) = new_store();
    let node_id = seed_node(&store).await;
    let addr = start_test_server(store).await;

    let mut request = format!("ws://{}/ws/nodes", addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("x-node-id", node_id.to_string().parse().unwrap());
    request
        .headers_mut()
        .insert("authorization", "Bearer wrong".parse().unwrap());
    assert!(tokio_tungstenite::connect_async(request).await.is_err());
}

#[tokio::test]
async fn test_reconnect_backfill_round_trip() {
    let (store, _dir) = new_store();
    let node_id = seed_node(&store).await;
    let attempt = seed_linked_attempt(&store, node_id, SyncState::Partial).await;
    let addr = start_test_server(store).await;

    let mut ws = connect_node(&addr, node_id, NODE_TOKEN).await;

    // Connecting with a partial attempt provokes a backfill request.
    let HiveFrame::BackfillRequest {
        request_id,
        attempt_ids,
        ..
    } = recv_hive_frame(&mut ws).await
    else {
        panic!("expected backfill request");
    };
    assert_eq!(attempt_ids, vec![attempt.id]);

    send_node_frame(&mut ws, &full_response(request_id, &attempt)).await;

    let view = wait_for_sync_state(&addr, attempt.id, "complete").await;
    assert_eq!(view["executions"].as_array().unwrap().len(), 1);
    assert_eq!(view["logs"].as_array().unwrap().len(), 4);
    assert!(view["attempt"]["backfill_request_id"].is_null());

    // The node shows up online.
    let client = reqwest::Client::new();
    let nodes: serde_json::Value = client
        .get(format!("http://{}/nodes", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(nodes[0]["status"], "online");
}

#[tokio::test]
async fn test_stale_response_leaves_request_outstanding() {
    let (store, _dir) = new_store();
    let node_id = seed_node(&store).await;
    let attempt = seed_linked_attempt(&store, node_id, SyncState::Partial).await;
    let addr = start_test_server(store).await;

    let mut ws = connect_node(&addr, node_id, NODE_TOKEN).await;
    let HiveFrame::BackfillRequest { request_id, .. } = recv_hive_frame(&mut ws).await else {
        panic!("expected backfill request");
    };

    // A response with an unknown correlation id is discarded.
    send_node_frame(&mut ws, &full_response(Uuid::new_v4(), &attempt)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::new();
    let json: serde_json::Value = client
        .get(format!("http://{}/attempts/{}", addr, attempt.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["attempt"]["sync_state"], "pending_backfill");
    assert!(json["executions"].as_array().unwrap().is_empty());

    // The real response still lands.
    send_node_frame(&mut ws, &full_response(request_id, &attempt)).await;
    wait_for_sync_state(&addr, attempt.id, "complete").await;
}

#[tokio::test]
async fn test_live_mutation_invalidates_completed_attempt() {
    let (store, _dir) = new_store();
    let node_id = seed_node(&store).await;
    let attempt = seed_linked_attempt(&store, node_id, SyncState::Complete).await;
    let addr = start_test_server(store).await;

    let mut ws = connect_node(&addr, node_id, NODE_TOKEN).await;

    send_node_frame(
        &mut ws,
        &NodeFrame::AttemptSync {
            attempt: AttemptSnapshot {
                id: attempt.id,
                task_id: attempt.task_id,
                node_id,
                executor: attempt.executor.clone(),
                branch: "attempt/rewritten".into(),
                created_at: attempt.created_at,
                updated_at: attempt.updated_at + chrono::Duration::seconds(10),
            },
        },
    )
    .await;

    let view = wait_for_sync_state(&addr, attempt.id, "partial").await;
    assert_eq!(view["attempt"]["branch"], "attempt/rewritten");
}

#[tokio::test]
async fn test_disconnect_resets_pending_and_marks_node_offline() {
    let (store, _dir) = new_store();
    let node_id = seed_node(&store).await;
    let attempt = seed_linked_attempt(&store, node_id, SyncState::Partial).await;
    let addr = start_test_server(store).await;

    let mut ws = connect_node(&addr, node_id, NODE_TOKEN).await;
    let HiveFrame::BackfillRequest { .. } = recv_hive_frame(&mut ws).await else {
        panic!("expected backfill request");
    };

    // Drop the connection with the request unanswered.
    ws.close(None).await.unwrap();
    drop(ws);

    let view = wait_for_sync_state(&addr, attempt.id, "partial").await;
    assert!(view["attempt"]["backfill_request_id"].is_null());

    let client = reqwest::Client::new();
    let nodes: serde_json::Value = client
        .get(format!("http://{}/nodes", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(nodes[0]["status"], "offline");
}

#[tokio::test]
async fn test_unlink_detaches_attempts_and_notifies_node() {
    let (store, _dir) = new_store();
    let node_id = seed_node(&store).await;
    let attempt = seed_linked_attempt(&store, node_id, SyncState::Complete).await;
    let task = store.get_task(attempt.task_id).await.unwrap().unwrap();
    let addr = start_test_server(store).await;

    let mut ws = connect_node(&addr, node_id, NODE_TOKEN).await;
    // Let the session register its handle before the unlink notifies.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response: serde_json::Value = client
        .post(format!("http://{}/projects/{}/unlink", addr, task.project_id))
        .json(&serde_json::json!({ "notify_nodes": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["tasks_unlinked"], 1);
    assert_eq!(response["attempts_reset"], 1);
    assert_eq!(response["nodes_notified"], 1);

    // The node hears about it.
    let HiveFrame::ProjectUnlinked { project_id } = recv_hive_frame(&mut ws).await else {
        panic!("expected unlink notification");
    };
    assert_eq!(project_id, task.project_id);

    let view = wait_for_sync_state(&addr, attempt.id, "local_only").await;
    assert!(view["attempt"]["backfill_request_id"].is_null());

    // Health is clean after the unlink.
    let report: serde_json::Value = client
        .get(format!("http://{}/projects/{}/sync-health", addr, task.project_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["is_linked"], false);
    assert_eq!(report["has_issues"], false);
    assert_eq!(report["orphaned_count"], 0);
    assert!(report["issues"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_node_cannot_write_other_nodes_attempts() {
    let (store, _dir) = new_store();
    let owner = seed_node(&store).await;
    let intruder = seed_node(&store).await;
    let attempt = seed_linked_attempt(&store, owner, SyncState::Complete).await;
    let addr = start_test_server(store).await;

    let mut ws = connect_node(&addr, intruder, NODE_TOKEN).await;

    // Envelopes for another node's attempt are rejected, not stored.
    send_node_frame(
        &mut ws,
        &NodeFrame::ExecutionSync {
            execution: ExecutionSnapshot {
                id: Uuid::new_v4(),
                attempt_id: attempt.id,
                status: ExecutionStatus::Running,
                started_at: Utc::now(),
                completed_at: None,
            },
        },
    )
    .await;
    send_node_frame(
        &mut ws,
        &NodeFrame::LogsBatch {
            attempt_id: attempt.id,
            entries: vec![LogEntrySnapshot {
                entry_id: 0,
                execution_id: Uuid::new_v4(),
                content: "forged".into(),
                timestamp: Utc::now(),
            }],
        },
    )
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::new();
    let view: serde_json::Value = client
        .get(format!("http://{}/attempts/{}", addr, attempt.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["attempt"]["sync_state"], "complete");
    assert!(view["executions"].as_array().unwrap().is_empty());
    assert!(view["logs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_reconnect_supersedes_prior_connection() {
    let (store, _dir) = new_store();
    let node_id = seed_node(&store).await;
    let attempt = seed_linked_attempt(&store, node_id, SyncState::Partial).await;
    let addr = start_test_server(store).await;

    let mut first = connect_node(&addr, node_id, NODE_TOKEN).await;
    let HiveFrame::BackfillRequest { .. } = recv_hive_frame(&mut first).await else {
        panic!("expected backfill request");
    };

    // Second connection for the same node supersedes the first. Its reconnect
    // trigger finds the attempt pending, so no new request goes out yet; the
    // old socket is closed by the server.
    let mut second = connect_node(&addr, node_id, NODE_TOKEN).await;

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let msg = tokio::time::timeout_at(deadline, first.next())
            .await
            .expect("old connection never closed");
        match msg {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(_)) => break,
        }
    }

    // The node is still online through the new socket.
    let client = reqwest::Client::new();
    let nodes: serde_json::Value = client
        .get(format!("http://{}/nodes", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(nodes[0]["status"], "online");

    // And the pending request can still be answered over the new socket.
    let row: serde_json::Value = client
        .get(format!("http://{}/attempts/{}", addr, attempt.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let request_id: Uuid = row["attempt"]["backfill_request_id"]
        .as_str()
        .expect("request id persisted")
        .parse()
        .unwrap();
    send_node_frame(&mut second, &full_response(request_id, &attempt)).await;
    wait_for_sync_state(&addr, attempt.id, "complete").await;
}
