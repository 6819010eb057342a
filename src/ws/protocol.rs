//! Wire protocol for the per-node WebSocket connection.
//!
//! Frames are JSON text messages, tagged by `type`. The hive sends
//! `HiveFrame`s; nodes send `NodeFrame`s. The `AttemptSync`, `ExecutionSync`
//! and `LogsBatch` envelopes are shared between backfill payloads and ordinary
//! live streaming.

use crate::model::{AttemptBackfill, AttemptSnapshot, ExecutionSnapshot, LogEntrySnapshot};
use crate::sync::BackfillKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default bound on a single frame's payload size.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Frames sent hive -> node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HiveFrame {
    /// Ask the node to send attempt data the hive is missing.
    BackfillRequest {
        request_id: Uuid,
        kind: BackfillKind,
        attempt_ids: Vec<Uuid>,
    },
    /// Best-effort notification that a project was unlinked on the hive.
    ProjectUnlinked { project_id: Uuid },
}

/// Frames sent node -> hive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeFrame {
    /// Exactly one reply per `BackfillRequest`, correlated by `request_id`.
    BackfillResponse {
        request_id: Uuid,
        results: Vec<AttemptBackfillResult>,
    },
    /// Live-stream envelope: attempt metadata changed on the node.
    AttemptSync { attempt: AttemptSnapshot },
    /// Live-stream envelope: an execution record changed on the node.
    ExecutionSync { execution: ExecutionSnapshot },
    /// Live-stream envelope: a batch of new log entries for an attempt.
    LogsBatch {
        attempt_id: Uuid,
        entries: Vec<LogEntrySnapshot>,
    },
}

/// Per-attempt outcome inside a `BackfillResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptBackfillResult {
    pub attempt_id: Uuid,
    pub outcome: BackfillOutcome,
}

/// Payload or explicit error for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BackfillOutcome {
    Ok { payload: BackfillPayload },
    Err { reason: BackfillErrorReason },
}

/// Backfill payload variants, matching the request kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "payload_type", rename_all = "snake_case")]
pub enum BackfillPayload {
    Full(AttemptBackfill),
    Executions { executions: Vec<ExecutionSnapshot> },
    Logs { entries: Vec<LogEntrySnapshot> },
}

/// Terminal (until re-linked) per-attempt backfill errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillErrorReason {
    AttemptNotFound,
    NotLinked,
}

impl std::fmt::Display for BackfillErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackfillErrorReason::AttemptNotFound => write!(f, "attempt not found"),
            BackfillErrorReason::NotLinked => write!(f, "attempt has no hive link"),
        }
    }
}

/// Error from frame decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame of {len} bytes exceeds limit of {max}")]
    Oversized { len: usize, max: usize },
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a frame as a JSON text message.
pub fn encode<T: Serialize>(frame: &T) -> String {
    serde_json::to_string(frame).expect("frame serialization cannot fail")
}

/// Decode a node frame, enforcing the payload size bound.
pub fn decode_node_frame(text: &str, max_bytes: usize) -> Result<NodeFrame, ProtocolError> {
    if text.len() > max_bytes {
        return Err(ProtocolError::Oversized {
            len: text.len(),
            max: max_bytes,
        });
    }
    Ok(serde_json::from_str(text)?)
}

/// Decode a hive frame (used by node-side clients and tests).
pub fn decode_hive_frame(text: &str, max_bytes: usize) -> Result<HiveFrame, ProtocolError> {
    if text.len() > max_bytes {
        return Err(ProtocolError::Oversized {
            len: text.len(),
            max: max_bytes,
        });
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backfill_request_roundtrip() {
        let frame = HiveFrame::BackfillRequest {
            request_id: Uuid::new_v4(),
            kind: BackfillKind::Logs { since: 42 },
            attempt_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
        };
        let text = encode(&frame);
        let decoded = decode_hive_frame(&text, DEFAULT_MAX_FRAME_BYTES).unwrap();
        match decoded {
            HiveFrame::BackfillRequest {
                kind, attempt_ids, ..
            } => {
                assert_eq!(kind, BackfillKind::Logs { since: 42 });
                assert_eq!(attempt_ids.len(), 2);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let text = format!(
            r#"{{"type":"logs_batch","attempt_id":"{}","entries":[]}}"#,
            Uuid::new_v4()
        );
        let err = decode_node_frame(&text, 8).unwrap_err();
        assert!(matches!(err, ProtocolError::Oversized { .. }));
    }

    #[test]
    fn test_error_outcome_roundtrip() {
        let result = AttemptBackfillResult {
            attempt_id: Uuid::new_v4(),
            outcome: BackfillOutcome::Err {
                reason: BackfillErrorReason::NotLinked,
            },
        };
        let text = serde_json::to_string(&result).unwrap();
        let decoded: AttemptBackfillResult = serde_json::from_str(&text).unwrap();
        assert!(matches!(
            decoded.outcome,
            BackfillOutcome::Err {
                reason: BackfillErrorReason::NotLinked
            }
        ));
    }
}
