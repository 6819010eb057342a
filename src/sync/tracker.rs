//! In-memory correlation table for outstanding backfill requests.
//!
//! The tracker pairs each outbound `BackfillRequest` with the attempts it
//! covers so the response (or its absence) can be resolved later. Operations
//! are O(1) map mutations behind a single `std::sync::Mutex`; the lock is
//! never held across I/O.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// What a backfill request asks the node to send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackfillKind {
    /// Metadata plus all execution records and all logs.
    FullAttempt,
    /// Execution records only.
    Executions,
    /// Log entries strictly newer than the cursor.
    Logs { since: i64 },
}

/// One outstanding backfill request.
#[derive(Debug, Clone)]
pub struct BackfillRequestRecord {
    pub request_id: Uuid,
    pub node_id: Uuid,
    pub attempt_ids: Vec<Uuid>,
    pub kind: BackfillKind,
    pub requested_at: Instant,
}

/// Error from tracker registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("backfill request needs at least one attempt")]
    EmptyAttemptSet,
    #[error("every attempt in the set already has a request in flight")]
    AllInFlight,
}

/// Result of a successful registration. `attempt_ids` is the accepted subset:
/// attempts that already had a live record are silently skipped so that at
/// most one record exists per attempt at any time.
#[derive(Debug, Clone)]
pub struct RegisteredRequest {
    pub request_id: Uuid,
    pub attempt_ids: Vec<Uuid>,
}

struct TrackerInner {
    requests: HashMap<Uuid, BackfillRequestRecord>,
    /// attempt id -> owning request id
    by_attempt: HashMap<Uuid, Uuid>,
}

/// Correlation table for outstanding backfill requests.
///
/// Shared by `Arc` between sessions, the backfill service, and the
/// reconciliation task. Tests construct isolated instances.
pub struct BackfillRequestTracker {
    inner: Mutex<TrackerInner>,
}

impl Default for BackfillRequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BackfillRequestTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                requests: HashMap::new(),
                by_attempt: HashMap::new(),
            }),
        }
    }

    /// Create and store a correlation record for a new request.
    ///
    /// Attempts that already have a live record are dropped from the set; if
    /// nothing remains the registration is refused and no record is created.
    pub fn register(
        &self,
        node_id: Uuid,
        attempt_ids: &[Uuid],
        kind: BackfillKind,
    ) -> Result<RegisteredRequest, TrackerError> {
        if attempt_ids.is_empty() {
            return Err(TrackerError::EmptyAttemptSet);
        }

        let mut inner = self.inner.lock().expect("tracker lock poisoned");

        let accepted: Vec<Uuid> = attempt_ids
            .iter()
            .copied()
            .filter(|id| !inner.by_attempt.contains_key(id))
            .collect();

        if accepted.is_empty() {
            return Err(TrackerError::AllInFlight);
        }

        let request_id = Uuid::new_v4();
        for id in &accepted {
            inner.by_attempt.insert(*id, request_id);
        }
        inner.requests.insert(
            request_id,
            BackfillRequestRecord {
                request_id,
                node_id,
                attempt_ids: accepted.clone(),
                kind,
                requested_at: Instant::now(),
            },
        );

        Ok(RegisteredRequest {
            request_id,
            attempt_ids: accepted,
        })
    }

    /// Atomically remove and return the record for a request id.
    ///
    /// Idempotent: a duplicate or late completion returns `None`, which the
    /// caller treats as a stale response.
    pub fn complete(&self, request_id: Uuid) -> Option<BackfillRequestRecord> {
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        let record = inner.requests.remove(&request_id)?;
        for id in &record.attempt_ids {
            inner.by_attempt.remove(id);
        }
        Some(record)
    }

    /// Like [`complete`](Self::complete), but only when the record belongs to
    /// the given node. A response from the wrong node leaves the record in
    /// place so the owning node can still answer.
    pub fn complete_for_node(
        &self,
        request_id: Uuid,
        node_id: Uuid,
    ) -> Option<BackfillRequestRecord> {
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        match inner.requests.get(&request_id) {
            Some(record) if record.node_id == node_id => {}
            _ => return None,
        }
        let record = inner.requests.remove(&request_id)?;
        for id in &record.attempt_ids {
            inner.by_attempt.remove(id);
        }
        Some(record)
    }

    /// Remove every record owned by a disconnecting node, returning the
    /// attempt ids that are now eligible for retry.
    pub fn cleanup_for_node(&self, node_id: Uuid) -> Vec<Uuid> {
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        let request_ids: Vec<Uuid> = inner
            .requests
            .values()
            .filter(|r| r.node_id == node_id)
            .map(|r| r.request_id)
            .collect();

        let mut attempts = Vec::new();
        for rid in request_ids {
            if let Some(record) = inner.requests.remove(&rid) {
                for id in &record.attempt_ids {
                    inner.by_attempt.remove(id);
                }
                attempts.extend(record.attempt_ids);
            }
        }
        attempts
    }

    /// Remove every record older than `max_age`, returning the attempt ids
    /// whose requests went unanswered. Used by the reconciliation sweep.
    pub fn expire_older_than(&self, max_age: Duration) -> Vec<Uuid> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        let expired: Vec<Uuid> = inner
            .requests
            .values()
            .filter(|r| now.duration_since(r.requested_at) >= max_age)
            .map(|r| r.request_id)
            .collect();

        let mut attempts = Vec::new();
        for rid in expired {
            if let Some(record) = inner.requests.remove(&rid) {
                for id in &record.attempt_ids {
                    inner.by_attempt.remove(id);
                }
                attempts.extend(record.attempt_ids);
            }
        }
        attempts
    }

    /// Number of live request records.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("tracker lock poisoned").requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_complete() {
        let tracker = BackfillRequestTracker::new();
        let node = Uuid::new_v4();
        let attempt = Uuid::new_v4();

        let req = tracker
            .register(node, &[attempt], BackfillKind::FullAttempt)
            .unwrap();
        assert_eq!(req.attempt_ids, vec![attempt]);
        assert_eq!(tracker.len(), 1);

        let record = tracker.complete(req.request_id).unwrap();
        assert_eq!(record.node_id, node);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_complete_is_idempotent() {
        let tracker = BackfillRequestTracker::new();
        let req = tracker
            .register(Uuid::new_v4(), &[Uuid::new_v4()], BackfillKind::Executions)
            .unwrap();

        assert!(tracker.complete(req.request_id).is_some());
        assert!(tracker.complete(req.request_id).is_none());
    }

    #[test]
    fn test_complete_for_node_checks_ownership() {
        let tracker = BackfillRequestTracker::new();
        let owner = Uuid::new_v4();
        let req = tracker
            .register(owner, &[Uuid::new_v4()], BackfillKind::FullAttempt)
            .unwrap();

        // The wrong node cannot take the record, and it survives the attempt.
        assert!(tracker
            .complete_for_node(req.request_id, Uuid::new_v4())
            .is_none());
        assert_eq!(tracker.len(), 1);

        let record = tracker.complete_for_node(req.request_id, owner).unwrap();
        assert_eq!(record.node_id, owner);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_empty_attempt_set_is_refused() {
        let tracker = BackfillRequestTracker::new();
        let err = tracker
            .register(Uuid::new_v4(), &[], BackfillKind::FullAttempt)
            .unwrap_err();
        assert_eq!(err, TrackerError::EmptyAttemptSet);
    }

    #[test]
    fn test_at_most_one_record_per_attempt() {
        let tracker = BackfillRequestTracker::new();
        let node = Uuid::new_v4();
        let shared = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        tracker
            .register(node, &[shared], BackfillKind::FullAttempt)
            .unwrap();

        // Racing register for the same attempt plus a new one: only the new
        // attempt is accepted.
        let second = tracker
            .register(node, &[shared, fresh], BackfillKind::FullAttempt)
            .unwrap();
        assert_eq!(second.attempt_ids, vec![fresh]);

        // Racing register covering only the in-flight attempt is refused.
        let err = tracker
            .register(node, &[shared], BackfillKind::FullAttempt)
            .unwrap_err();
        assert_eq!(err, TrackerError::AllInFlight);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_cleanup_for_node_returns_all_owned_attempts() {
        let tracker = BackfillRequestTracker::new();
        let node_a = Uuid::new_v4();
        let node_b = Uuid::new_v4();
        let a1 = Uuid::new_v4();
        let a2 = Uuid::new_v4();
        let b1 = Uuid::new_v4();

        tracker
            .register(node_a, &[a1], BackfillKind::FullAttempt)
            .unwrap();
        tracker
            .register(node_a, &[a2], BackfillKind::Executions)
            .unwrap();
        tracker
            .register(node_b, &[b1], BackfillKind::FullAttempt)
            .unwrap();

        let mut cleaned = tracker.cleanup_for_node(node_a);
        cleaned.sort();
        let mut expected = vec![a1, a2];
        expected.sort();
        assert_eq!(cleaned, expected);

        // Node B's request is untouched, and node A's attempts are free again.
        assert_eq!(tracker.len(), 1);
        assert!(tracker
            .register(node_a, &[a1], BackfillKind::FullAttempt)
            .is_ok());
    }

    #[test]
    fn test_expire_older_than() {
        let tracker = BackfillRequestTracker::new();
        let attempt = Uuid::new_v4();
        tracker
            .register(Uuid::new_v4(), &[attempt], BackfillKind::Logs { since: 0 })
            .unwrap();

        // Nothing is older than an hour.
        assert!(tracker
            .expire_older_than(Duration::from_secs(3600))
            .is_empty());

        // Everything is at least zero old.
        let expired = tracker.expire_older_than(Duration::ZERO);
        assert_eq!(expired, vec![attempt]);
        assert!(tracker.is_empty());
    }
}
