//! Per-attempt sync state machine.
//!
//! Tracks how confident the hive is in its shadow copy of a node's attempt:
//! - `Partial`: initial state; hive data may be incomplete.
//! - `PendingBackfill`: a backfill request is outstanding.
//! - `Complete`: the hive's copy is verified current.
//! - `LocalOnly`: neutral status set by unlink-and-reset; never eligible for
//!   any trigger.

use serde::{Deserialize, Serialize};

/// Sync status of one hive-side attempt shadow record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Partial,
    PendingBackfill,
    Complete,
    LocalOnly,
}

impl SyncState {
    /// Whether a backfill trigger may act on an attempt in this state.
    ///
    /// Only `Partial` attempts are eligible: `PendingBackfill` already has an
    /// outstanding request, `Complete` needs no repair, and `LocalOnly` has
    /// been explicitly detached from sync.
    pub fn is_backfill_eligible(&self) -> bool {
        matches!(self, SyncState::Partial)
    }

    /// Whether this attempt is tracked by the sync subsystem at all.
    pub fn is_synced(&self) -> bool {
        !matches!(self, SyncState::LocalOnly)
    }

    /// Apply a state-machine event, returning the new state or `None` if the
    /// transition is not allowed from the current state.
    pub fn transition(&self, event: SyncEvent) -> Option<SyncState> {
        match (self, event) {
            (SyncState::Partial, SyncEvent::BackfillRequested) => Some(SyncState::PendingBackfill),
            (SyncState::PendingBackfill, SyncEvent::BackfillSucceeded) => Some(SyncState::Complete),
            (SyncState::PendingBackfill, SyncEvent::BackfillFailed) => Some(SyncState::Partial),
            // A newer mutation invalidates the hive's confidence.
            (SyncState::Complete, SyncEvent::Invalidated) => Some(SyncState::Partial),
            (SyncState::Partial, SyncEvent::Invalidated) => Some(SyncState::Partial),
            _ => None,
        }
    }
}

/// Events driving `SyncState` transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// A trigger issued a backfill request for the attempt.
    BackfillRequested,
    /// A successful backfill response was applied.
    BackfillSucceeded,
    /// The request failed, timed out, or the owning node disconnected.
    BackfillFailed,
    /// A newer mutation arrived for an attempt the hive thought was current.
    Invalidated,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Partial => write!(f, "partial"),
            SyncState::PendingBackfill => write!(f, "pending_backfill"),
            SyncState::Complete => write!(f, "complete"),
            SyncState::LocalOnly => write!(f, "local_only"),
        }
    }
}

impl std::str::FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partial" => Ok(SyncState::Partial),
            "pending_backfill" => Ok(SyncState::PendingBackfill),
            "complete" => Ok(SyncState::Complete),
            "local_only" => Ok(SyncState::LocalOnly),
            _ => Err(format!("Unknown sync state: {}", s)),
        }
    }
}
