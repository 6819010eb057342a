//! Synchronization and backfill subsystem.
//!
//! The hive keeps shadow copies of attempts that run on worker nodes. Live
//! streaming keeps the shadows roughly current; this module closes the gaps:
//! a per-attempt state machine ([`SyncState`]), a correlation tracker for
//! outstanding requests ([`BackfillRequestTracker`]), a registry of live node
//! connections ([`NodeConnectionRegistry`]), and the [`BackfillService`] that
//! ties them to the store.

pub mod health;
pub mod registry;
pub mod responder;
pub mod service;
pub mod state;
pub mod tracker;

pub use health::{SyncHealthEvaluator, SyncHealthReport};
pub use registry::{NodeConnectionRegistry, NodeHandle, Outgoing, RegistryError};
pub use responder::NodeBackfillResponder;
pub use service::{BackfillService, BackfillServiceError};
pub use state::{SyncEvent, SyncState};
pub use tracker::{BackfillKind, BackfillRequestTracker, RegisteredRequest, TrackerError};

use std::time::Duration;

/// Tunables for the sync subsystem.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Outstanding requests older than this are abandoned by the sweep.
    pub backfill_timeout: Duration,
    /// Interval between reconciliation sweeps.
    pub reconcile_interval: Duration,
    /// Bound on a single WebSocket frame's payload.
    pub max_frame_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backfill_timeout: Duration::from_secs(120),
            reconcile_interval: Duration::from_secs(60),
            max_frame_bytes: crate::ws::protocol::DEFAULT_MAX_FRAME_BYTES,
        }
    }
}
