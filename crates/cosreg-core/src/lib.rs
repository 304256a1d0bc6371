//! # cosreg core
//!
//! Building blocks shared by every reconciliation path of the COS
//! registration server operator:
//! - [`fingerprint`]: canonical content digests for change detection
//! - [`state`]: the unit-scoped durable state store and per-category snapshots
//! - [`relation`] / [`exchange`]: relation buckets, leader-gated writes and
//!   teardown-tolerant reads
//! - [`workload`]: the process supervisor interface of the workload container
//! - [`topology`]: model/application coordinates used for namespacing

pub mod errors;
pub mod exchange;
pub mod fingerprint;
pub mod relation;
pub mod state;
pub mod topology;
pub mod workload;

pub use errors::{CharmError, Result};
pub use exchange::{RelationExchange, WriteOutcome};
pub use fingerprint::{fingerprint, Fingerprint};
pub use relation::{
    LeadershipEffects, RelationEffects, RelationError, RelationId, RelationLifecycle,
};
pub use state::{FileStateStore, MemoryStateStore, Snapshot, StateStore, SyncState};
pub use topology::Topology;
pub use workload::{ExecOutput, Layer, ServiceSpec, WorkloadEffects, WorkloadError};
