//! # cosreg sync - detect change, update state, fan out
//!
//! The reconciliation core of the operator:
//! - [`category`]: the data categories and the source/render contract each
//!   one implements
//! - [`engine`]: the per-category state machine (fingerprint, compare, replace,
//!   publish, commit, notify)
//! - [`fanout`]: best-effort publication to every live relation instance
//! - [`dispatch`]: the explicit trigger -> handler table and the single
//!   control loop that drains local notifications
//!
//! ## Design Principles
//!
//! - **Leader only**: followers never evaluate or publish
//! - **Whole sets**: materialized data is replaced, never patched
//! - **Events are retries**: a failed pass leaves prior state untouched and
//!   waits for the next delivered trigger

pub mod category;
pub mod dispatch;
pub mod engine;
pub mod fanout;

pub use category::{encode_json, Category, DataSource, EmptyPolicy, SourceError, SyncCategory};
pub use dispatch::{dispatch, DispatchLog, DispatchTable, Trigger, TriggerHandler, TriggerKind};
pub use engine::{Notification, PassReport, ReconcileEngine, ReconcileOutcome};
pub use fanout::{publish, publish_to, FanOutReport};
