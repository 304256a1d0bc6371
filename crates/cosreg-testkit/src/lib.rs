//! cosreg Testing Infrastructure
//!
//! In-memory handlers for every effect trait the operator depends on, so the
//! reconciliation engine, the relation categories and the event handlers can be
//! exercised without a controller or a workload container.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! cosreg-testkit = { path = "../cosreg-testkit" }
//! ```
//!
//! Then in your tests:
//! ```rust,no_run
//! use cosreg_testkit::*;
//!
//! # async fn demo() {
//! let relations = MockRelations::leader();
//! let rel = relations.add_relation("auth-devices-keys");
//! relations.set_remote(&rel, "external_host", "example.com");
//! # }
//! ```

pub mod fixtures;
pub mod relations;
pub mod sources;
pub mod workload;

pub use fixtures::*;
pub use relations::{MockRelations, RecordedWrite};
pub use sources::{ScriptedCategory, ScriptedSource};
pub use workload::{MockWorkload, RecordedExec};
