//! # cosreg charm - the COS registration server operator
//!
//! Wires the reconciliation core to the registry, the workload container and
//! the controller:
//! - [`charm`]: the dispatch table and the handlers it routes to
//! - [`sources`] / [`api`]: registry-backed data sources
//! - [`workload`]: server setup and the supervised process layer
//! - [`admin`]: the `get-admin-password` action
//! - [`handlers`]: hook-tool and Pebble adapters used in production

pub mod admin;
pub mod api;
pub mod charm;
pub mod config;
pub mod context;
pub mod events;
pub mod handlers;
pub mod sources;
pub mod state;
pub mod status;
pub mod workload;

pub use api::{Endpoints, RegistryApi, RegistryClient};
pub use charm::{dispatch_table, Charm, Effects, Handler};
pub use config::CharmConfig;
pub use context::HookContext;
pub use events::trigger_from_context;
pub use handlers::{HookTools, PebbleCli};
pub use state::UnitState;
pub use status::{StatusCollector, UnitEffects, UnitStatus};
