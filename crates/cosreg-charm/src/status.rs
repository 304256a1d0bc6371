//! Unit status
//!
//! Handlers report statuses as they go; after the event the most severe one
//! is published.

use async_trait::async_trait;
use cosreg_core::Result;
use std::collections::BTreeMap;

/// Workload status of the unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Serving
    Active(String),
    /// Waiting on something outside the unit
    Waiting(String),
    /// Doing work on its own
    Maintenance(String),
    /// Needs operator attention
    Blocked(String),
}

impl UnitStatus {
    /// Status name understood by `status-set`
    pub fn name(&self) -> &'static str {
        match self {
            UnitStatus::Active(_) => "active",
            UnitStatus::Waiting(_) => "waiting",
            UnitStatus::Maintenance(_) => "maintenance",
            UnitStatus::Blocked(_) => "blocked",
        }
    }

    /// Human readable message
    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Active(m)
            | UnitStatus::Waiting(m)
            | UnitStatus::Maintenance(m)
            | UnitStatus::Blocked(m) => m,
        }
    }

    fn severity(&self) -> u8 {
        match self {
            UnitStatus::Active(_) => 0,
            UnitStatus::Waiting(_) => 1,
            UnitStatus::Maintenance(_) => 2,
            UnitStatus::Blocked(_) => 3,
        }
    }
}

/// Statuses reported while handling one event
#[derive(Debug, Clone, Default)]
pub struct StatusCollector {
    reported: Vec<UnitStatus>,
}

impl StatusCollector {
    /// Record a status
    pub fn add(&mut self, status: UnitStatus) {
        tracing::debug!(status = status.name(), message = status.message(), "status reported");
        self.reported.push(status);
    }

    /// Most severe status; the latest wins among equals
    pub fn highest(&self) -> Option<&UnitStatus> {
        self.reported.iter().max_by_key(|status| status.severity())
    }
}

/// Unit-level controller operations
#[async_trait]
pub trait UnitEffects: Send + Sync {
    /// Publish the unit status
    async fn set_status(&self, status: &UnitStatus) -> Result<()>;

    /// Set results of the running action
    async fn action_set(&self, results: &BTreeMap<String, String>) -> Result<()>;

    /// Fail the running action
    async fn action_fail(&self, message: &str) -> Result<()>;
}
