//! Relation model and the effect traits the controller exposes for it
//!
//! A relation is a named integration point between this application and one
//! remote application. Each relation instance carries two application-scoped
//! data buckets: ours (writable by the leader only) and the remote
//! application's (read-only from this side). Bucket values are strings; this
//! crate always stores JSON text in them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CharmError;

/// Stable identifier of one relation instance, rendered as `name:id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationId {
    /// Relation (endpoint) name from the charm metadata
    pub name: String,
    /// Numeric instance id assigned by the controller
    pub id: u32,
}

impl RelationId {
    /// Create a relation id
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.id)
    }
}

impl FromStr for RelationId {
    type Err = CharmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, id) = s
            .rsplit_once(':')
            .ok_or_else(|| CharmError::invalid(format!("relation id '{s}' has no ':'")))?;
        let id = id
            .parse()
            .map_err(|e| CharmError::invalid(format!("relation id '{s}': {e}")))?;
        if name.is_empty() {
            return Err(CharmError::invalid(format!("relation id '{s}' has no name")));
        }
        Ok(Self::new(name, id))
    }
}

/// Lifecycle of a relation instance as seen through delivered events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationLifecycle {
    /// Instance exists, no remote units yet
    Created,
    /// A remote unit joined
    Joined,
    /// Remote data changed (repeatable)
    Changed,
    /// A remote unit left
    Departed,
    /// Terminal: the instance is being removed
    Broken,
}

impl RelationLifecycle {
    /// Hook name suffix (`relation-created`, ...)
    pub fn hook_suffix(self) -> &'static str {
        match self {
            Self::Created => "relation-created",
            Self::Joined => "relation-joined",
            Self::Changed => "relation-changed",
            Self::Departed => "relation-departed",
            Self::Broken => "relation-broken",
        }
    }

    /// Whether data reads may race the teardown of the instance
    pub fn is_teardown(self) -> bool {
        matches!(self, Self::Departed | Self::Broken)
    }
}

/// Relation access errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelationError {
    /// No relation instance with this id
    #[error("relation {0} not found")]
    NotFound(RelationId),

    /// The instance is being torn down and its remote data is gone
    #[error("relation {0} is departing")]
    Departing(RelationId),

    /// Writes to the application bucket require leadership
    #[error("unit is not the leader")]
    NotLeader,

    /// The controller rejected the access
    #[error("relation access failed: {0}")]
    Access(String),
}

impl From<RelationError> for CharmError {
    fn from(err: RelationError) -> Self {
        CharmError::relation(err.to_string())
    }
}

/// Relation data access provided by the controller
#[async_trait]
pub trait RelationEffects: Send + Sync {
    /// All live instances of relation `name`
    async fn relation_ids(&self, name: &str) -> Result<Vec<RelationId>, RelationError>;

    /// Write `value` under `key` in our application bucket of `relation`
    async fn set_app_data(
        &self,
        relation: &RelationId,
        key: &str,
        value: &str,
    ) -> Result<(), RelationError>;

    /// Read `key` from the remote application bucket of `relation`
    async fn remote_app_data(
        &self,
        relation: &RelationId,
        key: &str,
    ) -> Result<Option<String>, RelationError>;
}

/// Leadership query provided by the controller
#[async_trait]
pub trait LeadershipEffects: Send + Sync {
    /// Whether this unit currently holds leadership
    async fn is_leader(&self) -> Result<bool, RelationError>;
}
