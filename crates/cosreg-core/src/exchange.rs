//! Relation Data Exchange
//!
//! Leader-gated writes into our application bucket and race-tolerant reads
//! from the remote application bucket, with JSON encoding on both sides.

use crate::errors::Result;
use crate::fingerprint::canonical_json;
use crate::relation::{RelationEffects, RelationError, RelationId};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Result of a write attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value was written
    Written,
    /// This unit is not the leader; nothing was written
    Skipped,
}

/// Bidirectional view over relation buckets for one unit
pub struct RelationExchange<'a, R: ?Sized> {
    relations: &'a R,
    is_leader: bool,
}

impl<'a, R: RelationEffects + ?Sized> RelationExchange<'a, R> {
    /// Bind the exchange to the controller view and this unit's leadership
    pub fn new(relations: &'a R, is_leader: bool) -> Self {
        Self {
            relations,
            is_leader,
        }
    }

    /// Whether writes will land
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// Underlying relation effects
    pub fn relations(&self) -> &'a R {
        self.relations
    }

    /// Live instances of `name`
    pub async fn relation_ids(
        &self,
        name: &str,
    ) -> std::result::Result<Vec<RelationId>, RelationError> {
        self.relations.relation_ids(name).await
    }

    /// Serialize `value` as canonical JSON and write it under `key`.
    ///
    /// Non-leader units skip the write silently.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        relation: &RelationId,
        key: &str,
        value: &T,
    ) -> Result<WriteOutcome> {
        let encoded = canonical_json(&serde_json::to_value(value)?);
        self.write_raw(relation, key, &encoded).await
    }

    /// Write an already encoded bucket value under `key`.
    pub async fn write_raw(
        &self,
        relation: &RelationId,
        key: &str,
        encoded: &str,
    ) -> Result<WriteOutcome> {
        if !self.is_leader {
            tracing::debug!(relation = %relation, key, "not leader, skipping relation write");
            return Ok(WriteOutcome::Skipped);
        }
        self.relations.set_app_data(relation, key, encoded).await?;
        Ok(WriteOutcome::Written)
    }

    /// Read the raw remote value under `key`.
    ///
    /// A teardown race is reported as absent data.
    pub async fn read_raw(&self, relation: &RelationId, key: &str) -> Result<Option<String>> {
        match self.relations.remote_app_data(relation, key).await {
            Ok(value) => Ok(value.filter(|v| !v.is_empty())),
            Err(RelationError::Departing(id)) | Err(RelationError::NotFound(id)) => {
                tracing::debug!(
                    relation = %id,
                    key,
                    "remote app data unavailable; relation is probably departing"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read and decode the remote JSON value under `key`.
    pub async fn read<T: DeserializeOwned>(
        &self,
        relation: &RelationId,
        key: &str,
    ) -> Result<Option<T>> {
        match self.read_raw(relation, key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
