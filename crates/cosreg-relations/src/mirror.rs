//! Requirer-side mirror of one remote bucket key
//!
//! The leader reads the remote application bucket on every change event,
//! compares it with the locally kept copy and replaces the copy when it
//! differs. A read that races relation teardown counts as absent data and
//! leaves the copy alone.

use cosreg_core::fingerprint::fingerprint;
use cosreg_core::{RelationEffects, RelationExchange, RelationId, Result, Snapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// What one observation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Not the leader; nothing read
    Passive,
    /// The remote side has not published the key (or is departing)
    Absent,
    /// Remote value matches the local copy
    Unchanged,
    /// Local copy replaced; consumers should react
    Replaced {
        /// Copy revision after the replacement
        revision: u64,
    },
}

impl MirrorOutcome {
    /// Whether the local copy changed
    pub fn changed(&self) -> bool {
        matches!(self, MirrorOutcome::Replaced { .. })
    }
}

/// Local copy of `key` as published by the remote application of `relation_name`
#[derive(Debug, Clone)]
pub struct RemoteMirror<T> {
    relation_name: String,
    key: String,
    _data: PhantomData<fn() -> T>,
}

impl<T> RemoteMirror<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Mirror `key` of relation `relation_name`
    pub fn new(relation_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            relation_name: relation_name.into(),
            key: key.into(),
            _data: PhantomData,
        }
    }

    /// Relation observed
    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    /// Bucket key observed
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the remote value on `relation` and fold it into `copy`.
    pub async fn observe<R>(
        &self,
        exchange: &RelationExchange<'_, R>,
        relation: &RelationId,
        copy: &mut Snapshot<T>,
    ) -> Result<MirrorOutcome>
    where
        R: RelationEffects + ?Sized,
    {
        if !exchange.is_leader() {
            return Ok(MirrorOutcome::Passive);
        }
        if relation.name != self.relation_name {
            tracing::debug!(
                relation = %relation,
                mirror = %self.relation_name,
                "event for another relation"
            );
            return Ok(MirrorOutcome::Absent);
        }

        let Some(remote) = exchange.read::<T>(relation, &self.key).await? else {
            return Ok(MirrorOutcome::Absent);
        };

        let fresh = fingerprint(&remote)?;
        if copy.fingerprint == Some(fresh) {
            return Ok(MirrorOutcome::Unchanged);
        }

        tracing::info!(relation = %relation, key = %self.key, "remote data changed");
        copy.replace(remote);
        copy.commit(fresh);
        Ok(MirrorOutcome::Replaced {
            revision: copy.revision,
        })
    }
}
