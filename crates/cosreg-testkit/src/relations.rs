//! In-memory controller view of relations and leadership
//!
//! Each relation instance has two buckets, ours and the remote
//! application's. Tests can flip leadership, break individual instances and
//! mark instances as departing to reproduce teardown races.

use async_trait::async_trait;
use cosreg_core::{LeadershipEffects, RelationEffects, RelationError, RelationId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// A single successful bucket write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Instance written
    pub relation: RelationId,
    /// Bucket key
    pub key: String,
    /// Encoded value
    pub value: String,
}

#[derive(Debug, Default)]
struct RelationsState {
    leader: bool,
    next_id: u32,
    live: BTreeSet<RelationId>,
    ours: BTreeMap<RelationId, BTreeMap<String, String>>,
    remote: BTreeMap<RelationId, BTreeMap<String, String>>,
    failing: BTreeSet<RelationId>,
    departing: BTreeSet<RelationId>,
    unlistable: BTreeSet<String>,
    writes: Vec<RecordedWrite>,
}

/// Mock relation and leadership effects
#[derive(Debug, Clone, Default)]
pub struct MockRelations {
    state: Arc<Mutex<RelationsState>>,
}

impl MockRelations {
    /// A view where this unit holds leadership
    pub fn leader() -> Self {
        let mocks = Self::default();
        mocks.set_leader(true);
        mocks
    }

    /// A view where this unit is a follower
    pub fn follower() -> Self {
        Self::default()
    }

    /// Change leadership
    pub fn set_leader(&self, leader: bool) {
        self.state.lock().unwrap().leader = leader;
    }

    /// Current leadership flag
    pub fn is_leader_now(&self) -> bool {
        self.state.lock().unwrap().leader
    }

    /// Create a new live instance of `name` and return its id
    pub fn add_relation(&self, name: &str) -> RelationId {
        let mut state = self.state.lock().unwrap();
        let id = RelationId::new(name, state.next_id);
        state.next_id += 1;
        state.live.insert(id.clone());
        id
    }

    /// Remove an instance with both of its buckets
    pub fn remove_relation(&self, relation: &RelationId) {
        let mut state = self.state.lock().unwrap();
        state.live.remove(relation);
        state.ours.remove(relation);
        state.remote.remove(relation);
        state.failing.remove(relation);
        state.departing.remove(relation);
    }

    /// Put `value` under `key` in the remote application bucket
    pub fn set_remote(&self, relation: &RelationId, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .remote
            .entry(relation.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Drop `key` from the remote application bucket
    pub fn clear_remote(&self, relation: &RelationId, key: &str) {
        if let Some(bucket) = self.state.lock().unwrap().remote.get_mut(relation) {
            bucket.remove(key);
        }
    }

    /// Our bucket of `relation`
    pub fn local_data(&self, relation: &RelationId) -> BTreeMap<String, String> {
        self.state
            .lock()
            .unwrap()
            .ours
            .get(relation)
            .cloned()
            .unwrap_or_default()
    }

    /// One value of our bucket
    pub fn local_value(&self, relation: &RelationId, key: &str) -> Option<String> {
        self.local_data(relation).get(key).cloned()
    }

    /// Reject every write to `relation` until [`MockRelations::heal`]
    pub fn fail_writes(&self, relation: &RelationId) {
        self.state.lock().unwrap().failing.insert(relation.clone());
    }

    /// Accept writes to `relation` again
    pub fn heal(&self, relation: &RelationId) {
        self.state.lock().unwrap().failing.remove(relation);
    }

    /// Remote reads on `relation` report a teardown race
    pub fn mark_departing(&self, relation: &RelationId) {
        self.state.lock().unwrap().departing.insert(relation.clone());
    }

    /// Listing instances of `name` fails
    pub fn fail_listing(&self, name: &str) {
        self.state.lock().unwrap().unlistable.insert(name.to_string());
    }

    /// Every successful write, in order
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes.len()
    }

    /// Successful writes into one instance
    pub fn writes_to(&self, relation: &RelationId) -> usize {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|w| &w.relation == relation)
            .count()
    }

    /// Forget recorded writes; bucket contents are kept
    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }
}

#[async_trait]
impl RelationEffects for MockRelations {
    async fn relation_ids(&self, name: &str) -> Result<Vec<RelationId>, RelationError> {
        let state = self.state.lock().unwrap();
        if state.unlistable.contains(name) {
            tracing::debug!(name, "injected listing failure");
            return Err(RelationError::Access(format!("cannot list {name}")));
        }
        Ok(state.live.iter().filter(|r| r.name == name).cloned().collect())
    }

    async fn set_app_data(
        &self,
        relation: &RelationId,
        key: &str,
        value: &str,
    ) -> Result<(), RelationError> {
        let mut state = self.state.lock().unwrap();
        if !state.leader {
            return Err(RelationError::NotLeader);
        }
        if !state.live.contains(relation) {
            return Err(RelationError::NotFound(relation.clone()));
        }
        if state.failing.contains(relation) {
            tracing::debug!(relation = %relation, key, "injected write failure");
            return Err(RelationError::Access(format!("write to {relation} rejected")));
        }
        state
            .ours
            .entry(relation.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
        state.writes.push(RecordedWrite {
            relation: relation.clone(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn remote_app_data(
        &self,
        relation: &RelationId,
        key: &str,
    ) -> Result<Option<String>, RelationError> {
        let state = self.state.lock().unwrap();
        if state.departing.contains(relation) {
            return Err(RelationError::Departing(relation.clone()));
        }
        if !state.live.contains(relation) {
            return Err(RelationError::NotFound(relation.clone()));
        }
        Ok(state
            .remote
            .get(relation)
            .and_then(|bucket| bucket.get(key))
            .cloned())
    }
}

#[async_trait]
impl LeadershipEffects for MockRelations {
    async fn is_leader(&self) -> Result<bool, RelationError> {
        Ok(self.state.lock().unwrap().leader)
    }
}
