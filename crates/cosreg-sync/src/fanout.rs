//! Peer Fan-out
//!
//! Writes a full set of bucket entries into every live instance of a relation.
//! Instances fail independently: one rejected write is logged and recorded,
//! the remaining instances still receive the data.

use cosreg_core::{RelationEffects, RelationExchange, RelationId, WriteOutcome};
use std::collections::BTreeMap;

/// What one fan-out pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Relation name the pass targeted
    pub relation_name: String,
    /// Instances that received every entry
    pub written: Vec<RelationId>,
    /// Instances where at least one entry failed, with the first error
    pub failed: Vec<(RelationId, String)>,
    /// Set when the instances could not even be listed
    pub listing_error: Option<String>,
}

impl FanOutReport {
    /// Every listed instance received the data
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.listing_error.is_none()
    }

    /// Number of instances written
    pub fn written_count(&self) -> usize {
        self.written.len()
    }
}

/// Write `entries` into every live instance of `relation_name`.
pub async fn publish<R>(
    exchange: &RelationExchange<'_, R>,
    relation_name: &str,
    entries: &BTreeMap<String, String>,
) -> FanOutReport
where
    R: RelationEffects + ?Sized,
{
    let mut report = FanOutReport {
        relation_name: relation_name.to_string(),
        ..FanOutReport::default()
    };

    let relations = match exchange.relation_ids(relation_name).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(relation = relation_name, error = %e, "failed to list relations");
            report.listing_error = Some(e.to_string());
            return report;
        }
    };

    for relation in relations {
        match publish_to(exchange, &relation, entries).await {
            Ok(true) => report.written.push(relation),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(relation = %relation, error = %e, "failed to publish relation data");
                report.failed.push((relation, e));
            }
        }
    }

    tracing::debug!(
        relation = relation_name,
        written = report.written.len(),
        failed = report.failed.len(),
        "fan-out finished"
    );
    report
}

/// Write `entries` into a single instance.
///
/// Returns `Ok(false)` when the write was skipped because this unit is not the
/// leader.
pub async fn publish_to<R>(
    exchange: &RelationExchange<'_, R>,
    relation: &RelationId,
    entries: &BTreeMap<String, String>,
) -> Result<bool, String>
where
    R: RelationEffects + ?Sized,
{
    if !exchange.is_leader() {
        return Ok(false);
    }
    for (key, value) in entries {
        match exchange.write_raw(relation, key, value).await {
            Ok(WriteOutcome::Written) => {}
            Ok(WriteOutcome::Skipped) => return Ok(false),
            Err(e) => return Err(e.to_string()),
        }
    }
    Ok(true)
}
