//! Reconciliation Engine
//!
//! One pass per category: fetch fresh data, fingerprint it, compare with the
//! snapshot and, only on a change, replace the materialized set, fan it out to
//! every live relation instance and commit the new fingerprint.
//!
//! State machine per category (see [`SyncState`]):
//!
//! ```text
//! UNINITIALIZED --fresh == empty baseline--> SYNCED   (no fan-out)
//! UNINITIALIZED|SYNCED --fresh differs--> STALE --fan-out complete--> SYNCED
//! STALE --next trigger--> retried from scratch
//! ```
//!
//! A failed fetch never touches the snapshot; the next delivered event is the
//! retry. Only the leader evaluates the state machine.
//!
//! [`SyncState`]: cosreg_core::SyncState

use crate::category::{EmptyPolicy, SourceError, SyncCategory};
use crate::fanout::{self, FanOutReport};
use crate::Category;
use cosreg_core::fingerprint::fingerprint;
use cosreg_core::{Fingerprint, RelationEffects, RelationExchange, RelationId, Result, Snapshot};

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This unit is not the leader; nothing was evaluated
    Passive,
    /// Fresh data could not be produced; snapshot untouched
    SourceUnavailable(SourceError),
    /// Fresh data was empty and the category skips empty results
    SkippedEmpty,
    /// First pass found the empty baseline; fingerprint recorded, no fan-out
    Initialized,
    /// Fresh data matches the stored fingerprint
    Unchanged,
    /// Data changed and every live instance received it
    Synced {
        /// Newly committed fingerprint
        fingerprint: Fingerprint,
        /// Fan-out details
        report: FanOutReport,
    },
    /// Data changed but at least one instance failed; fingerprint not committed
    Partial {
        /// Fan-out details
        report: FanOutReport,
    },
}

/// Local change notification, emitted exactly once per completed transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Category whose data set changed
    pub category: Category,
    /// Snapshot revision after the change
    pub revision: u64,
}

/// Outcome of a pass together with the notification it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Category reconciled
    pub category: Category,
    /// What happened
    pub outcome: ReconcileOutcome,
    /// Set only when the pass completed a change transition
    pub notification: Option<Notification>,
}

impl PassReport {
    fn quiet(category: Category, outcome: ReconcileOutcome) -> Self {
        Self {
            category,
            outcome,
            notification: None,
        }
    }

    /// Whether the pass wrote to any relation instance
    pub fn fanned_out(&self) -> bool {
        match &self.outcome {
            ReconcileOutcome::Synced { report, .. } | ReconcileOutcome::Partial { report } => {
                !report.written.is_empty()
            }
            _ => false,
        }
    }
}

/// Drives reconciliation passes through one relation exchange
pub struct ReconcileEngine<'a, R: ?Sized> {
    exchange: RelationExchange<'a, R>,
}

impl<'a, R: RelationEffects + ?Sized> ReconcileEngine<'a, R> {
    /// Bind the engine to an exchange
    pub fn new(exchange: RelationExchange<'a, R>) -> Self {
        Self { exchange }
    }

    /// The exchange used for fan-out
    pub fn exchange(&self) -> &RelationExchange<'a, R> {
        &self.exchange
    }

    /// Run one pass for `category` against `snapshot`.
    ///
    /// Errors are reserved for programming errors (data that cannot be
    /// fingerprinted or rendered); every runtime failure is an outcome.
    pub async fn reconcile<C>(
        &self,
        category: &C,
        snapshot: &mut Snapshot<C::Data>,
    ) -> Result<PassReport>
    where
        C: SyncCategory + ?Sized,
    {
        let name = category.category();
        if !self.exchange.is_leader() {
            return Ok(PassReport::quiet(name, ReconcileOutcome::Passive));
        }

        let fresh = match category.fetch().await {
            Ok(data) => data,
            Err(e @ SourceError::NotReady(_)) => {
                tracing::debug!(category = %name, reason = %e, "source not ready, skipping pass");
                return Ok(PassReport::quiet(name, ReconcileOutcome::SourceUnavailable(e)));
            }
            Err(e) => {
                tracing::warn!(
                    category = %name,
                    error = %e,
                    "fresh data unavailable, keeping prior state"
                );
                return Ok(PassReport::quiet(name, ReconcileOutcome::SourceUnavailable(e)));
            }
        };

        let fresh_fp = fingerprint(&fresh)?;
        let empty_fp = fingerprint(&C::Data::default())?;
        if fresh_fp == empty_fp && category.empty_policy() == EmptyPolicy::Skip {
            tracing::debug!(category = %name, "empty fresh data, skipping pass");
            return Ok(PassReport::quiet(name, ReconcileOutcome::SkippedEmpty));
        }

        // An interrupted pass leaves data ahead of the committed fingerprint.
        let baseline = snapshot.baseline()?;
        let stale = fingerprint(&snapshot.data)? != baseline;
        if fresh_fp == baseline && !stale {
            if snapshot.fingerprint.is_none() {
                snapshot.replace(fresh);
                snapshot.initialize(fresh_fp);
                return Ok(PassReport::quiet(name, ReconcileOutcome::Initialized));
            }
            return Ok(PassReport::quiet(name, ReconcileOutcome::Unchanged));
        }

        tracing::info!(category = %name, fingerprint = %fresh_fp, "data set changed, publishing");
        let entries = category.render(&fresh)?;
        snapshot.replace(fresh);

        let report = fanout::publish(&self.exchange, category.relation_name(), &entries).await;
        if !report.is_complete() {
            tracing::warn!(
                category = %name,
                failed = report.failed.len(),
                "fan-out incomplete, will retry on next trigger"
            );
            return Ok(PassReport::quiet(name, ReconcileOutcome::Partial { report }));
        }

        snapshot.commit(fresh_fp);
        let notification = Notification {
            category: name,
            revision: snapshot.revision,
        };
        Ok(PassReport {
            category: name,
            outcome: ReconcileOutcome::Synced {
                fingerprint: fresh_fp,
                report,
            },
            notification: Some(notification),
        })
    }

    /// Publish the current materialized data to one instance.
    ///
    /// Used when a new instance appears: it must receive the whole set even if
    /// nothing changed upstream.
    pub async fn seed<C>(
        &self,
        category: &C,
        snapshot: &Snapshot<C::Data>,
        relation: &RelationId,
    ) -> Result<bool>
    where
        C: SyncCategory + ?Sized,
    {
        if !self.exchange.is_leader() {
            return Ok(false);
        }
        let entries = category.render(&snapshot.data)?;
        match fanout::publish_to(&self.exchange, relation, &entries).await {
            Ok(wrote) => Ok(wrote),
            Err(e) => {
                tracing::warn!(relation = %relation, error = %e, "failed to seed relation");
                Ok(false)
            }
        }
    }

    /// Reconcile, then seed `relation` unless the pass already fanned out to it.
    pub async fn reconcile_and_seed<C>(
        &self,
        category: &C,
        snapshot: &mut Snapshot<C::Data>,
        relation: &RelationId,
    ) -> Result<PassReport>
    where
        C: SyncCategory + ?Sized,
    {
        let report = self.reconcile(category, snapshot).await?;
        let covered = match &report.outcome {
            ReconcileOutcome::Synced { report: r, .. }
            | ReconcileOutcome::Partial { report: r } => r.written.contains(relation),
            ReconcileOutcome::Passive => true,
            _ => false,
        };
        // Nothing to seed before the first successful fetch.
        let materialized = snapshot.fingerprint.is_some()
            || !matches!(
                report.outcome,
                ReconcileOutcome::SourceUnavailable(_) | ReconcileOutcome::SkippedEmpty
            );
        if !covered && materialized && relation.name == category.relation_name() {
            self.seed(category, snapshot, relation).await?;
        }
        Ok(report)
    }
}
