//! Trigger dispatch
//!
//! An explicit table maps each trigger kind to an ordered list of handlers.
//! One externally delivered trigger is processed to completion, then any local
//! notifications it produced are drained from the queue in FIFO order. There
//! is no hidden subscription: whatever is not in the table does not run.

use crate::engine::Notification;
use crate::Category;
use async_trait::async_trait;
use cosreg_core::{RelationId, RelationLifecycle, Result};
use std::collections::{HashMap, VecDeque};

/// Upper bound on triggers handled per dispatch, guards notification cycles
pub const MAX_TRIGGERS_PER_DISPATCH: usize = 64;

/// Something that happened and may require reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Unit installed
    Install,
    /// This unit became leader
    LeaderElected,
    /// Operator code was upgraded
    UpgradeCharm,
    /// Operator configuration changed
    ConfigChanged,
    /// Periodic status tick
    UpdateStatus,
    /// The workload supervisor came up
    PebbleReady {
        /// Container name
        container: String,
    },
    /// Relation lifecycle event
    Relation {
        /// Which lifecycle transition
        lifecycle: RelationLifecycle,
        /// Instance concerned
        relation: RelationId,
        /// Remote unit for joined/departed/changed
        remote_unit: Option<String>,
    },
    /// Operator action invoked
    Action {
        /// Action name
        name: String,
    },
    /// Local: a category data set changed
    Changed(Notification),
    /// Local: ingress reported a (new) external host
    IngressReady,
}

impl Trigger {
    /// Convenience constructor for relation triggers
    pub fn relation(lifecycle: RelationLifecycle, relation: RelationId) -> Self {
        Self::Relation {
            lifecycle,
            relation,
            remote_unit: None,
        }
    }

    /// Routing key
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Install => TriggerKind::Install,
            Trigger::LeaderElected => TriggerKind::LeaderElected,
            Trigger::UpgradeCharm => TriggerKind::UpgradeCharm,
            Trigger::ConfigChanged => TriggerKind::ConfigChanged,
            Trigger::UpdateStatus => TriggerKind::UpdateStatus,
            Trigger::PebbleReady { .. } => TriggerKind::PebbleReady,
            Trigger::Relation {
                lifecycle,
                relation,
                ..
            } => TriggerKind::Relation(*lifecycle, relation.name.clone()),
            Trigger::Action { name } => TriggerKind::Action(name.clone()),
            Trigger::Changed(n) => TriggerKind::Changed(n.category),
            Trigger::IngressReady => TriggerKind::IngressReady,
        }
    }

    /// Whether the trigger originated inside this process
    pub fn is_local(&self) -> bool {
        matches!(self, Trigger::Changed(_) | Trigger::IngressReady)
    }
}

/// Routing key of a [`Trigger`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// See [`Trigger::Install`]
    Install,
    /// See [`Trigger::LeaderElected`]
    LeaderElected,
    /// See [`Trigger::UpgradeCharm`]
    UpgradeCharm,
    /// See [`Trigger::ConfigChanged`]
    ConfigChanged,
    /// See [`Trigger::UpdateStatus`]
    UpdateStatus,
    /// See [`Trigger::PebbleReady`]
    PebbleReady,
    /// Lifecycle transition on a relation name
    Relation(RelationLifecycle, String),
    /// Action name
    Action(String),
    /// Category change notification
    Changed(Category),
    /// See [`Trigger::IngressReady`]
    IngressReady,
}

/// Trigger kind -> ordered handlers
#[derive(Debug, Clone)]
pub struct DispatchTable<H> {
    routes: HashMap<TriggerKind, Vec<H>>,
}

impl<H> Default for DispatchTable<H> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<H> DispatchTable<H> {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the route of `kind`
    pub fn on(mut self, kind: TriggerKind, handler: H) -> Self {
        self.register(kind, handler);
        self
    }

    /// Append every handler in order
    pub fn on_all(mut self, kind: TriggerKind, handlers: impl IntoIterator<Item = H>) -> Self {
        for handler in handlers {
            self.register(kind.clone(), handler);
        }
        self
    }

    /// Append `handler` to the route of `kind`
    pub fn register(&mut self, kind: TriggerKind, handler: H) {
        self.routes.entry(kind).or_default().push(handler);
    }

    /// Handlers routed for `kind`, in registration order
    pub fn handlers(&self, kind: &TriggerKind) -> &[H] {
        self.routes.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of routed kinds
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether nothing is routed
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Executes handlers named in a [`DispatchTable`]
#[async_trait]
pub trait TriggerHandler<H: Sync>: Send {
    /// Run `handler` for `trigger`; returned triggers are queued
    async fn handle(&mut self, handler: &H, trigger: &Trigger) -> Result<Vec<Trigger>>;
}

/// Record of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchLog {
    /// Triggers processed, in order
    pub processed: Vec<TriggerKind>,
    /// Handler failures (trigger kind, error)
    pub failures: Vec<(TriggerKind, String)>,
    /// Whether the queue was cut at [`MAX_TRIGGERS_PER_DISPATCH`]
    pub truncated: bool,
}

/// Process `initial` and every local trigger it produces.
///
/// A failing handler is logged and recorded; the remaining handlers for the
/// same trigger still run.
pub async fn dispatch<H, T>(
    table: &DispatchTable<H>,
    target: &mut T,
    initial: Trigger,
) -> DispatchLog
where
    H: Sync + std::fmt::Debug,
    T: TriggerHandler<H> + ?Sized,
{
    let mut log = DispatchLog::default();
    let mut queue = VecDeque::from([initial]);

    while let Some(trigger) = queue.pop_front() {
        if log.processed.len() >= MAX_TRIGGERS_PER_DISPATCH {
            tracing::warn!(
                pending = queue.len() + 1,
                "dispatch limit reached, dropping remaining local triggers"
            );
            log.truncated = true;
            break;
        }

        let kind = trigger.kind();
        tracing::debug!(trigger = ?kind, "dispatching");
        for handler in table.handlers(&kind) {
            match target.handle(handler, &trigger).await {
                Ok(follow_ups) => queue.extend(follow_ups),
                Err(e) => {
                    tracing::error!(
                        trigger = ?kind,
                        handler = ?handler,
                        error = %e,
                        "handler failed"
                    );
                    log.failures.push((kind.clone(), e.to_string()));
                }
            }
        }
        log.processed.push(kind);
    }

    log
}
