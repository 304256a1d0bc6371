//! The operator
//!
//! [`dispatch_table`] names every handler that runs for every trigger kind;
//! [`Charm`] executes those handlers against the effect interfaces of one hook
//! invocation.

use crate::admin::{get_admin_password, AdminPasswordOutcome};
use crate::api::{Endpoints, RegistryApi, LOKI_RULES_PATH, PROMETHEUS_RULES_PATH};
use crate::config::CharmConfig;
use crate::context::HookContext;
use crate::sources::{DeviceDashboardsSource, DeviceKeysSource, ProbesSource, RuleFilesSource};
use crate::state::UnitState;
use crate::status::{StatusCollector, UnitEffects, UnitStatus};
use crate::workload::update_layer_and_restart;
use async_trait::async_trait;
use cosreg_core::{
    RelationEffects, RelationExchange, RelationId, RelationLifecycle, Result, StateStore,
    WorkloadEffects,
};
use cosreg_relations::{
    alert_rules, auth_devices_keys, blackbox_probes, catalogue, devices_keys, grafana_dashboards,
    traefik_route, AlertRulesProvider, AuthDevicesKeysProvider, BlackboxProbesProvider,
    CatalogueItem, CatalogueProvider, DashboardDirSource, DevicesKeysProvider,
    GrafanaDashboardProvider, KeyFileSource, TraefikRouteProvider, TraefikRouteRequirer,
};
use cosreg_sync::{
    Category, DispatchTable, ReconcileEngine, ReconcileOutcome, SyncCategory, Trigger,
    TriggerHandler, TriggerKind,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Name of the admin password action
pub const ADMIN_PASSWORD_ACTION: &str = "get-admin-password";

/// Work items routed by the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Leader only: when ingress is ready, update the layer and publish the route
    ConfigureIngress,
    /// Run one reconciliation pass
    Reconcile(Category),
    /// Reconcile the category bound to the triggering relation and seed it
    SeedRelation,
    /// Re-read the ingress external host, emit `IngressReady` when it appears
    RefreshIngress,
    /// Set the server up and apply its layer
    UpdateLayer,
    /// Forget the applied layer
    ResetLayer,
    /// Report when the workload container is not up
    CheckContainer,
    /// `get-admin-password`
    AdminPassword,
}

/// Relation a category is published on
pub fn relation_name(category: Category) -> &'static str {
    match category {
        Category::AuthDevicesKeys => auth_devices_keys::RELATION_NAME,
        Category::DevicesKeys => devices_keys::RELATION_NAME,
        Category::Dashboards => grafana_dashboards::RELATION_NAME,
        Category::DeviceDashboards => grafana_dashboards::DEVICES_RELATION_NAME,
        Category::LokiRules => alert_rules::LOKI_RELATION_NAME,
        Category::PrometheusRules => alert_rules::PROMETHEUS_RELATION_NAME,
        Category::BlackboxProbes => blackbox_probes::RELATION_NAME,
        Category::Ingress => traefik_route::RELATION_NAME,
        Category::Catalogue => catalogue::RELATION_NAME,
    }
}

/// Category published on `relation`
pub fn bound_category(relation: &str) -> Option<Category> {
    Category::ALL
        .into_iter()
        .find(|category| relation_name(*category) == relation)
}

fn relation_kind(lifecycle: RelationLifecycle, category: Category) -> TriggerKind {
    TriggerKind::Relation(lifecycle, relation_name(category).to_string())
}

/// Trigger kind -> handlers of the operator
pub fn dispatch_table() -> DispatchTable<Handler> {
    use Category::*;

    let startup = [
        AuthDevicesKeys,
        DevicesKeys,
        Dashboards,
        LokiRules,
        PrometheusRules,
    ]
    .map(Handler::Reconcile);
    let periodic = [
        DeviceDashboards,
        AuthDevicesKeys,
        BlackboxProbes,
        LokiRules,
        PrometheusRules,
    ]
    .map(Handler::Reconcile);

    let mut table = DispatchTable::new()
        .on(TriggerKind::LeaderElected, Handler::ConfigureIngress)
        .on_all(TriggerKind::LeaderElected, startup)
        .on_all(TriggerKind::UpgradeCharm, startup)
        .on(TriggerKind::ConfigChanged, Handler::ConfigureIngress)
        .on_all(
            TriggerKind::ConfigChanged,
            [Handler::Reconcile(BlackboxProbes), Handler::Reconcile(Catalogue)],
        )
        .on(TriggerKind::UpdateStatus, Handler::CheckContainer)
        .on_all(TriggerKind::UpdateStatus, periodic)
        .on_all(
            TriggerKind::PebbleReady,
            [
                Handler::ResetLayer,
                Handler::UpdateLayer,
                Handler::Reconcile(Catalogue),
            ],
        )
        .on(
            relation_kind(RelationLifecycle::Joined, Ingress),
            Handler::ConfigureIngress,
        )
        .on(
            relation_kind(RelationLifecycle::Joined, BlackboxProbes),
            Handler::Reconcile(BlackboxProbes),
        )
        .on(
            relation_kind(RelationLifecycle::Changed, Ingress),
            Handler::RefreshIngress,
        )
        .on(
            relation_kind(RelationLifecycle::Changed, AuthDevicesKeys),
            Handler::Reconcile(AuthDevicesKeys),
        )
        .on(
            relation_kind(RelationLifecycle::Changed, DevicesKeys),
            Handler::Reconcile(DevicesKeys),
        )
        .on(
            relation_kind(RelationLifecycle::Broken, Ingress),
            Handler::Reconcile(Catalogue),
        )
        .on(
            TriggerKind::Changed(AuthDevicesKeys),
            Handler::Reconcile(BlackboxProbes),
        )
        .on_all(
            TriggerKind::IngressReady,
            [
                Handler::UpdateLayer,
                Handler::Reconcile(Ingress),
                Handler::Reconcile(BlackboxProbes),
                Handler::Reconcile(Catalogue),
            ],
        )
        .on(
            TriggerKind::Action(ADMIN_PASSWORD_ACTION.to_string()),
            Handler::AdminPassword,
        );

    for category in Category::ALL {
        table.register(
            relation_kind(RelationLifecycle::Created, category),
            Handler::SeedRelation,
        );
    }
    table
}

/// Effect interfaces of one invocation
#[derive(Clone, Copy)]
pub struct Effects<'a> {
    /// Relation buckets
    pub relations: &'a dyn RelationEffects,
    /// Workload container
    pub workload: &'a dyn WorkloadEffects,
    /// Unit state
    pub store: &'a dyn StateStore,
    /// Registry API
    pub registry: &'a dyn RegistryApi,
    /// Status and action results
    pub unit: &'a dyn UnitEffects,
}

/// Handler executor for one hook invocation
pub struct Charm<'a> {
    config: &'a CharmConfig,
    ctx: &'a HookContext,
    effects: Effects<'a>,
    is_leader: bool,
    rng: StdRng,
    status: StatusCollector,
}

impl<'a> Charm<'a> {
    /// Operator bound to `effects`; leadership is sampled once per invocation.
    pub fn new(
        config: &'a CharmConfig,
        ctx: &'a HookContext,
        effects: Effects<'a>,
        is_leader: bool,
    ) -> Self {
        Self {
            config,
            ctx,
            effects,
            is_leader,
            rng: StdRng::from_entropy(),
            status: StatusCollector::default(),
        }
    }

    /// Use `rng` for password generation
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Statuses reported so far
    pub fn status(&self) -> &StatusCollector {
        &self.status
    }

    /// Publish the most severe reported status, if any.
    pub async fn publish_status(&self) -> Result<()> {
        match self.status.highest() {
            Some(status) => self.effects.unit.set_status(status).await,
            None => Ok(()),
        }
    }

    fn exchange(&self) -> RelationExchange<'a, dyn RelationEffects + 'a> {
        RelationExchange::new(self.effects.relations, self.is_leader)
    }

    fn state(&self) -> UnitState<'a, dyn StateStore + 'a> {
        UnitState::new(self.effects.store)
    }

    /// `<scheme>://<pod fqdn>:<port>`
    pub fn internal_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.config.scheme,
            self.ctx.pod_fqdn(),
            self.config.port
        )
    }

    async fn external_host(&self) -> Option<String> {
        match TraefikRouteRequirer::default()
            .external_host(&self.exchange())
            .await
        {
            Ok(host) => host,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read ingress external host");
                None
            }
        }
    }

    /// URL the server is reached on
    pub async fn external_url(&self) -> String {
        let host = self.external_host().await;
        traefik_route::external_url(
            &self.ctx.topology,
            &self.config.scheme,
            host.as_deref(),
            &self.internal_url(),
        )
    }

    async fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.external_url().await, &self.config.api_base)
    }

    async fn run<C>(&self, category: &C, seed: Option<&RelationId>) -> Result<Vec<Trigger>>
    where
        C: SyncCategory,
    {
        let name = category.category();
        let state = self.state();
        let mut snapshot = state.snapshot::<C::Data>(name).await?;
        let engine = ReconcileEngine::new(self.exchange());
        let report = match seed {
            Some(relation) => {
                engine
                    .reconcile_and_seed(category, &mut snapshot, relation)
                    .await?
            }
            None => engine.reconcile(category, &mut snapshot).await?,
        };

        let touched = !matches!(
            report.outcome,
            ReconcileOutcome::Passive
                | ReconcileOutcome::SourceUnavailable(_)
                | ReconcileOutcome::SkippedEmpty
                | ReconcileOutcome::Unchanged
        );
        if touched {
            state.save_snapshot(name, &snapshot).await?;
        }
        Ok(report.notification.map(Trigger::Changed).into_iter().collect())
    }

    /// One pass of `category`, seeding `seed` when given.
    pub async fn reconcile(
        &self,
        category: Category,
        seed: Option<&RelationId>,
    ) -> Result<Vec<Trigger>> {
        let topology = self.ctx.topology.clone();
        let api = self.effects.registry;
        match category {
            Category::AuthDevicesKeys => {
                let endpoints = self.endpoints().await;
                let provider = AuthDevicesKeysProvider::new(DeviceKeysSource::new(api, &endpoints));
                self.run(&provider, seed).await
            }
            Category::DevicesKeys => {
                let source = KeyFileSource::new(&self.config.devices_keys_file);
                self.run(&DevicesKeysProvider::new(source), seed).await
            }
            Category::Dashboards => {
                let source =
                    DashboardDirSource::new(self.ctx.charm_dir.join(&self.config.dashboards_dir));
                self.run(&GrafanaDashboardProvider::builtin(source, topology), seed)
                    .await
            }
            Category::DeviceDashboards => {
                let endpoints = self.endpoints().await;
                let source = DeviceDashboardsSource::new(api, &endpoints);
                self.run(&GrafanaDashboardProvider::devices(source, topology), seed)
                    .await
            }
            Category::LokiRules => {
                let endpoints = self.endpoints().await;
                let source = RuleFilesSource::new(api, &endpoints, LOKI_RULES_PATH);
                self.run(&AlertRulesProvider::loki(source, topology), seed)
                    .await
            }
            Category::PrometheusRules => {
                let endpoints = self.endpoints().await;
                let source = RuleFilesSource::new(api, &endpoints, PROMETHEUS_RULES_PATH);
                self.run(&AlertRulesProvider::prometheus(source, topology), seed)
                    .await
            }
            Category::BlackboxProbes => {
                let endpoints = self.endpoints().await;
                let source = ProbesSource::new(api, &endpoints);
                self.run(&BlackboxProbesProvider::new(source, topology), seed)
                    .await
            }
            Category::Ingress => {
                let host = self.external_host().await;
                let provider = TraefikRouteProvider::new(topology, host, self.internal_url());
                self.run(&provider, seed).await
            }
            Category::Catalogue => {
                let item = CatalogueItem::registration_server(&self.external_url().await);
                self.run(&CatalogueProvider::new(item), seed).await
            }
        }
    }

    async fn update_layer(&mut self) -> Result<()> {
        let host = self.external_host().await;
        let status = update_layer_and_restart(
            self.effects.workload,
            &self.state(),
            self.config,
            &self.ctx.topology,
            host.as_deref(),
        )
        .await?;
        self.status.add(status);
        Ok(())
    }

    async fn configure_ingress(&mut self) -> Result<Vec<Trigger>> {
        if !self.is_leader {
            return Ok(Vec::new());
        }
        if self.external_host().await.is_none() {
            tracing::debug!("ingress not ready");
            return Ok(Vec::new());
        }
        self.update_layer().await?;
        self.reconcile(Category::Ingress, None).await
    }

    async fn refresh_ingress(&self) -> Result<Vec<Trigger>> {
        let state = self.state();
        let mut known = state.external_host().await?;
        let changed = TraefikRouteRequirer::default()
            .refresh(&self.exchange(), &mut known)
            .await?;
        if !changed {
            return Ok(Vec::new());
        }
        state.set_external_host(known.as_deref()).await?;
        Ok(match known {
            Some(_) => vec![Trigger::IngressReady],
            None => Vec::new(),
        })
    }

    async fn admin_password(&mut self) -> Result<()> {
        let external_url = self.external_url().await;
        let outcome = get_admin_password(
            self.effects.workload,
            &self.state(),
            self.config,
            &external_url,
            &mut self.rng,
        )
        .await?;
        match outcome {
            AdminPasswordOutcome::Results(results) => self.effects.unit.action_set(&results).await,
            AdminPasswordOutcome::Failed(message) => self.effects.unit.action_fail(&message).await,
        }
    }
}

#[async_trait]
impl TriggerHandler<Handler> for Charm<'_> {
    async fn handle(&mut self, handler: &Handler, trigger: &Trigger) -> Result<Vec<Trigger>> {
        match handler {
            Handler::ConfigureIngress => self.configure_ingress().await,
            Handler::Reconcile(category) => self.reconcile(*category, None).await,
            Handler::SeedRelation => {
                let Trigger::Relation { relation, .. } = trigger else {
                    return Ok(Vec::new());
                };
                match bound_category(&relation.name) {
                    Some(category) => self.reconcile(category, Some(relation)).await,
                    None => Ok(Vec::new()),
                }
            }
            Handler::RefreshIngress => self.refresh_ingress().await,
            Handler::UpdateLayer => {
                self.update_layer().await?;
                Ok(Vec::new())
            }
            Handler::ResetLayer => {
                self.state().reset_workload_layer().await?;
                Ok(Vec::new())
            }
            Handler::CheckContainer => {
                if !self.effects.workload.can_connect().await {
                    self.status.add(UnitStatus::Maintenance(
                        "Waiting for pod startup to complete".to_string(),
                    ));
                }
                Ok(Vec::new())
            }
            Handler::AdminPassword => {
                self.admin_password().await?;
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_its_relation() {
        for category in Category::ALL {
            assert_eq!(bound_category(relation_name(category)), Some(category));
        }
        assert_eq!(bound_category("tracing"), None);
    }

    #[test]
    fn every_relation_creation_seeds() {
        let table = dispatch_table();
        for category in Category::ALL {
            let kind = relation_kind(RelationLifecycle::Created, category);
            assert_eq!(table.handlers(&kind), &[Handler::SeedRelation]);
        }
    }

    #[test]
    fn leader_election_configures_ingress_first() {
        let table = dispatch_table();
        let handlers = table.handlers(&TriggerKind::LeaderElected);
        assert_eq!(handlers.first(), Some(&Handler::ConfigureIngress));
        assert_eq!(handlers.len(), 6);
    }

    #[test]
    fn device_changes_refresh_probes() {
        let table = dispatch_table();
        assert_eq!(
            table.handlers(&TriggerKind::Changed(Category::AuthDevicesKeys)),
            &[Handler::Reconcile(Category::BlackboxProbes)]
        );
    }

    #[test]
    fn install_does_nothing() {
        assert!(dispatch_table().handlers(&TriggerKind::Install).is_empty());
    }
}
