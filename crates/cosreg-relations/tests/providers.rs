//! Provider categories driven through the reconciliation engine

use assert_matches::assert_matches;
use cosreg_core::{RelationExchange, Snapshot};
use cosreg_relations::alert_rules::{self, AlertRulesProvider, RuleFile};
use cosreg_relations::auth_devices_keys::{self, AuthDevicesKeysProvider};
use cosreg_relations::blackbox_probes::{self, probe_set, BlackboxProbesProvider, DeviceAddress};
use cosreg_relations::catalogue::{CatalogueItem, CatalogueProvider};
use cosreg_relations::devices_keys::{self, DevicesKeysProvider, KeyFileSource};
use cosreg_relations::grafana_dashboards::{
    self, DashboardDirSource, Dashboards, DashboardsPayload, GrafanaDashboardProvider,
};
use cosreg_relations::traefik_route::{self, TraefikRouteProvider};
use cosreg_sync::{ReconcileEngine, ReconcileOutcome, SourceError};
use cosreg_testkit::{keys, test_topology, MockRelations, ScriptedSource};
use serde_json::{json, Value};

#[tokio::test]
async fn auth_keys_reach_every_relation() {
    let relations = MockRelations::leader();
    let a = relations.add_relation(auth_devices_keys::RELATION_NAME);
    let b = relations.add_relation(auth_devices_keys::RELATION_NAME);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let provider = AuthDevicesKeysProvider::new(source.clone());
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    for rel in [&a, &b] {
        assert_eq!(
            relations.local_value(rel, auth_devices_keys::DATA_KEY).as_deref(),
            Some(r#"{"0":"ssh-rsa AAA"}"#)
        );
    }
}

#[tokio::test]
async fn key_file_is_published_wrapped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devices_keys");
    std::fs::write(&path, r#"{"robot-1": "ssh-ed25519 AAAA"}"#).unwrap();
    let relations = MockRelations::leader();
    let rel = relations.add_relation(devices_keys::RELATION_NAME);
    let provider = DevicesKeysProvider::new(KeyFileSource::new(&path));
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    assert_eq!(
        relations.local_value(&rel, devices_keys::DATA_KEY).as_deref(),
        Some(r#"{"ssh_keys":{"robot-1":"ssh-ed25519 AAAA"}}"#)
    );
}

#[tokio::test]
async fn missing_key_file_keeps_published_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devices_keys");
    std::fs::write(&path, r#"{"robot-1": "ssh-ed25519 AAAA"}"#).unwrap();
    let relations = MockRelations::leader();
    let rel = relations.add_relation(devices_keys::RELATION_NAME);
    let provider = DevicesKeysProvider::new(KeyFileSource::new(&path));
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    std::fs::remove_file(&path).unwrap();
    let report = engine.reconcile(&provider, &mut snapshot).await.unwrap();

    assert_matches!(
        report.outcome,
        ReconcileOutcome::SourceUnavailable(SourceError::Unavailable(_))
    );
    assert!(relations
        .local_value(&rel, devices_keys::DATA_KEY)
        .unwrap()
        .contains("robot-1"));
}

#[tokio::test]
async fn garbage_key_file_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devices_keys");
    std::fs::write(&path, "not json").unwrap();
    let relations = MockRelations::leader();
    let provider = DevicesKeysProvider::new(KeyFileSource::new(&path));
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    let report = engine.reconcile(&provider, &mut snapshot).await.unwrap();

    assert_matches!(
        report.outcome,
        ReconcileOutcome::SourceUnavailable(SourceError::Malformed(_))
    );
}

#[tokio::test]
async fn probes_are_prefixed_with_topology() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(blackbox_probes::RELATION_NAME);
    let devices = vec![DeviceAddress {
        uid: "robot-1".into(),
        address: "10.0.0.1".into(),
    }];
    let source = ScriptedSource::new(probe_set("http://cos/health/", &devices));
    let provider = BlackboxProbesProvider::new(source, test_topology());
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    let probes: Value = serde_json::from_str(
        &relations
            .local_value(&rel, blackbox_probes::PROBES_KEY)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(
        probes[0]["job_name"],
        "juju_testmodel_f2c1b2a5_cos-registration-server_blackbox_http_2xx"
    );
    assert_eq!(
        probes[1]["job_name"],
        "juju_testmodel_f2c1b2a5_cos-registration-server_blackbox_icmp_robot-1"
    );

    let metadata: Value = serde_json::from_str(
        &relations
            .local_value(&rel, blackbox_probes::METADATA_KEY)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["model"], "testmodel");
    assert_eq!(
        relations
            .local_value(&rel, blackbox_probes::MODULES_KEY)
            .as_deref(),
        Some("{}")
    );
}

#[tokio::test]
async fn new_device_republishes_probes() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(blackbox_probes::RELATION_NAME);
    let source = ScriptedSource::new(probe_set("http://cos/health/", &[]));
    let provider = BlackboxProbesProvider::new(source.clone(), test_topology());
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    source.set(probe_set(
        "http://cos/health/",
        &[DeviceAddress {
            uid: "robot-9".into(),
            address: "10.0.0.9".into(),
        }],
    ));
    let report = engine.reconcile(&provider, &mut snapshot).await.unwrap();

    assert!(report.notification.is_some());
    assert!(relations
        .local_value(&rel, blackbox_probes::PROBES_KEY)
        .unwrap()
        .contains("robot-9"));
}

#[tokio::test]
async fn builtin_dashboards_come_from_json_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("overview.json"), r#"{"title": "Overview"}"#).unwrap();
    std::fs::write(dir.path().join("README.md"), "ignored").unwrap();
    let relations = MockRelations::leader();
    let rel = relations.add_relation(grafana_dashboards::RELATION_NAME);
    let provider =
        GrafanaDashboardProvider::builtin(DashboardDirSource::new(dir.path()), test_topology());
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    let payload: DashboardsPayload = serde_json::from_str(
        &relations
            .local_value(&rel, grafana_dashboards::DATA_KEY)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(payload.templates.len(), 1);
    let template = &payload.templates["file:overview"];
    assert!(template.inject_dropdowns);
    assert_eq!(template.charm, "cos-registration-server-k8s");
    assert_eq!(template.juju_topology["model"], "testmodel");
    assert_eq!(template.content, r#"{"title": "Overview"}"#);
}

#[tokio::test]
async fn missing_dashboard_dir_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let relations = MockRelations::leader();
    let provider = GrafanaDashboardProvider::builtin(
        DashboardDirSource::new(dir.path().join("nope")),
        test_topology(),
    );
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    let report = engine.reconcile(&provider, &mut snapshot).await.unwrap();

    assert_matches!(report.outcome, ReconcileOutcome::SourceUnavailable(_));
}

#[tokio::test]
async fn device_dashboards_are_replaced_wholesale() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(grafana_dashboards::DEVICES_RELATION_NAME);
    let one = grafana_dashboards::from_registry(vec![
        grafana_dashboards::RegistryDashboard {
            uid: "robot-1".into(),
            dashboard: json!({"title": "Robot 1"}),
        },
        grafana_dashboards::RegistryDashboard {
            uid: "robot-2".into(),
            dashboard: json!({"title": "Robot 2"}),
        },
    ])
    .unwrap();
    let source = ScriptedSource::new(one);
    let provider = GrafanaDashboardProvider::devices(source.clone(), test_topology());
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    let two = grafana_dashboards::from_registry(vec![grafana_dashboards::RegistryDashboard {
        uid: "robot-2".into(),
        dashboard: json!({"title": "Robot 2"}),
    }])
    .unwrap();
    source.set(two);
    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    let payload: DashboardsPayload = serde_json::from_str(
        &relations
            .local_value(&rel, grafana_dashboards::DATA_KEY)
            .unwrap(),
    )
    .unwrap();
    let ids: Vec<_> = payload.templates.keys().cloned().collect();
    assert_eq!(ids, vec!["prog:robot-2".to_string()]);
    assert!(!payload.templates["prog:robot-2"].inject_dropdowns);
}

#[tokio::test]
async fn empty_device_dashboard_listing_is_skipped() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(grafana_dashboards::DEVICES_RELATION_NAME);
    let source = ScriptedSource::new(Dashboards::from([(
        "prog:robot-1".to_string(),
        r#"{"uid":"robot-1"}"#.to_string(),
    )]));
    let provider = GrafanaDashboardProvider::devices(source.clone(), test_topology());
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    source.set(Dashboards::new());
    let report = engine.reconcile(&provider, &mut snapshot).await.unwrap();

    assert_eq!(report.outcome, ReconcileOutcome::SkippedEmpty);
    assert!(relations
        .local_value(&rel, grafana_dashboards::DATA_KEY)
        .unwrap()
        .contains("prog:robot-1"));
}

#[tokio::test]
async fn dashboard_uuid_tracks_content() {
    let provider =
        GrafanaDashboardProvider::builtin(ScriptedSource::<Dashboards>::default(), test_topology());
    let a = Dashboards::from([("file:a".to_string(), "{}".to_string())]);
    let b = Dashboards::from([("file:a".to_string(), r#"{"x":1}"#.to_string())]);

    let first = provider.payload(&a).unwrap();
    let again = provider.payload(&a).unwrap();
    let changed = provider.payload(&b).unwrap();

    assert_eq!(first.uuid, again.uuid);
    assert_ne!(first.uuid, changed.uuid);
    assert_eq!(
        first.templates["file:a"].dashboard_alt_uid,
        changed.templates["file:a"].dashboard_alt_uid
    );
}

#[tokio::test]
async fn rule_files_are_order_independent() {
    let files: Vec<RuleFile> = serde_json::from_value(json!([
        {"uid": "b", "rules": {"groups": [{"name": "g", "rules": []}]}},
        {"uid": "a", "rules": {"groups": [{"name": "g", "rules": []}]}}
    ]))
    .unwrap();
    let mut reversed = files.clone();
    reversed.reverse();

    let relations = MockRelations::leader();
    let rel = relations.add_relation(alert_rules::LOKI_RELATION_NAME);
    let source = ScriptedSource::new(files);
    let provider = AlertRulesProvider::loki(source.clone(), test_topology());
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    source.set(reversed);
    let report = engine.reconcile(&provider, &mut snapshot).await.unwrap();

    assert_eq!(report.outcome, ReconcileOutcome::Unchanged);
    let rules: Value = serde_json::from_str(
        &relations
            .local_value(&rel, alert_rules::DATA_KEY)
            .unwrap(),
    )
    .unwrap();
    let identifier = test_topology().identifier();
    assert_eq!(rules["groups"][0]["name"], format!("{identifier}_a_g"));
    assert_eq!(rules["groups"][1]["name"], format!("{identifier}_b_g"));
}

#[tokio::test]
async fn prometheus_rules_use_metrics_endpoint() {
    let relations = MockRelations::leader();
    let logging = relations.add_relation(alert_rules::LOKI_RELATION_NAME);
    let metrics = relations.add_relation(alert_rules::PROMETHEUS_RELATION_NAME);
    let files: Vec<RuleFile> = serde_json::from_value(json!([
        {"uid": "robot-1", "rules": {"groups": [{"name": "cpu", "rules": []}]}}
    ]))
    .unwrap();
    let provider = AlertRulesProvider::prometheus(ScriptedSource::new(files), test_topology());
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    assert!(relations.local_value(&metrics, alert_rules::DATA_KEY).is_some());
    assert!(relations.local_data(&logging).is_empty());
}

#[tokio::test]
async fn ingress_waits_for_external_host() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(traefik_route::RELATION_NAME);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    let pending = TraefikRouteProvider::new(test_topology(), None, "http://pod:8000");
    let report = engine.reconcile(&pending, &mut snapshot).await.unwrap();
    assert_matches!(
        report.outcome,
        ReconcileOutcome::SourceUnavailable(SourceError::NotReady(_))
    );
    assert!(relations.local_data(&rel).is_empty());

    let ready = TraefikRouteProvider::new(
        test_topology(),
        Some("cos.example.com".into()),
        "http://pod:8000",
    );
    engine.reconcile(&ready, &mut snapshot).await.unwrap();
    let config: Value = serde_json::from_str(
        &relations
            .local_value(&rel, traefik_route::CONFIG_KEY)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(
        config["http"]["routers"]["juju-testmodel-cos-registration-server-router"]["rule"],
        "PathPrefix(`/testmodel-cos-registration-server`)"
    );
}

#[tokio::test]
async fn catalogue_fields_are_plain_strings() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation("catalogue");
    let provider = CatalogueProvider::new(CatalogueItem::registration_server(
        "http://cos.example.com/testmodel-cos-registration-server",
    ));
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    engine.reconcile(&provider, &mut snapshot).await.unwrap();

    let data = relations.local_data(&rel);
    assert_eq!(data["name"], "COS registration server");
    assert_eq!(
        data["url"],
        "http://cos.example.com/testmodel-cos-registration-server/devices/"
    );
    assert_eq!(data["icon"], "graph-line-variant");
    assert_eq!(data["description"], "COS registration server to register devices.");
}
