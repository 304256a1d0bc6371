//! Reconciliation pass behavior against in-memory relations

use assert_matches::assert_matches;
use cosreg_core::{
    state::{get_or_default, set_typed},
    MemoryStateStore, RelationExchange, Snapshot, SyncState,
};
use cosreg_sync::{Category, ReconcileEngine, ReconcileOutcome, SourceError};
use cosreg_testkit::{keys, MockRelations, ScriptedCategory, ScriptedSource};
use std::collections::BTreeMap;

type Keys = BTreeMap<String, String>;

const RELATION: &str = "auth-devices-keys";
const KEY: &str = "auth_devices_keys";

fn keys_category(source: &ScriptedSource<Keys>) -> ScriptedCategory<Keys> {
    ScriptedCategory::new(Category::AuthDevicesKeys, RELATION, KEY, source.clone())
}

fn list_category(source: &ScriptedSource<Vec<String>>) -> ScriptedCategory<Vec<String>> {
    ScriptedCategory::new(Category::LokiRules, "logging", "alert_rules", source.clone())
}

#[tokio::test]
async fn second_pass_over_same_data_writes_nothing() {
    let relations = MockRelations::leader();
    relations.add_relation(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    let first = engine.reconcile(&category, &mut snapshot).await.unwrap();
    assert!(first.notification.is_some());
    let writes = relations.write_count();

    let second = engine.reconcile(&category, &mut snapshot).await.unwrap();
    assert_eq!(second.outcome, ReconcileOutcome::Unchanged);
    assert!(second.notification.is_none());
    assert_eq!(relations.write_count(), writes);
}

#[tokio::test]
async fn added_element_is_one_write_per_relation_and_one_notification() {
    let relations = MockRelations::leader();
    let a = relations.add_relation("logging");
    let b = relations.add_relation("logging");
    let source = ScriptedSource::new(vec!["k1".to_string()]);
    let category = list_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    engine.reconcile(&category, &mut snapshot).await.unwrap();
    relations.clear_writes();

    source.set(vec!["k1".to_string(), "k2".to_string()]);
    let report = engine.reconcile(&category, &mut snapshot).await.unwrap();

    assert_eq!(relations.writes_to(&a), 1);
    assert_eq!(relations.writes_to(&b), 1);
    assert_eq!(report.notification.map(|n| n.revision), Some(2));
    assert_eq!(
        relations.local_value(&a, "alert_rules").as_deref(),
        Some(r#"["k1","k2"]"#)
    );
}

#[tokio::test]
async fn empty_first_pass_only_initializes() {
    let relations = MockRelations::leader();
    relations.add_relation(RELATION);
    let source = ScriptedSource::<Keys>::default();
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    assert_eq!(snapshot.sync_state().unwrap(), SyncState::Uninitialized);

    let report = engine.reconcile(&category, &mut snapshot).await.unwrap();

    assert_eq!(report.outcome, ReconcileOutcome::Initialized);
    assert!(report.notification.is_none());
    assert_eq!(relations.write_count(), 0);
    assert_eq!(snapshot.sync_state().unwrap(), SyncState::Synced);
    assert_eq!(snapshot.revision, 0);
}

#[tokio::test]
async fn followers_neither_fetch_nor_write() {
    let relations = MockRelations::follower();
    relations.add_relation(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, false));
    let mut snapshot = Snapshot::default();

    let report = engine.reconcile(&category, &mut snapshot).await.unwrap();

    assert_eq!(report.outcome, ReconcileOutcome::Passive);
    assert_eq!(source.fetch_count(), 0);
    assert_eq!(relations.write_count(), 0);
    assert_eq!(snapshot, Snapshot::default());
}

#[tokio::test]
async fn device_keys_are_published_as_canonical_json() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    let first = engine.reconcile(&category, &mut snapshot).await.unwrap();
    assert_matches!(first.outcome, ReconcileOutcome::Synced { .. });
    assert_eq!(
        relations.local_value(&rel, KEY).as_deref(),
        Some(r#"{"0":"ssh-rsa AAA"}"#)
    );

    source.set(keys(&[("0", "ssh-rsa AAA"), ("1", "ssh-rsa BBB")]));
    let second = engine.reconcile(&category, &mut snapshot).await.unwrap();
    assert_matches!(second.outcome, ReconcileOutcome::Synced { .. });
    assert_eq!(
        relations.local_value(&rel, KEY).as_deref(),
        Some(r#"{"0":"ssh-rsa AAA","1":"ssh-rsa BBB"}"#)
    );
}

#[tokio::test]
async fn partial_fan_out_is_retried_on_next_pass() {
    let relations = MockRelations::leader();
    let good = relations.add_relation(RELATION);
    let bad = relations.add_relation(RELATION);
    relations.fail_writes(&bad);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    let first = engine.reconcile(&category, &mut snapshot).await.unwrap();
    assert_matches!(&first.outcome, ReconcileOutcome::Partial { report } => {
        assert_eq!(report.written, vec![good.clone()]);
        assert_eq!(report.failed.len(), 1);
    });
    assert!(first.notification.is_none());
    assert_eq!(snapshot.fingerprint, None);
    assert_eq!(snapshot.data, keys(&[("0", "ssh-rsa AAA")]));

    relations.heal(&bad);
    let second = engine.reconcile(&category, &mut snapshot).await.unwrap();
    assert_matches!(second.outcome, ReconcileOutcome::Synced { .. });
    assert!(second.notification.is_some());
    assert!(relations.local_value(&bad, KEY).is_some());
    assert_eq!(snapshot.sync_state().unwrap(), SyncState::Synced);
}

#[tokio::test]
async fn partial_after_sync_leaves_snapshot_stale() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&category, &mut snapshot).await.unwrap();

    relations.fail_writes(&rel);
    source.set(keys(&[("0", "ssh-rsa AAA"), ("1", "ssh-rsa BBB")]));
    let report = engine.reconcile(&category, &mut snapshot).await.unwrap();

    assert_matches!(report.outcome, ReconcileOutcome::Partial { .. });
    assert_eq!(snapshot.sync_state().unwrap(), SyncState::Stale);
    assert_eq!(snapshot.revision, 1);
}

#[tokio::test]
async fn unlistable_relation_is_partial() {
    let relations = MockRelations::leader();
    relations.fail_listing(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    let report = engine.reconcile(&category, &mut snapshot).await.unwrap();

    assert_matches!(&report.outcome, ReconcileOutcome::Partial { report } => {
        assert!(report.listing_error.is_some());
    });
    assert_eq!(snapshot.fingerprint, None);
}

#[tokio::test]
async fn unavailable_source_keeps_prior_state() {
    let relations = MockRelations::leader();
    relations.add_relation(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&category, &mut snapshot).await.unwrap();
    let before = snapshot.clone();
    let writes = relations.write_count();

    source.fail(SourceError::Unavailable("connection refused".into()));
    let report = engine.reconcile(&category, &mut snapshot).await.unwrap();

    assert_matches!(report.outcome, ReconcileOutcome::SourceUnavailable(_));
    assert_eq!(snapshot, before);
    assert_eq!(relations.write_count(), writes);
}

#[tokio::test]
async fn skip_policy_ignores_empty_results() {
    let relations = MockRelations::leader();
    relations.add_relation("grafana-dashboard-devices");
    let source = ScriptedSource::new(vec!["dash".to_string()]);
    let category = ScriptedCategory::new(
        Category::DeviceDashboards,
        "grafana-dashboard-devices",
        "dashboards",
        source.clone(),
    )
    .skipping_empty();
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&category, &mut snapshot).await.unwrap();
    let before = snapshot.clone();

    source.set(Vec::new());
    let report = engine.reconcile(&category, &mut snapshot).await.unwrap();

    assert_eq!(report.outcome, ReconcileOutcome::SkippedEmpty);
    assert_eq!(snapshot, before);
}

#[tokio::test]
async fn empty_result_replaces_the_set_by_default() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&category, &mut snapshot).await.unwrap();

    source.set(Keys::new());
    let report = engine.reconcile(&category, &mut snapshot).await.unwrap();

    assert_matches!(report.outcome, ReconcileOutcome::Synced { .. });
    assert_eq!(relations.local_value(&rel, KEY).as_deref(), Some("{}"));
    assert!(snapshot.data.is_empty());
}

#[tokio::test]
async fn new_relation_is_seeded_with_current_data() {
    let relations = MockRelations::leader();
    relations.add_relation(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&category, &mut snapshot).await.unwrap();

    let joined = relations.add_relation(RELATION);
    let report = engine
        .reconcile_and_seed(&category, &mut snapshot, &joined)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReconcileOutcome::Unchanged);
    assert_eq!(
        relations.local_value(&joined, KEY).as_deref(),
        Some(r#"{"0":"ssh-rsa AAA"}"#)
    );
}

#[tokio::test]
async fn seeding_does_not_repeat_a_fan_out_write() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    engine
        .reconcile_and_seed(&category, &mut snapshot, &rel)
        .await
        .unwrap();

    assert_eq!(relations.writes_to(&rel), 1);
}

#[tokio::test]
async fn seeding_ignores_foreign_relations() {
    let relations = MockRelations::leader();
    relations.add_relation(RELATION);
    let other = relations.add_relation("ingress");
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();
    engine.reconcile(&category, &mut snapshot).await.unwrap();

    engine
        .reconcile_and_seed(&category, &mut snapshot, &other)
        .await
        .unwrap();

    assert!(relations.local_data(&other).is_empty());
}

#[tokio::test]
async fn persisted_snapshot_survives_a_restart() {
    let store = MemoryStateStore::new();
    let relations = MockRelations::leader();
    relations.add_relation(RELATION);
    let source = ScriptedSource::new(keys(&[("0", "ssh-rsa AAA")]));
    let category = keys_category(&source);

    {
        let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
        let mut snapshot: Snapshot<Keys> =
            get_or_default(&store, "auth-devices-keys").await.unwrap();
        engine.reconcile(&category, &mut snapshot).await.unwrap();
        set_typed(&store, "auth-devices-keys", &snapshot).await.unwrap();
    }
    relations.clear_writes();

    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot: Snapshot<Keys> = get_or_default(&store, "auth-devices-keys").await.unwrap();
    let report = engine.reconcile(&category, &mut snapshot).await.unwrap();

    assert_eq!(report.outcome, ReconcileOutcome::Unchanged);
    assert_eq!(relations.write_count(), 0);
}

#[tokio::test]
async fn nothing_is_seeded_before_the_first_fetch() {
    let relations = MockRelations::leader();
    let rel = relations.add_relation(RELATION);
    let source: ScriptedSource<Keys> = ScriptedSource::default();
    source.fail(SourceError::Unavailable("registry down".into()));
    let category = keys_category(&source);
    let engine = ReconcileEngine::new(RelationExchange::new(&relations, true));
    let mut snapshot = Snapshot::default();

    engine
        .reconcile_and_seed(&category, &mut snapshot, &rel)
        .await
        .unwrap();

    assert!(relations.local_data(&rel).is_empty());
}
