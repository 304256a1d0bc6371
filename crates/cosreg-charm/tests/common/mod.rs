//! Fakes for driving the operator end to end
#![allow(dead_code)]

use async_trait::async_trait;
use cosreg_charm::{CharmConfig, HookContext, RegistryApi, UnitEffects, UnitStatus};
use cosreg_core::{MemoryStateStore, Result};
use cosreg_sync::SourceError;
use cosreg_testkit::{test_topology, MockRelations, MockWorkload};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tempfile::TempDir;

/// Registry answering by collection path
#[derive(Default)]
pub struct FakeRegistry {
    answers: Mutex<Vec<(String, std::result::Result<Value, SourceError>)>>,
    requests: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn serve(&self, path: &str, body: Value) {
        self.answers.lock().unwrap().push((path.to_string(), Ok(body)));
    }

    pub fn fail(&self, path: &str) {
        self.answers.lock().unwrap().push((
            path.to_string(),
            Err(SourceError::Unavailable(format!("{path}: 503"))),
        ));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn get_json(&self, url: &str) -> std::result::Result<Value, SourceError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.answers
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(path, _)| url.ends_with(path.as_str()))
            .map(|(_, answer)| answer.clone())
            .unwrap_or_else(|| Err(SourceError::Unavailable(format!("{url}: 404"))))
    }
}

/// Records statuses and action results
#[derive(Default)]
pub struct RecordingUnit {
    pub statuses: Mutex<Vec<UnitStatus>>,
    pub results: Mutex<Vec<BTreeMap<String, String>>>,
    pub failures: Mutex<Vec<String>>,
}

impl RecordingUnit {
    pub fn last_status(&self) -> Option<UnitStatus> {
        self.statuses.lock().unwrap().last().cloned()
    }

    pub fn last_results(&self) -> Option<BTreeMap<String, String>> {
        self.results.lock().unwrap().last().cloned()
    }

    pub fn last_failure(&self) -> Option<String> {
        self.failures.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl UnitEffects for RecordingUnit {
    async fn set_status(&self, status: &UnitStatus) -> Result<()> {
        self.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }

    async fn action_set(&self, results: &BTreeMap<String, String>) -> Result<()> {
        self.results.lock().unwrap().push(results.clone());
        Ok(())
    }

    async fn action_fail(&self, message: &str) -> Result<()> {
        self.failures.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Everything one simulated unit needs
pub struct Unit {
    pub charm_dir: TempDir,
    pub config: CharmConfig,
    pub ctx: HookContext,
    pub relations: MockRelations,
    pub workload: MockWorkload,
    pub store: MemoryStateStore,
    pub registry: FakeRegistry,
    pub unit: RecordingUnit,
}

pub const INTERNAL_URL: &str =
    "http://cos-registration-server-0.cos-registration-server-endpoints.testmodel.svc.cluster.local:8000";

impl Unit {
    /// Leader unit with one built-in dashboard and a key file
    pub fn leader() -> Self {
        let charm_dir = tempfile::tempdir().unwrap();
        let dashboards = charm_dir.path().join("dashboards");
        std::fs::create_dir(&dashboards).unwrap();
        std::fs::write(dashboards.join("overview.json"), r#"{"title": "Overview"}"#).unwrap();
        let keys_file = charm_dir.path().join("devices_keys");
        std::fs::write(&keys_file, r#"{"robot-1": "ssh-ed25519 AAAA"}"#).unwrap();

        let config = CharmConfig {
            dashboards_dir: "dashboards".into(),
            devices_keys_file: keys_file,
            ..CharmConfig::default()
        };

        let topology = test_topology();
        let vars: BTreeMap<String, String> = [
            ("JUJU_UNIT_NAME", topology.unit.as_str()),
            ("JUJU_MODEL_NAME", topology.model.as_str()),
            ("JUJU_MODEL_UUID", topology.model_uuid.as_str()),
            ("JUJU_DISPATCH_PATH", "hooks/update-status"),
            ("JUJU_CHARM_DIR", charm_dir.path().to_str().unwrap()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let ctx = HookContext::from_vars(&vars).unwrap();

        Self {
            charm_dir,
            config,
            ctx,
            relations: MockRelations::leader(),
            workload: MockWorkload::new(),
            store: MemoryStateStore::new(),
            registry: FakeRegistry::default(),
            unit: RecordingUnit::default(),
        }
    }

    pub fn effects(&self) -> cosreg_charm::Effects<'_> {
        cosreg_charm::Effects {
            relations: &self.relations,
            workload: &self.workload,
            store: &self.store,
            registry: &self.registry,
            unit: &self.unit,
        }
    }

    pub fn charm(&self) -> cosreg_charm::Charm<'_> {
        cosreg_charm::Charm::new(
            &self.config,
            &self.ctx,
            self.effects(),
            self.relations.is_leader_now(),
        )
    }
}
