//! `blackbox_exporter_probes` interface
//!
//! The provider publishes Blackbox exporter probe jobs (`scrape_probes`),
//! custom exporter modules (`scrape_modules`) and its Juju topology
//! (`scrape_metadata`). Job and module names are prefixed with the topology so
//! probes from several deployments never collide on the exporter.
//!
//! The requirer aggregates probes and modules across all of its relations.

use async_trait::async_trait;
use cosreg_core::{
    CharmError, RelationEffects, RelationExchange, RelationId, RelationLifecycle, Result, Topology,
};
use cosreg_sync::{encode_json, Category, DataSource, SourceError, SyncCategory};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default relation name
pub const RELATION_NAME: &str = "blackbox-probes";

/// Bucket key carrying the topology
pub const METADATA_KEY: &str = "scrape_metadata";
/// Bucket key carrying the probe jobs
pub const PROBES_KEY: &str = "scrape_probes";
/// Bucket key carrying the exporter modules
pub const MODULES_KEY: &str = "scrape_modules";

/// Module parameters of a probe job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeParams {
    /// Exporter modules the job probes with
    #[serde(default)]
    pub module: Vec<String>,
}

/// Static targets of a probe job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConfig {
    /// Probed endpoints
    pub targets: Vec<String>,
    /// Extra labels attached to the series
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// One Prometheus scrape job routed through the exporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeJob {
    /// Job name
    pub job_name: String,
    /// Exporter path, `/probe` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_path: Option<String>,
    /// Module selection
    #[serde(default)]
    pub params: ProbeParams,
    /// Targets
    #[serde(default)]
    pub static_configs: Vec<StaticConfig>,
}

/// Materialized probe data of the provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSet {
    /// Unprefixed probe jobs
    #[serde(default)]
    pub probes: Vec<ProbeJob>,
    /// Unprefixed custom modules
    #[serde(default)]
    pub modules: BTreeMap<String, Value>,
}

/// One row of the registry `devices/?fields=uid,address` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAddress {
    /// Device uid
    pub uid: String,
    /// Reachable address of the device
    pub address: String,
}

/// HTTP 2xx probe of the server's own health endpoint
pub fn self_probe(health_url: &str) -> ProbeJob {
    ProbeJob {
        job_name: "blackbox_http_2xx".to_string(),
        metrics_path: None,
        params: ProbeParams {
            module: vec!["http_2xx".to_string()],
        },
        static_configs: vec![StaticConfig {
            targets: vec![health_url.to_string()],
            labels: BTreeMap::from([("name".to_string(), "cos-registration-server".to_string())]),
        }],
    }
}

/// ICMP probe of one registered device
pub fn device_probe(device: &DeviceAddress) -> ProbeJob {
    ProbeJob {
        job_name: format!("blackbox_icmp_{}", device.uid),
        metrics_path: Some("/probe".to_string()),
        params: ProbeParams {
            module: vec!["icmp".to_string()],
        },
        static_configs: vec![StaticConfig {
            targets: vec![device.address.clone()],
            labels: BTreeMap::from([("name".to_string(), device.uid.clone())]),
        }],
    }
}

/// Self probe followed by one probe per device, devices ordered by uid
pub fn probe_set(health_url: &str, devices: &[DeviceAddress]) -> ProbeSet {
    let mut devices: Vec<&DeviceAddress> = devices.iter().collect();
    devices.sort_by(|a, b| a.uid.cmp(&b.uid));

    let mut probes = vec![self_probe(health_url)];
    probes.extend(devices.into_iter().map(device_probe));
    ProbeSet {
        probes,
        modules: BTreeMap::new(),
    }
}

/// `juju_<model>_<uuid[..8]>_<application>_`
pub fn name_prefix(topology: &Topology) -> String {
    let short_uuid: String = topology.model_uuid.chars().take(8).collect();
    format!(
        "juju_{}_{}_{}_",
        topology.model, short_uuid, topology.application
    )
}

/// Apply the topology prefix to job names, custom modules and the module
/// references that point at them. Exporter built-in modules keep their name.
pub fn prefixed(set: &ProbeSet, prefix: &str) -> ProbeSet {
    let probes = set
        .probes
        .iter()
        .map(|job| {
            let mut job = job.clone();
            job.job_name = format!("{prefix}{}", job.job_name);
            for module in &mut job.params.module {
                if set.modules.contains_key(module.as_str()) {
                    *module = format!("{prefix}{module}");
                }
            }
            job
        })
        .collect();
    let modules = set
        .modules
        .iter()
        .map(|(name, module)| (format!("{prefix}{name}"), module.clone()))
        .collect();
    ProbeSet { probes, modules }
}

/// Provider half of `blackbox_exporter_probes`
#[derive(Debug, Clone)]
pub struct BlackboxProbesProvider<S> {
    source: S,
    topology: Topology,
    relation_name: String,
}

impl<S> BlackboxProbesProvider<S> {
    /// Provider for `topology` on the default relation name
    pub fn new(source: S, topology: Topology) -> Self {
        Self {
            source,
            topology,
            relation_name: RELATION_NAME.to_string(),
        }
    }
}

#[async_trait]
impl<S: DataSource<ProbeSet>> SyncCategory for BlackboxProbesProvider<S> {
    type Data = ProbeSet;

    fn category(&self) -> Category {
        Category::BlackboxProbes
    }

    fn relation_name(&self) -> &str {
        &self.relation_name
    }

    async fn fetch(&self) -> std::result::Result<ProbeSet, SourceError> {
        self.source.fetch().await
    }

    fn render(&self, data: &ProbeSet) -> std::result::Result<BTreeMap<String, String>, CharmError> {
        let wire = prefixed(data, &name_prefix(&self.topology));
        Ok(BTreeMap::from([
            (METADATA_KEY.to_string(), encode_json(&self.topology.as_map())?),
            (PROBES_KEY.to_string(), encode_json(&wire.probes)?),
            (MODULES_KEY.to_string(), encode_json(&wire.modules)?),
        ]))
    }
}

/// Requirer half of `blackbox_exporter_probes`
#[derive(Debug, Clone)]
pub struct BlackboxProbesRequirer {
    relation_name: String,
}

impl Default for BlackboxProbesRequirer {
    fn default() -> Self {
        Self::new(RELATION_NAME)
    }
}

impl BlackboxProbesRequirer {
    /// Requirer on `relation_name`
    pub fn new(relation_name: impl Into<String>) -> Self {
        Self {
            relation_name: relation_name.into(),
        }
    }

    /// Relation whose targets changed, if this lifecycle event concerns one.
    ///
    /// Both changed and departed events reshape the aggregated target list.
    pub fn targets_changed<'r>(
        &self,
        lifecycle: RelationLifecycle,
        relation: &'r RelationId,
    ) -> Option<&'r RelationId> {
        let relevant = matches!(
            lifecycle,
            RelationLifecycle::Changed | RelationLifecycle::Departed
        );
        (relevant && relation.name == self.relation_name).then_some(relation)
    }

    /// Probe jobs published by every related provider.
    pub async fn probes<R>(&self, exchange: &RelationExchange<'_, R>) -> Result<Vec<ProbeJob>>
    where
        R: RelationEffects + ?Sized,
    {
        let mut probes = Vec::new();
        for relation in exchange.relation_ids(&self.relation_name).await? {
            if let Some(jobs) = exchange.read::<Vec<ProbeJob>>(&relation, PROBES_KEY).await? {
                probes.extend(jobs);
            }
        }
        Ok(probes)
    }

    /// Exporter modules published by every related provider; later relations win on name clashes.
    pub async fn modules<R>(
        &self,
        exchange: &RelationExchange<'_, R>,
    ) -> Result<BTreeMap<String, Value>>
    where
        R: RelationEffects + ?Sized,
    {
        let mut modules = BTreeMap::new();
        for relation in exchange.relation_ids(&self.relation_name).await? {
            if let Some(found) = exchange
                .read::<BTreeMap<String, Value>>(&relation, MODULES_KEY)
                .await?
            {
                modules.extend(found);
            }
        }
        Ok(modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn topology() -> Topology {
        Topology {
            model: "lab".into(),
            model_uuid: "0123456789abcdef".into(),
            application: "cos-registration-server".into(),
            unit: "cos-registration-server/0".into(),
            charm_name: "cos-registration-server-k8s".into(),
        }
    }

    #[test]
    fn prefix_uses_short_uuid() {
        assert_eq!(
            name_prefix(&topology()),
            "juju_lab_01234567_cos-registration-server_"
        );
    }

    #[test]
    fn custom_modules_and_their_references_are_prefixed() {
        let mut set = probe_set("http://host/health/", &[]);
        set.probes[0].params.module.push("http_2xx_longer_timeout".into());
        set.modules.insert(
            "http_2xx_longer_timeout".into(),
            json!({"prober": "http", "timeout": "30s"}),
        );

        let wire = prefixed(&set, "p_");

        assert_eq!(wire.probes[0].job_name, "p_blackbox_http_2xx");
        assert_eq!(
            wire.probes[0].params.module,
            vec!["http_2xx".to_string(), "p_http_2xx_longer_timeout".to_string()]
        );
        assert!(wire.modules.contains_key("p_http_2xx_longer_timeout"));
    }

    #[test]
    fn device_probes_follow_the_self_probe_in_uid_order() {
        let devices = vec![
            DeviceAddress {
                uid: "robot-b".into(),
                address: "10.0.0.2".into(),
            },
            DeviceAddress {
                uid: "robot-a".into(),
                address: "10.0.0.1".into(),
            },
        ];

        let set = probe_set("http://host/health/", &devices);

        let names: Vec<_> = set.probes.iter().map(|p| p.job_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["blackbox_http_2xx", "blackbox_icmp_robot-a", "blackbox_icmp_robot-b"]
        );
        assert_eq!(set.probes[1].static_configs[0].targets, vec!["10.0.0.1"]);
        assert_eq!(set.probes[1].metrics_path.as_deref(), Some("/probe"));
    }

    #[test]
    fn unset_metrics_path_is_not_serialized() {
        let wire = serde_json::to_value(self_probe("http://h/")).unwrap();
        assert!(wire.get("metrics_path").is_none());
    }

    #[test]
    fn only_changed_and_departed_reshape_targets() {
        let requirer = BlackboxProbesRequirer::default();
        let rel = RelationId::new(RELATION_NAME, 4);
        assert!(requirer
            .targets_changed(RelationLifecycle::Changed, &rel)
            .is_some());
        assert!(requirer
            .targets_changed(RelationLifecycle::Departed, &rel)
            .is_some());
        assert!(requirer
            .targets_changed(RelationLifecycle::Joined, &rel)
            .is_none());
        assert!(requirer
            .targets_changed(RelationLifecycle::Changed, &RelationId::new("ingress", 1))
            .is_none());
    }
}
