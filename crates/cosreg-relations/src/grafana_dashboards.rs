//! `grafana_dashboard` interface
//!
//! Dashboards are published as a single `dashboards` bucket value holding a
//! template per dashboard and a `uuid` that changes whenever any template
//! does. Template ids carry the origin: `file:<stem>` for dashboards shipped
//! with the operator, `prog:<uid>` for dashboards pulled from the registry.
//!
//! Registry dashboards are replaced as a whole on every change, which also
//! removes dashboards the registry no longer lists.

use async_trait::async_trait;
use cosreg_core::fingerprint::fingerprint;
use cosreg_core::{CharmError, Topology};
use cosreg_sync::{encode_json, Category, DataSource, EmptyPolicy, SourceError, SyncCategory};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Relation of the built-in dashboards
pub const RELATION_NAME: &str = "grafana-dashboard";

/// Relation of the per-device dashboards
pub const DEVICES_RELATION_NAME: &str = "grafana-dashboard-devices";

/// Bucket key carrying the dashboards payload
pub const DATA_KEY: &str = "dashboards";

/// Template id -> dashboard JSON text
pub type Dashboards = BTreeMap<String, String>;

/// One dashboard as stored by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDashboard {
    /// Dashboard uid in the registry
    pub uid: String,
    /// Grafana dashboard model
    pub dashboard: Value,
}

/// One entry of the `templates` map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardTemplate {
    /// Publishing charm
    pub charm: String,
    /// Dashboard JSON text
    pub content: String,
    /// Topology of the publisher
    pub juju_topology: BTreeMap<String, String>,
    /// Whether Grafana should add topology dropdowns
    pub inject_dropdowns: bool,
    /// Stable alternative uid
    pub dashboard_alt_uid: String,
}

/// Wire form of the `dashboards` bucket value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardsPayload {
    /// Templates by id
    pub templates: BTreeMap<String, DashboardTemplate>,
    /// Content fingerprint; changes with any template
    pub uuid: String,
}

/// Turn registry dashboards into templates, writing each registry uid into
/// its dashboard model.
pub fn from_registry(
    records: impl IntoIterator<Item = RegistryDashboard>,
) -> Result<Dashboards, SourceError> {
    let mut dashboards = Dashboards::new();
    for mut record in records {
        let Some(model) = record.dashboard.as_object_mut() else {
            return Err(SourceError::Malformed(format!(
                "dashboard '{}' is not a JSON object",
                record.uid
            )));
        };
        model.insert("uid".to_string(), Value::String(record.uid.clone()));
        let content = encode_json(&record.dashboard)
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        dashboards.insert(format!("prog:{}", record.uid), content);
    }
    Ok(dashboards)
}

/// Dashboards shipped with the operator, one `*.json` file each.
#[derive(Debug, Clone)]
pub struct DashboardDirSource {
    dir: PathBuf,
}

impl DashboardDirSource {
    /// Source over the files of `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DataSource<Dashboards> for DashboardDirSource {
    async fn fetch(&self) -> Result<Dashboards, SourceError> {
        let unavailable =
            |e: std::io::Error| SourceError::Unavailable(format!("{}: {e}", self.dir.display()));

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(unavailable)?;
        let mut dashboards = Dashboards::new();
        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path).await.map_err(unavailable)?;
            serde_json::from_str::<Value>(&content).map_err(|e| {
                SourceError::Malformed(format!("{}: {e}", path.display()))
            })?;
            dashboards.insert(format!("file:{stem}"), content);
        }
        tracing::debug!(
            dir = %self.dir.display(),
            count = dashboards.len(),
            "loaded built-in dashboards"
        );
        Ok(dashboards)
    }
}

/// Provider half of `grafana_dashboard`
#[derive(Debug, Clone)]
pub struct GrafanaDashboardProvider<S> {
    category: Category,
    relation_name: String,
    source: S,
    topology: Topology,
    inject_dropdowns: bool,
    empty_policy: EmptyPolicy,
}

impl<S> GrafanaDashboardProvider<S> {
    /// Dashboards shipped with the operator
    pub fn builtin(source: S, topology: Topology) -> Self {
        Self {
            category: Category::Dashboards,
            relation_name: RELATION_NAME.to_string(),
            source,
            topology,
            inject_dropdowns: true,
            empty_policy: EmptyPolicy::Replace,
        }
    }

    /// Per-device dashboards from the registry. An empty listing is treated as
    /// "registry has nothing to say" and skipped.
    pub fn devices(source: S, topology: Topology) -> Self {
        Self {
            category: Category::DeviceDashboards,
            relation_name: DEVICES_RELATION_NAME.to_string(),
            source,
            topology,
            inject_dropdowns: false,
            empty_policy: EmptyPolicy::Skip,
        }
    }

    fn alt_uid(&self, template_id: &str) -> Result<String, CharmError> {
        let seed = format!("{}_{template_id}", self.topology.identifier());
        Ok(fingerprint(&seed)?.to_hex().chars().take(16).collect())
    }

    fn template(&self, id: &str, content: &str) -> Result<DashboardTemplate, CharmError> {
        let t = &self.topology;
        Ok(DashboardTemplate {
            charm: t.charm_name.clone(),
            content: content.to_string(),
            juju_topology: BTreeMap::from([
                ("model".to_string(), t.model.clone()),
                ("model_uuid".to_string(), t.model_uuid.clone()),
                ("application".to_string(), t.application.clone()),
                ("unit".to_string(), t.unit.clone()),
            ]),
            inject_dropdowns: self.inject_dropdowns,
            dashboard_alt_uid: self.alt_uid(id)?,
        })
    }

    /// Full bucket payload for `dashboards`.
    pub fn payload(&self, dashboards: &Dashboards) -> Result<DashboardsPayload, CharmError> {
        let templates = dashboards
            .iter()
            .map(|(id, content)| Ok((id.clone(), self.template(id, content)?)))
            .collect::<Result<BTreeMap<_, _>, CharmError>>()?;
        let uuid = fingerprint(&templates)?.to_hex();
        Ok(DashboardsPayload { templates, uuid })
    }
}

#[async_trait]
impl<S: DataSource<Dashboards>> SyncCategory for GrafanaDashboardProvider<S> {
    type Data = Dashboards;

    fn category(&self) -> Category {
        self.category
    }

    fn relation_name(&self) -> &str {
        &self.relation_name
    }

    async fn fetch(&self) -> Result<Dashboards, SourceError> {
        self.source.fetch().await
    }

    fn render(&self, data: &Dashboards) -> Result<BTreeMap<String, String>, CharmError> {
        Ok(BTreeMap::from([(
            DATA_KEY.to_string(),
            encode_json(&self.payload(data)?)?,
        )]))
    }

    fn empty_policy(&self) -> EmptyPolicy {
        self.empty_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_uid_is_injected() {
        let dashboards = from_registry(vec![RegistryDashboard {
            uid: "robot-1-overview".into(),
            dashboard: json!({"title": "Robot 1", "panels": []}),
        }])
        .unwrap();

        let content: Value = serde_json::from_str(&dashboards["prog:robot-1-overview"]).unwrap();
        assert_eq!(content["uid"], "robot-1-overview");
        assert_eq!(content["title"], "Robot 1");
    }

    #[test]
    fn non_object_dashboards_are_malformed() {
        let result = from_registry(vec![RegistryDashboard {
            uid: "x".into(),
            dashboard: json!([1, 2]),
        }]);
        assert!(matches!(result, Err(SourceError::Malformed(_))));
    }
}
