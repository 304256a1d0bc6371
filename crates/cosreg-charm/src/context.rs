//! Hook environment
//!
//! The controller describes the event being delivered through `JUJU_*`
//! environment variables. Everything here is read once at start-up.

use cosreg_core::{CharmError, RelationId, Result, Topology};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Charm name published in dashboards and scrape metadata
pub const CHARM_NAME: &str = "cos-registration-server-k8s";

/// Snapshot of the hook environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    /// Coordinates of this unit
    pub topology: Topology,
    /// Charm root directory
    pub charm_dir: PathBuf,
    /// `hooks/<name>` or `actions/<name>`
    pub dispatch_path: String,
    /// Relation of a relation hook
    pub relation: Option<RelationId>,
    /// Remote unit of a relation hook
    pub remote_unit: Option<String>,
    /// Container of a pebble-ready hook
    pub workload_name: Option<String>,
    /// Action name of an action
    pub action_name: Option<String>,
}

impl HookContext {
    /// Read the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: BTreeMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("JUJU_"))
            .collect();
        Self::from_vars(&vars)
    }

    /// Build from an explicit variable map.
    pub fn from_vars(vars: &BTreeMap<String, String>) -> Result<Self> {
        let required = |name: &str| {
            vars.get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| CharmError::invalid(format!("{name} is not set")))
        };
        let optional = |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned();

        let unit = required("JUJU_UNIT_NAME")?;
        let application = unit
            .split_once('/')
            .map(|(app, _)| app.to_string())
            .ok_or_else(|| CharmError::invalid(format!("malformed unit name '{unit}'")))?;

        let relation = optional("JUJU_RELATION_ID")
            .map(|id| id.parse::<RelationId>())
            .transpose()?;

        Ok(Self {
            topology: Topology {
                model: required("JUJU_MODEL_NAME")?,
                model_uuid: required("JUJU_MODEL_UUID")?,
                application,
                unit,
                charm_name: CHARM_NAME.to_string(),
            },
            charm_dir: PathBuf::from(optional("JUJU_CHARM_DIR").unwrap_or_else(|| ".".to_string())),
            dispatch_path: required("JUJU_DISPATCH_PATH")?,
            relation,
            remote_unit: optional("JUJU_REMOTE_UNIT"),
            workload_name: optional("JUJU_WORKLOAD_NAME"),
            action_name: optional("JUJU_ACTION_NAME"),
        })
    }

    /// In-cluster DNS name of this unit's pod
    pub fn pod_fqdn(&self) -> String {
        let t = &self.topology;
        let pod = t.unit.replace('/', "-");
        format!(
            "{pod}.{}-endpoints.{}.svc.cluster.local",
            t.application, t.model
        )
    }
}
