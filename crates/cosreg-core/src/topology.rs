//! Juju topology of the running unit
//!
//! Used to namespace everything published to observability peers (probe job
//! names, rule groups, dashboard metadata) so multiple deployments of this
//! application never collide.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Model/application/unit coordinates of this unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Model name
    pub model: String,
    /// Model UUID
    pub model_uuid: String,
    /// Application name
    pub application: String,
    /// Unit name (`app/0`)
    pub unit: String,
    /// Charm name
    pub charm_name: String,
}

impl Topology {
    /// Stable identifier `<model>_<uuid>_<application>`
    pub fn identifier(&self) -> String {
        format!("{}_{}_{}", self.model, self.model_uuid, self.application)
    }

    /// Path prefix shared by ingress routes and the workload (`<model>-<app>`)
    pub fn path_prefix(&self) -> String {
        format!("{}-{}", self.model, self.application)
    }

    /// Flat map form published as scrape metadata
    pub fn as_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("model".to_string(), self.model.clone()),
            ("model_uuid".to_string(), self.model_uuid.clone()),
            ("application".to_string(), self.application.clone()),
            ("unit".to_string(), self.unit.clone()),
            ("charm_name".to_string(), self.charm_name.clone()),
        ])
    }

    /// Label set identifying this application (no unit)
    pub fn label_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("juju_model".to_string(), self.model.clone()),
            ("juju_model_uuid".to_string(), self.model_uuid.clone()),
            ("juju_application".to_string(), self.application.clone()),
            ("juju_charm".to_string(), self.charm_name.clone()),
        ])
    }
}
