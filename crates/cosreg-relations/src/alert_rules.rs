//! Alert rules for Loki (`logging`) and Prometheus (`metrics-endpoint`)
//!
//! The registry stores one rule file per device or application. All files are
//! merged into a single `{"groups": [...]}` document; every group name is
//! prefixed with the publisher's topology identifier and the file uid so
//! groups from different files can never shadow each other.

use async_trait::async_trait;
use cosreg_core::{CharmError, Topology};
use cosreg_sync::{encode_json, Category, DataSource, SourceError, SyncCategory};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Relation carrying Loki rules
pub const LOKI_RELATION_NAME: &str = "logging";

/// Relation carrying Prometheus rules
pub const PROMETHEUS_RELATION_NAME: &str = "metrics-endpoint";

/// Bucket key carrying the merged rules
pub const DATA_KEY: &str = "alert_rules";

/// One rule group; everything but the name is passed through untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    /// Group name
    pub name: String,
    /// `rules`, `interval` and any other group fields
    #[serde(flatten)]
    pub body: BTreeMap<String, Value>,
}

/// A rule document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroups {
    /// Groups in document order
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

/// One registry rule file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFile {
    /// Owner uid in the registry
    pub uid: String,
    /// Rule document
    #[serde(default)]
    pub rules: RuleGroups,
}

/// Merge `files` into one document with prefixed group names.
pub fn merge(files: &[RuleFile], identifier: &str) -> RuleGroups {
    let groups = files
        .iter()
        .flat_map(|file| {
            file.rules.groups.iter().map(move |group| RuleGroup {
                name: format!("{identifier}_{}_{}", file.uid, group.name),
                body: group.body.clone(),
            })
        })
        .collect();
    RuleGroups { groups }
}

/// Provider half for one rule backend
#[derive(Debug, Clone)]
pub struct AlertRulesProvider<S> {
    category: Category,
    relation_name: String,
    source: S,
    topology: Topology,
}

impl<S> AlertRulesProvider<S> {
    /// Loki rules on `logging`
    pub fn loki(source: S, topology: Topology) -> Self {
        Self {
            category: Category::LokiRules,
            relation_name: LOKI_RELATION_NAME.to_string(),
            source,
            topology,
        }
    }

    /// Prometheus rules on `metrics-endpoint`
    pub fn prometheus(source: S, topology: Topology) -> Self {
        Self {
            category: Category::PrometheusRules,
            relation_name: PROMETHEUS_RELATION_NAME.to_string(),
            source,
            topology,
        }
    }
}

#[async_trait]
impl<S: DataSource<Vec<RuleFile>>> SyncCategory for AlertRulesProvider<S> {
    type Data = Vec<RuleFile>;

    fn category(&self) -> Category {
        self.category
    }

    fn relation_name(&self) -> &str {
        &self.relation_name
    }

    async fn fetch(&self) -> Result<Vec<RuleFile>, SourceError> {
        let mut files = self.source.fetch().await?;
        // Registry listing order is not stable.
        files.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(files)
    }

    fn render(&self, data: &Vec<RuleFile>) -> Result<BTreeMap<String, String>, CharmError> {
        let merged = merge(data, &self.topology.identifier());
        Ok(BTreeMap::from([(DATA_KEY.to_string(), encode_json(&merged)?)]))
    }
}
