//! Data categories
//!
//! A category couples one upstream data source with one relation name. Every
//! category has its own snapshot and its own fingerprint space; fingerprints
//! are never compared across categories.

use async_trait::async_trait;
use cosreg_core::CharmError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Every category the operator reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Public SSH keys of registered devices, from the registry API
    AuthDevicesKeys,
    /// Public SSH keys of devices, from a local key file
    DevicesKeys,
    /// Dashboards shipped with the operator
    Dashboards,
    /// Per-device dashboards, from the registry API
    DeviceDashboards,
    /// Loki alert rules, from the registry API
    LokiRules,
    /// Prometheus alert rules, from the registry API
    PrometheusRules,
    /// Blackbox exporter probe jobs
    BlackboxProbes,
    /// Traefik route configuration
    Ingress,
    /// Catalogue entry
    Catalogue,
}

impl Category {
    /// All categories in dispatch order
    pub const ALL: [Category; 9] = [
        Category::AuthDevicesKeys,
        Category::DevicesKeys,
        Category::Dashboards,
        Category::DeviceDashboards,
        Category::LokiRules,
        Category::PrometheusRules,
        Category::BlackboxProbes,
        Category::Ingress,
        Category::Catalogue,
    ];

    /// Stable name, also the state store key of the category snapshot
    pub fn as_str(self) -> &'static str {
        match self {
            Category::AuthDevicesKeys => "auth-devices-keys",
            Category::DevicesKeys => "devices-keys",
            Category::Dashboards => "dashboards",
            Category::DeviceDashboards => "device-dashboards",
            Category::LokiRules => "loki-rules",
            Category::PrometheusRules => "prometheus-rules",
            Category::BlackboxProbes => "blackbox-probes",
            Category::Ingress => "ingress",
            Category::Catalogue => "catalogue",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why fresh data could not be produced
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Source could not be reached (network error, non-2xx, missing file)
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Source answered with something we cannot use
    #[error("malformed source data: {0}")]
    Malformed(String),

    /// A precondition for computing the data does not hold yet
    #[error("source not ready: {0}")]
    NotReady(String),
}

/// What an empty fresh result means for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyPolicy {
    /// Empty is valid data and replaces the set
    Replace,
    /// Empty is treated as "no data this pass"
    Skip,
}

/// Anything that can produce fresh data of type `T`
#[async_trait]
pub trait DataSource<T>: Send + Sync {
    /// Pull the current upstream value
    async fn fetch(&self) -> Result<T, SourceError>;
}

/// One reconciled data category
#[async_trait]
pub trait SyncCategory: Send + Sync {
    /// Materialized data set
    type Data: Serialize + DeserializeOwned + Default + Clone + Send + Sync;

    /// Which category this is
    fn category(&self) -> Category;

    /// Relation the data set is published on
    fn relation_name(&self) -> &str;

    /// Pull fresh data
    async fn fetch(&self) -> Result<Self::Data, SourceError>;

    /// Encode the data set into bucket entries (key -> encoded value)
    fn render(&self, data: &Self::Data) -> Result<BTreeMap<String, String>, CharmError>;

    /// Treatment of an empty fresh result
    fn empty_policy(&self) -> EmptyPolicy {
        EmptyPolicy::Replace
    }
}

/// Encode `value` as canonical JSON for a bucket.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CharmError> {
    Ok(cosreg_core::fingerprint::canonical_json(
        &serde_json::to_value(value)?,
    ))
}
