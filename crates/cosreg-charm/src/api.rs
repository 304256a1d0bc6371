//! Registration server REST API client
//!
//! The registry is polled through the server's own external URL, so the base
//! URL changes with ingress and is passed per call.

use async_trait::async_trait;
use cosreg_core::{CharmError, Result};
use cosreg_sync::SourceError;
use serde_json::Value;
use std::time::Duration;

/// Registry collection listing device SSH keys
pub const DEVICE_KEYS_PATH: &str = "devices/?fields=uid,public_ssh_key";
/// Registry collection listing device addresses
pub const DEVICE_ADDRESSES_PATH: &str = "devices/?fields=uid,address";
/// Registry collection of Grafana dashboards
pub const GRAFANA_DASHBOARDS_PATH: &str = "applications/grafana/dashboards/";
/// Registry collection of Loki alert rules
pub const LOKI_RULES_PATH: &str = "applications/loki/alert_rules/";
/// Registry collection of Prometheus alert rules
pub const PROMETHEUS_RULES_PATH: &str = "applications/prometheus/alert_rules/";
/// Health endpoint probed by the blackbox exporter
pub const HEALTH_PATH: &str = "health/";

/// Read access to the registry
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// GET `url` and decode the JSON body
    async fn get_json(&self, url: &str) -> std::result::Result<Value, SourceError>;
}

/// Joins the base URL, API prefix and collection path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    /// Endpoints under `<base_url><api_base>`
    pub fn new(base_url: &str, api_base: &str) -> Self {
        Self {
            base: format!("{}{api_base}", base_url.trim_end_matches('/')),
        }
    }

    /// Full URL of `path`
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

/// [`RegistryApi`] over HTTP
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
}

impl RegistryClient {
    /// Client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CharmError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl RegistryApi for RegistryClient {
    async fn get_json(&self, url: &str) -> std::result::Result<Value, SourceError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                tracing::error!(url, error = %e, "registry request failed");
                SourceError::Unavailable(format!("{url}: {e}"))
            })?;
        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::Malformed(format!("{url}: {e}")))
    }
}
