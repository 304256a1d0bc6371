//! Registry-backed data sources for the relation categories

use crate::api::{
    Endpoints, RegistryApi, DEVICE_ADDRESSES_PATH, DEVICE_KEYS_PATH, GRAFANA_DASHBOARDS_PATH,
    HEALTH_PATH,
};
use async_trait::async_trait;
use cosreg_relations::auth_devices_keys::{keys_from_records, DeviceKeyRecord, DeviceKeys};
use cosreg_relations::blackbox_probes::{probe_set, DeviceAddress, ProbeSet};
use cosreg_relations::grafana_dashboards::{from_registry, Dashboards, RegistryDashboard};
use cosreg_relations::RuleFile;
use cosreg_sync::{DataSource, SourceError};
use serde::de::DeserializeOwned;

async fn get_typed<T: DeserializeOwned>(
    api: &dyn RegistryApi,
    url: &str,
) -> Result<T, SourceError> {
    let body = api.get_json(url).await?;
    serde_json::from_value(body).map_err(|e| SourceError::Malformed(format!("{url}: {e}")))
}

/// Device uid -> SSH key, from the device listing
pub struct DeviceKeysSource<'a> {
    api: &'a dyn RegistryApi,
    url: String,
}

impl<'a> DeviceKeysSource<'a> {
    /// Source under `endpoints`
    pub fn new(api: &'a dyn RegistryApi, endpoints: &Endpoints) -> Self {
        Self {
            api,
            url: endpoints.url(DEVICE_KEYS_PATH),
        }
    }
}

#[async_trait]
impl DataSource<DeviceKeys> for DeviceKeysSource<'_> {
    async fn fetch(&self) -> Result<DeviceKeys, SourceError> {
        let records: Vec<DeviceKeyRecord> = get_typed(self.api, &self.url).await?;
        Ok(keys_from_records(records))
    }
}

/// Per-device dashboards with their registry uid injected
pub struct DeviceDashboardsSource<'a> {
    api: &'a dyn RegistryApi,
    url: String,
}

impl<'a> DeviceDashboardsSource<'a> {
    /// Source under `endpoints`
    pub fn new(api: &'a dyn RegistryApi, endpoints: &Endpoints) -> Self {
        Self {
            api,
            url: endpoints.url(GRAFANA_DASHBOARDS_PATH),
        }
    }
}

#[async_trait]
impl DataSource<Dashboards> for DeviceDashboardsSource<'_> {
    async fn fetch(&self) -> Result<Dashboards, SourceError> {
        let records: Vec<RegistryDashboard> = get_typed(self.api, &self.url).await?;
        from_registry(records)
    }
}

/// Rule files of one backend
pub struct RuleFilesSource<'a> {
    api: &'a dyn RegistryApi,
    url: String,
}

impl<'a> RuleFilesSource<'a> {
    /// Source of the collection at `path` under `endpoints`
    pub fn new(api: &'a dyn RegistryApi, endpoints: &Endpoints, path: &str) -> Self {
        Self {
            api,
            url: endpoints.url(path),
        }
    }
}

#[async_trait]
impl DataSource<Vec<RuleFile>> for RuleFilesSource<'_> {
    async fn fetch(&self) -> Result<Vec<RuleFile>, SourceError> {
        get_typed(self.api, &self.url).await
    }
}

/// Self probe plus one ICMP probe per registered device.
///
/// A failed device listing fails the whole fetch.
pub struct ProbesSource<'a> {
    api: &'a dyn RegistryApi,
    devices_url: String,
    health_url: String,
}

impl<'a> ProbesSource<'a> {
    /// Source under `endpoints`
    pub fn new(api: &'a dyn RegistryApi, endpoints: &Endpoints) -> Self {
        Self {
            api,
            devices_url: endpoints.url(DEVICE_ADDRESSES_PATH),
            health_url: endpoints.url(HEALTH_PATH),
        }
    }
}

#[async_trait]
impl DataSource<ProbeSet> for ProbesSource<'_> {
    async fn fetch(&self) -> Result<ProbeSet, SourceError> {
        let devices: Vec<DeviceAddress> = get_typed(self.api, &self.devices_url).await?;
        Ok(probe_set(&self.health_url, &devices))
    }
}
