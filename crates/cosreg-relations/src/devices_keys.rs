//! `devices_pub_keys` interface
//!
//! Same key map as [`auth_devices_keys`](crate::auth_devices_keys), but read
//! from a JSON file the server maintains on its data volume and published
//! wrapped as `{"ssh_keys": {...}}` under `devices_pub_keys`.

use crate::auth_devices_keys::DeviceKeys;
use crate::mirror::RemoteMirror;
use async_trait::async_trait;
use cosreg_core::CharmError;
use cosreg_sync::{encode_json, Category, DataSource, SourceError, SyncCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default relation name
pub const RELATION_NAME: &str = "devices-keys";

/// Bucket key carrying the wrapped key map
pub const DATA_KEY: &str = "devices_pub_keys";

/// Wire form of the bucket value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicesPubKeys {
    /// Device uid -> public SSH key
    #[serde(default)]
    pub ssh_keys: DeviceKeys,
}

/// Reads the device key map from a JSON file.
///
/// A file that cannot be read is reported as unavailable rather than empty,
/// so a transient read failure never wipes the published keys.
#[derive(Debug, Clone)]
pub struct KeyFileSource {
    path: PathBuf,
}

impl KeyFileSource {
    /// Source over `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataSource<DeviceKeys> for KeyFileSource {
    async fn fetch(&self) -> Result<DeviceKeys, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "failed to read SSH key file");
            SourceError::Unavailable(format!("{}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| SourceError::Malformed(format!("{}: {e}", self.path.display())))
    }
}

/// Provider half of `devices_pub_keys`
#[derive(Debug, Clone)]
pub struct DevicesKeysProvider<S> {
    source: S,
    relation_name: String,
}

impl<S> DevicesKeysProvider<S> {
    /// Provider on the default relation name
    pub fn new(source: S) -> Self {
        Self {
            source,
            relation_name: RELATION_NAME.to_string(),
        }
    }
}

#[async_trait]
impl<S: DataSource<DeviceKeys>> SyncCategory for DevicesKeysProvider<S> {
    type Data = DeviceKeys;

    fn category(&self) -> Category {
        Category::DevicesKeys
    }

    fn relation_name(&self) -> &str {
        &self.relation_name
    }

    async fn fetch(&self) -> Result<DeviceKeys, SourceError> {
        self.source.fetch().await
    }

    fn render(&self, data: &DeviceKeys) -> Result<BTreeMap<String, String>, CharmError> {
        let wire = DevicesPubKeys {
            ssh_keys: data.clone(),
        };
        Ok(BTreeMap::from([(DATA_KEY.to_string(), encode_json(&wire)?)]))
    }
}

/// Requirer half
pub fn consumer(relation_name: &str) -> RemoteMirror<DevicesPubKeys> {
    RemoteMirror::new(relation_name, DATA_KEY)
}
