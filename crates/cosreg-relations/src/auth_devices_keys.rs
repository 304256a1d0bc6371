//! `auth_devices_keys` interface
//!
//! The provider publishes the public SSH keys of every device registered in
//! the registry, as a JSON map `uid -> key` under `auth_devices_keys`.

use crate::mirror::RemoteMirror;
use async_trait::async_trait;
use cosreg_core::CharmError;
use cosreg_sync::{encode_json, Category, DataSource, SourceError, SyncCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default relation name
pub const RELATION_NAME: &str = "auth-devices-keys";

/// Bucket key carrying the key map
pub const DATA_KEY: &str = "auth_devices_keys";

/// Device uid -> public SSH key
pub type DeviceKeys = BTreeMap<String, String>;

/// One row of the registry `devices/?fields=uid,public_ssh_key` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKeyRecord {
    /// Device uid
    pub uid: String,
    /// Public key, unset for devices that never uploaded one
    #[serde(default)]
    pub public_ssh_key: Option<String>,
}

/// Collapse registry rows into the published map; devices without a key are left out.
pub fn keys_from_records(records: impl IntoIterator<Item = DeviceKeyRecord>) -> DeviceKeys {
    records
        .into_iter()
        .filter_map(|r| match r.public_ssh_key {
            Some(key) if !key.is_empty() => Some((r.uid, key)),
            _ => None,
        })
        .collect()
}

/// Provider half of `auth_devices_keys`
#[derive(Debug, Clone)]
pub struct AuthDevicesKeysProvider<S> {
    source: S,
    relation_name: String,
}

impl<S> AuthDevicesKeysProvider<S> {
    /// Provider on the default relation name
    pub fn new(source: S) -> Self {
        Self::with_relation(source, RELATION_NAME)
    }

    /// Provider on a custom relation name
    pub fn with_relation(source: S, relation_name: impl Into<String>) -> Self {
        Self {
            source,
            relation_name: relation_name.into(),
        }
    }
}

#[async_trait]
impl<S: DataSource<DeviceKeys>> SyncCategory for AuthDevicesKeysProvider<S> {
    type Data = DeviceKeys;

    fn category(&self) -> Category {
        Category::AuthDevicesKeys
    }

    fn relation_name(&self) -> &str {
        &self.relation_name
    }

    async fn fetch(&self) -> Result<DeviceKeys, SourceError> {
        self.source.fetch().await
    }

    fn render(&self, data: &DeviceKeys) -> Result<BTreeMap<String, String>, CharmError> {
        Ok(BTreeMap::from([(DATA_KEY.to_string(), encode_json(data)?)]))
    }
}

/// Requirer half: a mirror of the provider's key map
pub fn consumer(relation_name: &str) -> RemoteMirror<DeviceKeys> {
    RemoteMirror::new(relation_name, DATA_KEY)
}
