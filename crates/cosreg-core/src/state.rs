//! Local State Store
//!
//! Unit-scoped durable key/value storage plus the typed [`Snapshot`] record
//! every data category keeps in it.
//!
//! Two handlers are provided:
//! - [`FileStateStore`]: a single JSON document on disk, survives process
//!   restarts, rewritten atomically (write to temp file, then rename)
//! - [`MemoryStateStore`]: process-local, for tests and dry runs
//!
//! Only the single event-handling path of one unit touches the store, so no
//! cross-process locking is attempted.

use crate::errors::{CharmError, Result};
use crate::fingerprint::{fingerprint, Fingerprint};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;

/// Key/value storage scoped to one unit
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Drop `key`; returns whether it existed
    async fn clear(&self, key: &str) -> Result<bool>;
}

/// Typed read with explicit default when the key was never written.
pub async fn get_or_default<T, S>(store: &S, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
    S: StateStore + ?Sized,
{
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value).map_err(|e| {
            CharmError::serialization(format!("stored value for '{key}' is malformed: {e}"))
        }),
        None => Ok(T::default()),
    }
}

/// Typed write.
pub async fn set_typed<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    S: StateStore + ?Sized,
{
    store.set(key, serde_json::to_value(value)?).await
}

// =============================================================================
// Snapshot
// =============================================================================

/// Reconciliation state of one data category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No fingerprint was ever stored
    Uninitialized,
    /// Stored fingerprint matches the materialized data
    Synced,
    /// Materialized data moved past the stored fingerprint (an interrupted pass)
    Stale,
}

/// Last-seen fingerprint plus the materialized data set of one category.
///
/// The data is only ever replaced as a whole via [`Snapshot::replace`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned + Default"))]
pub struct Snapshot<T> {
    /// Fingerprint of `data` as of the last completed pass
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
    /// Materialized data set published to peers
    #[serde(default)]
    pub data: T,
    /// Count of completed change transitions
    #[serde(default)]
    pub revision: u64,
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            fingerprint: None,
            data: T::default(),
            revision: 0,
        }
    }
}

impl<T: Serialize + Default> Snapshot<T> {
    /// Fingerprint the pass should compare against.
    ///
    /// An uninitialized snapshot compares as the fingerprint of the empty data
    /// set, so an empty first fetch is not a change.
    pub fn baseline(&self) -> Result<Fingerprint> {
        match self.fingerprint {
            Some(fp) => Ok(fp),
            None => fingerprint(&T::default()),
        }
    }

    /// Classify the snapshot.
    pub fn sync_state(&self) -> Result<SyncState> {
        match self.fingerprint {
            None => Ok(SyncState::Uninitialized),
            Some(fp) if fp == fingerprint(&self.data)? => Ok(SyncState::Synced),
            Some(_) => Ok(SyncState::Stale),
        }
    }

    /// Wholesale replacement of the materialized data. The stored fingerprint
    /// is left alone until [`Snapshot::commit`].
    pub fn replace(&mut self, data: T) {
        self.data = data;
    }

    /// Record `fp` as the fingerprint of the current data.
    pub fn commit(&mut self, fp: Fingerprint) {
        self.fingerprint = Some(fp);
        self.revision += 1;
    }

    /// Record the baseline without counting a transition.
    pub fn initialize(&mut self, fp: Fingerprint) {
        self.fingerprint = Some(fp);
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// In-memory state store
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    data: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>> {
        self.data
            .lock()
            .map_err(|_| CharmError::internal("state store lock poisoned"))
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }
}

/// JSON-file backed state store
///
/// The whole document is read on every call and rewritten on every mutation.
/// State is small (fingerprints and a handful of data sets) so this keeps the
/// on-disk form trivially inspectable.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a store backed by `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(CharmError::storage(format!(
                    "failed to read state file {}: {e}",
                    self.path.display()
                )))
            }
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&contents)? {
            Value::Object(map) => Ok(map),
            other => Err(CharmError::storage(format!(
                "state file {} holds {} instead of an object",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    async fn save(&self, map: Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    CharmError::storage(format!("failed to create state directory: {e}"))
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(&Value::Object(map))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents)
            .await
            .map_err(|e| CharmError::storage(format!("failed to write state file: {e}")))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CharmError::storage(format!("failed to replace state file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.load().await?;
        map.insert(key.to_string(), value);
        self.save(map).await
    }

    async fn clear(&self, key: &str) -> Result<bool> {
        let mut map = self.load().await?;
        let existed = map.remove(key).is_some();
        if existed {
            self.save(map).await?;
        }
        Ok(existed)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
