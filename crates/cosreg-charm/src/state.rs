//! Unit state schema
//!
//! Keys of the unit state store and typed accessors for them. Each category
//! snapshot lives under the category name; the rest are single values.

use cosreg_core::state::{get_or_default, set_typed};
use cosreg_core::{Fingerprint, Result, Snapshot, StateStore};
use cosreg_sync::Category;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Generated admin password
pub const ADMIN_PASSWORD_KEY: &str = "admin-password";

/// Fingerprint of the last layer handed to the supervisor
pub const WORKLOAD_LAYER_KEY: &str = "workload-layer";

/// External host last published by the ingress provider
pub const EXTERNAL_HOST_KEY: &str = "ingress-external-host";

/// Typed view over a [`StateStore`]
pub struct UnitState<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: StateStore + ?Sized> UnitState<'a, S> {
    /// Wrap `store`
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Snapshot of `category`, empty if never stored
    pub async fn snapshot<T>(&self, category: Category) -> Result<Snapshot<T>>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        get_or_default(self.store, category.as_str()).await
    }

    /// Persist the snapshot of `category`
    pub async fn save_snapshot<T: Serialize>(
        &self,
        category: Category,
        snapshot: &Snapshot<T>,
    ) -> Result<()> {
        set_typed(self.store, category.as_str(), snapshot).await
    }

    /// Stored admin password, empty when none was created yet
    pub async fn admin_password(&self) -> Result<String> {
        get_or_default(self.store, ADMIN_PASSWORD_KEY).await
    }

    /// Persist the admin password
    pub async fn set_admin_password(&self, password: &str) -> Result<()> {
        set_typed(self.store, ADMIN_PASSWORD_KEY, password).await
    }

    /// Fingerprint of the applied layer
    pub async fn workload_layer(&self) -> Result<Option<Fingerprint>> {
        get_or_default(self.store, WORKLOAD_LAYER_KEY).await
    }

    /// Record the applied layer
    pub async fn set_workload_layer(&self, fp: Fingerprint) -> Result<()> {
        set_typed(self.store, WORKLOAD_LAYER_KEY, &Some(fp)).await
    }

    /// Forget the applied layer; the next update re-applies it
    pub async fn reset_workload_layer(&self) -> Result<()> {
        self.store.clear(WORKLOAD_LAYER_KEY).await.map(|_| ())
    }

    /// Last known ingress external host
    pub async fn external_host(&self) -> Result<Option<String>> {
        get_or_default(self.store, EXTERNAL_HOST_KEY).await
    }

    /// Record the ingress external host
    pub async fn set_external_host(&self, host: Option<&str>) -> Result<()> {
        set_typed(self.store, EXTERNAL_HOST_KEY, &host).await
    }
}
