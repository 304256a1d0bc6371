//! `catalogue` interface
//!
//! Publishes one catalogue entry as four plain string bucket values.

use async_trait::async_trait;
use cosreg_core::CharmError;
use cosreg_sync::{Category, SourceError, SyncCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default relation name
pub const RELATION_NAME: &str = "catalogue";

/// A catalogue entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueItem {
    /// Display name
    pub name: String,
    /// Link target
    pub url: String,
    /// Material design icon name
    pub icon: String,
    /// One-line description
    pub description: String,
}

impl CatalogueItem {
    /// Entry of the registration server reachable on `external_url`
    pub fn registration_server(external_url: &str) -> Self {
        Self {
            name: "COS registration server".to_string(),
            url: format!("{external_url}/devices/"),
            icon: "graph-line-variant".to_string(),
            description: "COS registration server to register devices.".to_string(),
        }
    }
}

/// Provider of a fixed entry
#[derive(Debug, Clone)]
pub struct CatalogueProvider {
    item: CatalogueItem,
}

impl CatalogueProvider {
    /// Provider publishing `item`
    pub fn new(item: CatalogueItem) -> Self {
        Self { item }
    }
}

#[async_trait]
impl SyncCategory for CatalogueProvider {
    type Data = CatalogueItem;

    fn category(&self) -> Category {
        Category::Catalogue
    }

    fn relation_name(&self) -> &str {
        RELATION_NAME
    }

    async fn fetch(&self) -> Result<CatalogueItem, SourceError> {
        Ok(self.item.clone())
    }

    fn render(&self, data: &CatalogueItem) -> Result<BTreeMap<String, String>, CharmError> {
        Ok(BTreeMap::from([
            ("name".to_string(), data.name.clone()),
            ("url".to_string(), data.url.clone()),
            ("icon".to_string(), data.icon.clone()),
            ("description".to_string(), data.description.clone()),
        ]))
    }
}
