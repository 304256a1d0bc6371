//! Scripted data sources
//!
//! [`ScriptedSource`] answers every fetch with whatever the test last told
//! it to; [`ScriptedCategory`] wraps one into a complete category publishing a
//! single JSON bucket key.

use async_trait::async_trait;
use cosreg_core::CharmError;
use cosreg_sync::{encode_json, Category, DataSource, EmptyPolicy, SourceError, SyncCategory};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Data source with a test-controlled answer
#[derive(Debug, Clone)]
pub struct ScriptedSource<T> {
    answer: Arc<Mutex<Result<T, SourceError>>>,
    fetches: Arc<AtomicUsize>,
}

impl<T: Clone> ScriptedSource<T> {
    /// Source that currently answers `value`
    pub fn new(value: T) -> Self {
        Self {
            answer: Arc::new(Mutex::new(Ok(value))),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer `value` from now on
    pub fn set(&self, value: T) {
        *self.answer.lock().unwrap() = Ok(value);
    }

    /// Fail every fetch from now on
    pub fn fail(&self, error: SourceError) {
        *self.answer.lock().unwrap() = Err(error);
    }

    /// Number of fetches served
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl<T: Clone + Default> Default for ScriptedSource<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> DataSource<T> for ScriptedSource<T> {
    async fn fetch(&self) -> Result<T, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.answer.lock().unwrap().clone()
    }
}

/// Category over a [`ScriptedSource`], published as one JSON value
#[derive(Debug, Clone)]
pub struct ScriptedCategory<T> {
    /// Category reported to the engine
    pub category: Category,
    /// Relation fanned out to
    pub relation: String,
    /// Bucket key the data is written under
    pub key: String,
    /// Empty handling
    pub policy: EmptyPolicy,
    /// Upstream answers
    pub source: ScriptedSource<T>,
}

impl<T: Clone + Default> ScriptedCategory<T> {
    /// Category publishing `source` under `key` on `relation`
    pub fn new(category: Category, relation: &str, key: &str, source: ScriptedSource<T>) -> Self {
        Self {
            category,
            relation: relation.to_string(),
            key: key.to_string(),
            policy: EmptyPolicy::Replace,
            source,
        }
    }

    /// Treat empty answers as "no data this pass"
    pub fn skipping_empty(mut self) -> Self {
        self.policy = EmptyPolicy::Skip;
        self
    }
}

#[async_trait]
impl<T> SyncCategory for ScriptedCategory<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync,
{
    type Data = T;

    fn category(&self) -> Category {
        self.category
    }

    fn relation_name(&self) -> &str {
        &self.relation
    }

    async fn fetch(&self) -> Result<T, SourceError> {
        self.source.fetch().await
    }

    fn render(&self, data: &T) -> Result<BTreeMap<String, String>, CharmError> {
        Ok(BTreeMap::from([(self.key.clone(), encode_json(data)?)]))
    }

    fn empty_policy(&self) -> EmptyPolicy {
        self.policy
    }
}
