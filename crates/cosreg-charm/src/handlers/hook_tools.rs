//! Juju hook tools

use super::{Invocation, ProcessError};
use crate::status::{UnitEffects, UnitStatus};
use async_trait::async_trait;
use cosreg_core::{
    CharmError, LeadershipEffects, RelationEffects, RelationError, RelationId, Result,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Relation, leadership and status access through the hook tools on `PATH`
#[derive(Debug, Clone, Default)]
pub struct HookTools {
    teardown: bool,
}

impl HookTools {
    /// Hook tools for an ordinary hook
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook tools for a relation teardown hook, where failed reads of the
    /// departing relation mean "gone" rather than an error
    pub fn in_teardown(teardown: bool) -> Self {
        Self { teardown }
    }

    fn access_error(&self, relation: &RelationId, e: ProcessError) -> RelationError {
        if self.teardown {
            tracing::debug!(relation = %relation, error = %e, "relation read during teardown");
            RelationError::Departing(relation.clone())
        } else {
            RelationError::Access(e.to_string())
        }
    }

    async fn remote_app(
        &self,
        relation: &RelationId,
    ) -> std::result::Result<Option<String>, RelationError> {
        let captured = Invocation::new("relation-list")
            .args(["-r".to_string(), relation.to_string(), "--app".to_string()])
            .run()
            .await
            .map_err(|e| self.access_error(relation, e))?;
        let app = captured.stdout.trim();
        Ok((!app.is_empty()).then(|| app.to_string()))
    }
}

#[async_trait]
impl RelationEffects for HookTools {
    async fn relation_ids(
        &self,
        name: &str,
    ) -> std::result::Result<Vec<RelationId>, RelationError> {
        let captured = Invocation::new("relation-ids")
            .args([name, "--format=json"])
            .run()
            .await
            .map_err(|e| RelationError::Access(e.to_string()))?;
        let ids: Vec<String> = serde_json::from_str(captured.stdout.trim())
            .map_err(|e| RelationError::Access(format!("relation-ids {name}: {e}")))?;
        ids.iter()
            .map(|id| id.parse::<RelationId>())
            .collect::<Result<_>>()
            .map_err(|e| RelationError::Access(e.to_string()))
    }

    async fn set_app_data(
        &self,
        relation: &RelationId,
        key: &str,
        value: &str,
    ) -> std::result::Result<(), RelationError> {
        let mut settings = serde_json::Map::new();
        settings.insert(key.to_string(), Value::String(value.to_string()));
        let settings = Value::Object(settings).to_string();
        Invocation::new("relation-set")
            .args(["-r".to_string(), relation.to_string(), "--app".to_string()])
            .args(["--file", "-"])
            .stdin(settings)
            .run()
            .await
            .map_err(|e| self.access_error(relation, e))?;
        Ok(())
    }

    async fn remote_app_data(
        &self,
        relation: &RelationId,
        key: &str,
    ) -> std::result::Result<Option<String>, RelationError> {
        let Some(app) = self.remote_app(relation).await? else {
            return Ok(None);
        };
        let captured = Invocation::new("relation-get")
            .args(["-r".to_string(), relation.to_string()])
            .args(["--app", "--format=json", key])
            .arg(app)
            .run()
            .await
            .map_err(|e| self.access_error(relation, e))?;
        match serde_json::from_str::<Value>(captured.stdout.trim()) {
            Ok(Value::String(s)) => Ok(Some(s)),
            Ok(Value::Null) => Ok(None),
            Ok(other) => Ok(Some(other.to_string())),
            Err(e) => Err(RelationError::Access(format!("relation-get {relation} {key}: {e}"))),
        }
    }
}

#[async_trait]
impl LeadershipEffects for HookTools {
    async fn is_leader(&self) -> std::result::Result<bool, RelationError> {
        let captured = Invocation::new("is-leader")
            .arg("--format=json")
            .run()
            .await
            .map_err(|e| RelationError::Access(e.to_string()))?;
        serde_json::from_str(captured.stdout.trim())
            .map_err(|e| RelationError::Access(format!("is-leader: {e}")))
    }
}

#[async_trait]
impl UnitEffects for HookTools {
    async fn set_status(&self, status: &UnitStatus) -> Result<()> {
        Invocation::new("status-set")
            .args([status.name(), status.message()])
            .run()
            .await
            .map_err(|e| CharmError::internal(e.to_string()))?;
        Ok(())
    }

    async fn action_set(&self, results: &BTreeMap<String, String>) -> Result<()> {
        Invocation::new("action-set")
            .args(results.iter().map(|(k, v)| format!("{k}={v}")))
            .run()
            .await
            .map_err(|e| CharmError::internal(e.to_string()))?;
        Ok(())
    }

    async fn action_fail(&self, message: &str) -> Result<()> {
        Invocation::new("action-fail")
            .arg(message)
            .run()
            .await
            .map_err(|e| CharmError::internal(e.to_string()))?;
        Ok(())
    }
}
