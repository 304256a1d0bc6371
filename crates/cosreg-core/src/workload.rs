//! Process supervisor interface for the workload container
//!
//! The supervisor runs commands inside the container, holds a layered plan of
//! named services and restarts them on request. Layers are plain serde types
//! so they can be fingerprinted and sent to the supervisor as JSON, which it
//! accepts wherever it accepts YAML.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::CharmError;

/// One service entry of a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Merge behavior with lower layers
    #[serde(rename = "override")]
    pub override_: String,
    /// Short description
    pub summary: String,
    /// Command line to launch
    pub command: String,
    /// `enabled` starts the service with the container
    pub startup: String,
    /// Environment for the service process
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// A named set of services applied on top of the current plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Short description
    pub summary: String,
    /// Long description
    pub description: String,
    /// Services keyed by name
    pub services: BTreeMap<String, ServiceSpec>,
}

/// Output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

/// Workload access errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkloadError {
    /// The supervisor socket is not reachable
    #[error("cannot connect to the workload container: {0}")]
    Unreachable(String),

    /// The command ran and exited non-zero
    #[error("command {command:?} exited with {exit_code}: {stderr}")]
    Exec {
        /// Command line that failed
        command: Vec<String>,
        /// Process exit code
        exit_code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// The supervisor rejected a change (layer, restart)
    #[error("change failed: {0}")]
    Change(String),
}

impl From<WorkloadError> for CharmError {
    fn from(err: WorkloadError) -> Self {
        CharmError::workload(err.to_string())
    }
}

/// Operations on the workload container
#[async_trait]
pub trait WorkloadEffects: Send + Sync {
    /// Whether the supervisor answers
    async fn can_connect(&self) -> bool;

    /// Whether `path` exists inside the container
    async fn exists(&self, path: &str) -> Result<bool, WorkloadError>;

    /// Run `command` to completion
    async fn exec(
        &self,
        command: &[&str],
        environment: &BTreeMap<String, String>,
    ) -> Result<ExecOutput, WorkloadError>;

    /// Merge `layer` into the plan under `label`
    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool)
        -> Result<(), WorkloadError>;

    /// Restart (or start) the named service
    async fn restart(&self, service: &str) -> Result<(), WorkloadError>;
}
