//! Pebble client for the workload container

use super::{Invocation, ProcessError};
use async_trait::async_trait;
use cosreg_core::{ExecOutput, Layer, WorkloadEffects, WorkloadError};
use std::collections::BTreeMap;
use std::io::Write;

/// Pebble binary mounted into the charm container
pub const PEBBLE_BINARY: &str = "/charm/bin/pebble";

/// Workload access through the `pebble` command-line client
#[derive(Debug, Clone)]
pub struct PebbleCli {
    binary: String,
    socket: String,
}

impl PebbleCli {
    /// Client for the sidecar `container`
    pub fn new(container: &str) -> Self {
        Self {
            binary: PEBBLE_BINARY.to_string(),
            socket: format!("/charm/containers/{container}/pebble.socket"),
        }
    }

    /// Use another client binary
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn pebble(&self) -> Invocation<'_> {
        Invocation::new(&self.binary).env("PEBBLE_SOCKET", &self.socket)
    }
}

/// `pebble ls` failure for a path that does not exist
fn is_missing_path(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such file or directory") || stderr.contains("not found")
}

fn change_error(e: ProcessError) -> WorkloadError {
    WorkloadError::Change(e.to_string())
}

#[async_trait]
impl WorkloadEffects for PebbleCli {
    async fn can_connect(&self) -> bool {
        match self.pebble().arg("plan").run().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(socket = %self.socket, error = %e, "pebble not reachable");
                false
            }
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, WorkloadError> {
        match self.pebble().args(["ls", "-d", path]).run().await {
            Ok(_) => Ok(true),
            Err(ProcessError::Failed { stderr, .. }) if is_missing_path(&stderr) => Ok(false),
            Err(e) => Err(WorkloadError::Unreachable(e.to_string())),
        }
    }

    async fn exec(
        &self,
        command: &[&str],
        environment: &BTreeMap<String, String>,
    ) -> Result<ExecOutput, WorkloadError> {
        let mut invocation = self.pebble().arg("exec");
        for (key, value) in environment {
            invocation = invocation.arg("--env").arg(format!("{key}={value}"));
        }
        match invocation.arg("--").args(command.iter().copied()).run().await {
            Ok(captured) => Ok(ExecOutput {
                stdout: captured.stdout,
                stderr: captured.stderr,
            }),
            Err(ProcessError::Failed { code, stderr, .. }) => Err(WorkloadError::Exec {
                command: command.iter().map(|c| c.to_string()).collect(),
                exit_code: code.unwrap_or(-1),
                stderr,
            }),
            Err(e) => Err(WorkloadError::Unreachable(e.to_string())),
        }
    }

    async fn add_layer(
        &self,
        label: &str,
        layer: &Layer,
        combine: bool,
    ) -> Result<(), WorkloadError> {
        let body = serde_json::to_vec(layer).map_err(|e| WorkloadError::Change(e.to_string()))?;
        let mut file =
            tempfile::NamedTempFile::new().map_err(|e| WorkloadError::Change(e.to_string()))?;
        file.write_all(&body)
            .map_err(|e| WorkloadError::Change(e.to_string()))?;
        let path = file.path().to_string_lossy().into_owned();

        let mut invocation = self.pebble().args(["add", label, path.as_str()]);
        if combine {
            invocation = invocation.arg("--combine");
        }
        invocation.run().await.map_err(change_error)?;
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<(), WorkloadError> {
        self.pebble()
            .args(["restart", service])
            .run()
            .await
            .map_err(change_error)?;
        Ok(())
    }
}
