//! Mock workload container
//!
//! Records every command, layer and restart. Commands succeed with empty
//! output unless a failure was scripted for their program path.

use async_trait::async_trait;
use cosreg_core::{ExecOutput, Layer, WorkloadEffects, WorkloadError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// A command the workload was asked to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedExec {
    /// Full command line
    pub command: Vec<String>,
    /// Environment passed in
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug)]
struct WorkloadState {
    connectable: bool,
    files: BTreeSet<String>,
    failing: BTreeMap<String, (i32, String)>,
    outputs: BTreeMap<String, String>,
    execs: Vec<RecordedExec>,
    layers: Vec<(String, Layer)>,
    restarts: Vec<String>,
}

/// Mock [`WorkloadEffects`]
#[derive(Debug, Clone)]
pub struct MockWorkload {
    state: Arc<Mutex<WorkloadState>>,
}

impl Default for MockWorkload {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorkload {
    /// Reachable container with an empty filesystem
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WorkloadState {
                connectable: true,
                files: BTreeSet::new(),
                failing: BTreeMap::new(),
                outputs: BTreeMap::new(),
                execs: Vec::new(),
                layers: Vec::new(),
                restarts: Vec::new(),
            })),
        }
    }

    /// Container whose supervisor does not answer
    pub fn unreachable() -> Self {
        let mock = Self::new();
        mock.set_connectable(false);
        mock
    }

    /// Toggle reachability
    pub fn set_connectable(&self, connectable: bool) {
        self.state.lock().unwrap().connectable = connectable;
    }

    /// Make `path` exist
    pub fn add_file(&self, path: &str) {
        self.state.lock().unwrap().files.insert(path.to_string());
    }

    /// Commands starting with `program` exit with `exit_code`
    pub fn fail_exec(&self, program: &str, exit_code: i32, stderr: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(program.to_string(), (exit_code, stderr.to_string()));
    }

    /// Commands starting with `program` print `stdout`
    pub fn set_output(&self, program: &str, stdout: &str) {
        self.state
            .lock()
            .unwrap()
            .outputs
            .insert(program.to_string(), stdout.to_string());
    }

    /// Every command run, in order
    pub fn execs(&self) -> Vec<RecordedExec> {
        self.state.lock().unwrap().execs.clone()
    }

    /// Program paths run, in order
    pub fn programs(&self) -> Vec<String> {
        self.execs()
            .into_iter()
            .filter_map(|e| e.command.into_iter().next())
            .collect()
    }

    /// Layers added, in order
    pub fn layers(&self) -> Vec<(String, Layer)> {
        self.state.lock().unwrap().layers.clone()
    }

    /// Services restarted, in order
    pub fn restarts(&self) -> Vec<String> {
        self.state.lock().unwrap().restarts.clone()
    }
}

#[async_trait]
impl WorkloadEffects for MockWorkload {
    async fn can_connect(&self) -> bool {
        self.state.lock().unwrap().connectable
    }

    async fn exists(&self, path: &str) -> Result<bool, WorkloadError> {
        let state = self.state.lock().unwrap();
        if !state.connectable {
            return Err(WorkloadError::Unreachable("mock container down".into()));
        }
        Ok(state.files.contains(path))
    }

    async fn exec(
        &self,
        command: &[&str],
        environment: &BTreeMap<String, String>,
    ) -> Result<ExecOutput, WorkloadError> {
        let mut state = self.state.lock().unwrap();
        if !state.connectable {
            return Err(WorkloadError::Unreachable("mock container down".into()));
        }
        let command: Vec<String> = command.iter().map(|s| s.to_string()).collect();
        state.execs.push(RecordedExec {
            command: command.clone(),
            environment: environment.clone(),
        });
        let program = command.first().cloned().unwrap_or_default();
        if let Some((exit_code, stderr)) = state.failing.get(&program).cloned() {
            tracing::debug!(program = %program, exit_code, "injected exec failure");
            return Err(WorkloadError::Exec {
                command,
                exit_code,
                stderr,
            });
        }
        Ok(ExecOutput {
            stdout: state.outputs.get(&program).cloned().unwrap_or_default(),
            stderr: String::new(),
        })
    }

    async fn add_layer(
        &self,
        label: &str,
        layer: &Layer,
        _combine: bool,
    ) -> Result<(), WorkloadError> {
        let mut state = self.state.lock().unwrap();
        if !state.connectable {
            return Err(WorkloadError::Unreachable("mock container down".into()));
        }
        state.layers.push((label.to_string(), layer.clone()));
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<(), WorkloadError> {
        let mut state = self.state.lock().unwrap();
        if !state.connectable {
            return Err(WorkloadError::Unreachable("mock container down".into()));
        }
        state.restarts.push(service.to_string());
        Ok(())
    }
}
