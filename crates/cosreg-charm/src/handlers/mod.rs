//! Production effect handlers
//!
//! Both talk to the outside world through command-line tools: the Juju hook
//! tools for relations, leadership and status, and the Pebble client for the
//! workload container.

pub mod hook_tools;
pub mod pebble;

pub use hook_tools::HookTools;
pub use pebble::PebbleCli;

use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Failure to run a tool
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The program could not be started or waited on
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The program exited unsuccessfully
    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        /// Program name
        program: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },
}

/// Captured output of a successful run
#[derive(Debug, Clone, Default)]
pub(crate) struct Captured {
    pub stdout: String,
    pub stderr: String,
}

/// One tool invocation
pub(crate) struct Invocation<'a> {
    program: &'a str,
    args: Vec<String>,
    env: Vec<(String, String)>,
    stdin: Option<String>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(program: &'a str) -> Self {
        Self {
            program,
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    pub(crate) fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub(crate) fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub(crate) fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub(crate) fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run to completion; a non-zero exit is an error.
    pub(crate) async fn run(self) -> Result<Captured, ProcessError> {
        let spawn_error = |source| ProcessError::Spawn {
            program: self.program.to_string(),
            source,
        };

        tracing::trace!(program = self.program, args = ?self.args, "running tool");
        let mut child = Command::new(self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        if let (Some(input), Some(mut pipe)) = (&self.stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await.map_err(spawn_error)?;
        }

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(ProcessError::Failed {
                program: self.program.to_string(),
                code: output.status.code(),
                stderr,
            });
        }
        Ok(Captured {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}
