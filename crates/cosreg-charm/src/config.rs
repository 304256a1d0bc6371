//! Operator configuration
//!
//! Loaded from a TOML file next to the charm; every field has a default so a
//! missing file, or a file setting only a few keys, is valid.

use cosreg_core::{CharmError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log levels accepted in `log_level`
pub const VALID_LOG_LEVELS: [&str; 5] = ["info", "debug", "warning", "error", "critical"];

/// Operator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharmConfig {
    /// Workload container name
    pub container: String,
    /// Supervised service name (also the layer label)
    pub service: String,
    /// Unit state file, relative to the charm directory
    pub state_path: PathBuf,
    /// Registry request timeout
    pub http_timeout_secs: u64,
    /// Port the server listens on inside the pod
    pub port: u16,
    /// URL scheme of the server
    pub scheme: String,
    /// Registry API path prefix
    pub api_base: String,
    /// Server data volume
    pub server_data_dir: String,
    /// Built-in dashboards, relative to the charm directory
    pub dashboards_dir: PathBuf,
    /// Device key file maintained by the server
    pub devices_keys_file: PathBuf,
    /// One of [`VALID_LOG_LEVELS`]
    pub log_level: String,
    /// Email of the generated admin user
    pub admin_email: String,
    /// Name of the generated admin user
    pub admin_user: String,
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            container: "cos-registration-server".to_string(),
            service: "cos-registration-server".to_string(),
            state_path: PathBuf::from(".cosreg-state.json"),
            http_timeout_secs: 10,
            port: 8000,
            scheme: "http".to_string(),
            api_base: "/api/v1/".to_string(),
            server_data_dir: "/server_data".to_string(),
            dashboards_dir: PathBuf::from("src/grafana_dashboards"),
            devices_keys_file: PathBuf::from("/server_data/devices_keys"),
            log_level: "info".to_string(),
            admin_email: "admin@example.com".to_string(),
            admin_user: "admin".to_string(),
        }
    }
}

impl CharmConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(CharmError::invalid(format!(
                    "failed to read config file {}: {e}",
                    path.display()
                )))
            }
        };
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CharmError::invalid(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value constraints.
    pub fn validate(&self) -> Result<()> {
        self.tracing_level()?;
        if self.http_timeout_secs == 0 {
            return Err(CharmError::invalid("http_timeout_secs must be positive"));
        }
        if !self.api_base.starts_with('/') || !self.api_base.ends_with('/') {
            return Err(CharmError::invalid(format!(
                "api_base '{}' must start and end with '/'",
                self.api_base
            )));
        }
        Ok(())
    }

    /// `log_level` as a tracing filter directive
    pub fn tracing_level(&self) -> Result<&'static str> {
        match self.log_level.to_lowercase().as_str() {
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warning" => Ok("warn"),
            "error" | "critical" => Ok("error"),
            other => Err(CharmError::invalid(format!(
                "invalid log level '{other}', expected one of {VALID_LOG_LEVELS:?}"
            ))),
        }
    }

    /// Registry request timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// File whose presence marks an installed server
    pub fn secret_key_path(&self) -> String {
        format!("{}/secret_key", self.server_data_dir)
    }

    /// Where the server writes dashboards it generates
    pub fn grafana_dashboard_path(&self) -> String {
        format!("{}/grafana_dashboards", self.server_data_dir)
    }
}
