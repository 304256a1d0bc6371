//! Workload setup and process layer
//!
//! The server is installed once (marked by its secret key on the data
//! volume), configured on every layer update, and run under the supervisor as
//! a single service. The layer is only re-applied, and the service restarted,
//! when its fingerprint differs from the last applied one.

use crate::config::CharmConfig;
use crate::state::UnitState;
use crate::status::UnitStatus;
use cosreg_core::fingerprint::fingerprint;
use cosreg_core::{Layer, Result, ServiceSpec, StateStore, Topology, WorkloadEffects, WorkloadError};
use std::collections::BTreeMap;

/// First-run installer
pub const INSTALL_COMMAND: &str = "/usr/bin/install.bash";
/// Per-update configuration script
pub const CONFIGURE_COMMAND: &str = "/usr/bin/configure.bash";
/// Service entry point
pub const LAUNCHER_COMMAND: &str = "/usr/bin/launcher.bash";

/// Layer running the server
pub fn server_layer(
    config: &CharmConfig,
    topology: &Topology,
    external_host: Option<&str>,
) -> Layer {
    let environment = BTreeMap::from([
        (
            "ALLOWED_HOST_DJANGO".to_string(),
            external_host.unwrap_or_default().to_string(),
        ),
        ("SCRIPT_NAME".to_string(), format!("/{}", topology.path_prefix())),
        ("COS_MODEL_NAME".to_string(), topology.model.clone()),
    ]);
    Layer {
        summary: "cos registration server k8s layer".to_string(),
        description: "cos registration server k8s layer".to_string(),
        services: BTreeMap::from([(
            config.service.clone(),
            ServiceSpec {
                override_: "replace".to_string(),
                summary: "cos-registration-server-k8s service".to_string(),
                command: LAUNCHER_COMMAND.to_string(),
                startup: "enabled".to_string(),
                environment,
            },
        )]),
    }
}

/// Install (first run only) and configure the server.
pub async fn setup_server<W>(
    workload: &W,
    config: &CharmConfig,
) -> std::result::Result<(), WorkloadError>
where
    W: WorkloadEffects + ?Sized,
{
    if !workload.exists(&config.secret_key_path()).await? {
        tracing::info!("installing server");
        workload.exec(&[INSTALL_COMMAND], &BTreeMap::new()).await?;
    }
    let environment = BTreeMap::from([(
        "GRAFANA_DASHBOARD_PATH".to_string(),
        config.grafana_dashboard_path(),
    )]);
    workload.exec(&[CONFIGURE_COMMAND], &environment).await?;
    Ok(())
}

/// Set the server up, apply its layer if it changed and restart it.
///
/// Returns the status the unit should report.
pub async fn update_layer_and_restart<W, S>(
    workload: &W,
    state: &UnitState<'_, S>,
    config: &CharmConfig,
    topology: &Topology,
    external_host: Option<&str>,
) -> Result<UnitStatus>
where
    W: WorkloadEffects + ?Sized,
    S: StateStore + ?Sized,
{
    if !workload.can_connect().await {
        return Ok(UnitStatus::Waiting(
            "Waiting for Pebble in workload container".to_string(),
        ));
    }

    let setup = setup_server(workload, config).await;
    if let Err(e) = &setup {
        tracing::error!(error = %e, "failed to set up the server");
    }

    let layer = server_layer(config, topology, external_host);
    let fp = fingerprint(&layer)?;
    if state.workload_layer().await? != Some(fp) {
        if let Err(e) = apply(workload, config, &layer).await {
            tracing::error!(error = %e, "failed to apply layer");
            return Ok(UnitStatus::Maintenance("Assembling pod spec".to_string()));
        }
        state.set_workload_layer(fp).await?;
    } else {
        tracing::debug!("layer unchanged, not restarting");
    }

    Ok(match setup {
        Ok(()) => UnitStatus::Active(String::new()),
        Err(e) => UnitStatus::Blocked(format!("Server setup failed: {e}")),
    })
}

async fn apply<W>(
    workload: &W,
    config: &CharmConfig,
    layer: &Layer,
) -> std::result::Result<(), WorkloadError>
where
    W: WorkloadEffects + ?Sized,
{
    workload.add_layer(&config.service, layer, true).await?;
    tracing::info!(service = %config.service, "added updated layer to the plan");
    workload.restart(&config.service).await?;
    tracing::info!(service = %config.service, "restarted service");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> Topology {
        Topology {
            model: "lab".into(),
            model_uuid: "u".into(),
            application: "cos-registration-server".into(),
            unit: "cos-registration-server/0".into(),
            charm_name: "c".into(),
        }
    }

    #[test]
    fn layer_environment() {
        let layer = server_layer(&CharmConfig::default(), &topology(), Some("cos.example.com"));
        let service = &layer.services["cos-registration-server"];
        assert_eq!(service.command, LAUNCHER_COMMAND);
        assert_eq!(service.environment["ALLOWED_HOST_DJANGO"], "cos.example.com");
        assert_eq!(service.environment["SCRIPT_NAME"], "/lab-cos-registration-server");
        assert_eq!(service.environment["COS_MODEL_NAME"], "lab");
    }

    #[test]
    fn layer_without_ingress_allows_no_host() {
        let layer = server_layer(&CharmConfig::default(), &topology(), None);
        assert_eq!(
            layer.services["cos-registration-server"].environment["ALLOWED_HOST_DJANGO"],
            ""
        );
    }
}
