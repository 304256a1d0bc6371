//! `get-admin-password` action

use crate::config::CharmConfig;
use crate::state::UnitState;
use cosreg_core::{Result, StateStore, WorkloadEffects, WorkloadError};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;

/// Superuser creation script
pub const CREATE_SUPERUSER_COMMAND: &str = "/usr/bin/create_super_user.bash";

/// Length of generated passwords
pub const PASSWORD_LENGTH: usize = 12;

/// Message of the action when the container is down
pub const NOT_READY_MESSAGE: &str =
    "The container is not ready yet. Please try again in a few minutes";

/// Random ASCII alphanumeric password
pub fn generate_password<G: Rng + ?Sized>(rng: &mut G) -> String {
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// How the action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminPasswordOutcome {
    /// Results to hand back to the operator
    Results(BTreeMap<String, String>),
    /// Action failure message
    Failed(String),
}

/// Return the admin credentials, creating the superuser on first use.
///
/// The password is only persisted once the superuser exists.
pub async fn get_admin_password<W, S, G>(
    workload: &W,
    state: &UnitState<'_, S>,
    config: &CharmConfig,
    external_url: &str,
    rng: &mut G,
) -> Result<AdminPasswordOutcome>
where
    W: WorkloadEffects + ?Sized,
    S: StateStore + ?Sized,
    G: Rng + ?Sized,
{
    if !workload.can_connect().await {
        return Ok(AdminPasswordOutcome::Failed(NOT_READY_MESSAGE.to_string()));
    }

    let mut password = state.admin_password().await?;
    if password.is_empty() {
        tracing::debug!("admin password not in unit state, generating one");
        let generated = generate_password(rng);
        if let Err(e) = create_superuser(workload, config, &generated).await {
            tracing::error!(error = %e, "failed to create the super user");
            return Ok(AdminPasswordOutcome::Failed(format!(
                "Failed to create the admin user: {e}"
            )));
        }
        state.set_admin_password(&generated).await?;
        password = generated;
    } else {
        tracing::debug!("admin already created, returning the stored password");
    }

    Ok(AdminPasswordOutcome::Results(BTreeMap::from([
        ("url".to_string(), format!("{external_url}/admin/")),
        ("user".to_string(), config.admin_user.clone()),
        ("password".to_string(), password),
    ])))
}

async fn create_superuser<W>(
    workload: &W,
    config: &CharmConfig,
    password: &str,
) -> std::result::Result<(), WorkloadError>
where
    W: WorkloadEffects + ?Sized,
{
    let environment = BTreeMap::from([
        ("DJANGO_SUPERUSER_PASSWORD".to_string(), password.to_string()),
        ("DJANGO_SUPERUSER_EMAIL".to_string(), config.admin_email.clone()),
        ("DJANGO_SUPERUSER_USERNAME".to_string(), config.admin_user.clone()),
    ]);
    workload
        .exec(&[CREATE_SUPERUSER_COMMAND, "--noinput"], &environment)
        .await?;
    Ok(())
}
