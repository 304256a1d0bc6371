//! Mapping of the delivered hook or action onto a [`Trigger`]

use crate::context::HookContext;
use cosreg_core::{CharmError, RelationLifecycle, Result};
use cosreg_sync::Trigger;

const LIFECYCLES: [RelationLifecycle; 5] = [
    RelationLifecycle::Created,
    RelationLifecycle::Joined,
    RelationLifecycle::Changed,
    RelationLifecycle::Departed,
    RelationLifecycle::Broken,
];

/// Trigger for the event in `ctx`; `None` for events the operator ignores.
pub fn trigger_from_context(ctx: &HookContext) -> Result<Option<Trigger>> {
    if let Some(action) = ctx.dispatch_path.strip_prefix("actions/") {
        let name = ctx.action_name.clone().unwrap_or_else(|| action.to_string());
        return Ok(Some(Trigger::Action { name }));
    }

    let Some(hook) = ctx.dispatch_path.strip_prefix("hooks/") else {
        return Err(CharmError::invalid(format!(
            "unrecognized dispatch path '{}'",
            ctx.dispatch_path
        )));
    };

    let trigger = match hook {
        "install" => Some(Trigger::Install),
        "leader-elected" => Some(Trigger::LeaderElected),
        "upgrade-charm" => Some(Trigger::UpgradeCharm),
        "config-changed" => Some(Trigger::ConfigChanged),
        "update-status" => Some(Trigger::UpdateStatus),
        _ => {
            if let Some(container) = hook.strip_suffix("-pebble-ready") {
                let container = ctx
                    .workload_name
                    .clone()
                    .unwrap_or_else(|| container.to_string());
                Some(Trigger::PebbleReady { container })
            } else {
                relation_trigger(ctx, hook)?
            }
        }
    };
    Ok(trigger)
}

fn relation_trigger(ctx: &HookContext, hook: &str) -> Result<Option<Trigger>> {
    let Some(lifecycle) = LIFECYCLES
        .into_iter()
        .find(|l| hook.ends_with(&format!("-{}", l.hook_suffix())))
    else {
        tracing::debug!(hook, "event not handled");
        return Ok(None);
    };
    let relation = ctx.relation.clone().ok_or_else(|| {
        CharmError::invalid(format!("{hook} delivered without JUJU_RELATION_ID"))
    })?;
    Ok(Some(Trigger::Relation {
        lifecycle,
        relation,
        remote_unit: ctx.remote_unit.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosreg_core::{RelationId, Topology};
    use std::path::PathBuf;

    fn ctx(path: &str) -> HookContext {
        HookContext {
            topology: Topology {
                model: "lab".into(),
                model_uuid: "u".into(),
                application: "cos-registration-server".into(),
                unit: "cos-registration-server/0".into(),
                charm_name: "c".into(),
            },
            charm_dir: PathBuf::from("."),
            dispatch_path: path.to_string(),
            relation: None,
            remote_unit: None,
            workload_name: None,
            action_name: None,
        }
    }

    #[test]
    fn plain_hooks() {
        assert_eq!(
            trigger_from_context(&ctx("hooks/leader-elected")).unwrap(),
            Some(Trigger::LeaderElected)
        );
        assert_eq!(
            trigger_from_context(&ctx("hooks/update-status")).unwrap(),
            Some(Trigger::UpdateStatus)
        );
        assert_eq!(trigger_from_context(&ctx("hooks/stop")).unwrap(), None);
    }

    #[test]
    fn pebble_ready_names_the_container() {
        assert_eq!(
            trigger_from_context(&ctx("hooks/cos-registration-server-pebble-ready")).unwrap(),
            Some(Trigger::PebbleReady {
                container: "cos-registration-server".into()
            })
        );
    }

    #[test]
    fn relation_hooks_carry_the_relation() {
        let mut c = ctx("hooks/auth-devices-keys-relation-created");
        c.relation = Some(RelationId::new("auth-devices-keys", 3));
        assert_eq!(
            trigger_from_context(&c).unwrap(),
            Some(Trigger::relation(
                RelationLifecycle::Created,
                RelationId::new("auth-devices-keys", 3)
            ))
        );
    }

    #[test]
    fn relation_hook_without_id_is_an_error() {
        assert!(trigger_from_context(&ctx("hooks/ingress-relation-changed")).is_err());
    }

    #[test]
    fn actions() {
        assert_eq!(
            trigger_from_context(&ctx("actions/get-admin-password")).unwrap(),
            Some(Trigger::Action {
                name: "get-admin-password".into()
            })
        );
    }
}
