//! Hook entry point of the COS registration server operator
//!
//! Invoked once per delivered hook or action. Maps the event onto a trigger,
//! runs the dispatch table to completion and publishes the unit status.

use anyhow::Result;
use clap::Parser;
use cosreg_charm::{
    dispatch_table, trigger_from_context, Charm, CharmConfig, Effects, HookContext, HookTools,
    PebbleCli, RegistryClient,
};
use cosreg_core::{FileStateStore, LeadershipEffects};
use cosreg_sync::{dispatch, Trigger};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cosreg-charm")]
#[command(about = "COS registration server operator", long_about = None)]
struct Cli {
    /// Config file path, relative to the charm directory
    #[arg(short, long, default_value = "cosreg.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = HookContext::from_env()?;
    let config = CharmConfig::load(&ctx.charm_dir.join(&cli.config))?;

    let log_level = if cli.verbose {
        "debug"
    } else {
        config.tracing_level()?
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(trigger) = trigger_from_context(&ctx)? else {
        return Ok(());
    };
    tracing::info!(event = %ctx.dispatch_path, unit = %ctx.topology.unit, "handling event");

    let teardown = matches!(
        &trigger,
        Trigger::Relation { lifecycle, .. } if lifecycle.is_teardown()
    );
    let hook_tools = HookTools::in_teardown(teardown);
    let is_leader = hook_tools.is_leader().await?;
    let pebble = PebbleCli::new(&config.container);
    let store = FileStateStore::new(ctx.charm_dir.join(&config.state_path));
    let registry = RegistryClient::new(config.http_timeout())?;

    let effects = Effects {
        relations: &hook_tools,
        workload: &pebble,
        store: &store,
        registry: &registry,
        unit: &hook_tools,
    };
    let mut charm = Charm::new(&config, &ctx, effects, is_leader);
    let log = dispatch(&dispatch_table(), &mut charm, trigger).await;
    charm.publish_status().await?;

    if !log.failures.is_empty() {
        tracing::warn!(
            failures = log.failures.len(),
            "event handled with failures, the next event retries"
        );
    }
    Ok(())
}
