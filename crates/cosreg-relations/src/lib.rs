//! # cosreg relations - relation interface libraries
//!
//! One module per relation interface the registration server speaks. Provider
//! halves are [`SyncCategory`] implementations driven by the reconciliation
//! engine; requirer halves read the remote application bucket.
//!
//! - [`auth_devices_keys`]: device SSH keys from the registry
//! - [`devices_keys`]: device SSH keys from a local key file
//! - [`blackbox_probes`]: Blackbox exporter probe jobs and modules
//! - [`grafana_dashboards`]: built-in and per-device Grafana dashboards
//! - [`alert_rules`]: Loki and Prometheus alert rule groups
//! - [`traefik_route`]: raw Traefik route configuration and ingress readiness
//! - [`catalogue`]: the catalogue entry
//! - [`mirror`]: generic requirer-side copy of one remote bucket key
//!
//! Sources are generic over [`DataSource`] so the registry client, local
//! files and scripted test sources plug in the same way.
//!
//! [`SyncCategory`]: cosreg_sync::SyncCategory
//! [`DataSource`]: cosreg_sync::DataSource

pub mod alert_rules;
pub mod auth_devices_keys;
pub mod blackbox_probes;
pub mod catalogue;
pub mod devices_keys;
pub mod grafana_dashboards;
pub mod mirror;
pub mod traefik_route;

pub use alert_rules::{AlertRulesProvider, RuleFile, RuleGroup, RuleGroups};
pub use auth_devices_keys::{AuthDevicesKeysProvider, DeviceKeyRecord, DeviceKeys};
pub use blackbox_probes::{
    BlackboxProbesProvider, BlackboxProbesRequirer, DeviceAddress, ProbeJob, ProbeSet,
};
pub use catalogue::{CatalogueItem, CatalogueProvider};
pub use devices_keys::{DevicesKeysProvider, DevicesPubKeys, KeyFileSource};
pub use grafana_dashboards::{
    DashboardDirSource, Dashboards, GrafanaDashboardProvider, RegistryDashboard,
};
pub use mirror::{MirrorOutcome, RemoteMirror};
pub use traefik_route::{TraefikConfig, TraefikRouteProvider, TraefikRouteRequirer};
