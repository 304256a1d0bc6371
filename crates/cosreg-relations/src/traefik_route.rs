//! `traefik_route` interface
//!
//! The requirer (us) submits a raw Traefik dynamic configuration under
//! `config`; Traefik answers with the host it is reachable on in
//! `external_host`. Ingress counts as ready once that host is known.

use async_trait::async_trait;
use cosreg_core::{CharmError, RelationEffects, RelationExchange, RelationId, Result, Topology};
use cosreg_sync::{encode_json, Category, SourceError, SyncCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default relation name
pub const RELATION_NAME: &str = "ingress";

/// Bucket key carrying our route configuration
pub const CONFIG_KEY: &str = "config";

/// Remote bucket key carrying the external host
pub const EXTERNAL_HOST_KEY: &str = "external_host";

/// TLS domain of a router
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsDomain {
    /// Primary name
    pub main: String,
    /// Subject alternative names
    pub sans: Vec<String>,
}

/// TLS section of a router
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterTls {
    /// Certificate domains
    pub domains: Vec<TlsDomain>,
}

/// HTTP router
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    /// Entry points the router listens on
    #[serde(rename = "entryPoints")]
    pub entry_points: Vec<String>,
    /// Matching rule
    pub rule: String,
    /// Target service name
    pub service: String,
    /// TLS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouterTls>,
}

/// Backend server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Backend URL
    pub url: String,
}

/// Load balancer over backend servers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    /// Servers
    pub servers: Vec<Server>,
}

/// HTTP service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Load balancer
    #[serde(rename = "loadBalancer")]
    pub load_balancer: LoadBalancer,
}

/// `http` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Routers by name
    #[serde(default)]
    pub routers: BTreeMap<String, Router>,
    /// Services by name
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

/// Traefik dynamic configuration submitted on the relation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraefikConfig {
    /// HTTP routing
    #[serde(default)]
    pub http: HttpConfig,
}

/// Route `/<model>-<app>` on both entry points to `internal_url`.
pub fn route_config(topology: &Topology, external_host: &str, internal_url: &str) -> TraefikConfig {
    let base = format!("juju-{}-{}", topology.model, topology.application);
    let service = format!("{base}-service");
    let rule = format!("PathPrefix(`/{}`)", topology.path_prefix());

    let plain = Router {
        entry_points: vec!["web".to_string()],
        rule: rule.clone(),
        service: service.clone(),
        tls: None,
    };
    let secure = Router {
        entry_points: vec!["websecure".to_string()],
        rule,
        service: service.clone(),
        tls: Some(RouterTls {
            domains: vec![TlsDomain {
                main: external_host.to_string(),
                sans: vec![format!("*.{external_host}")],
            }],
        }),
    };

    TraefikConfig {
        http: HttpConfig {
            routers: BTreeMap::from([
                (format!("{base}-router"), plain),
                (format!("{base}-router-tls"), secure),
            ]),
            services: BTreeMap::from([(
                service,
                Service {
                    load_balancer: LoadBalancer {
                        servers: vec![Server {
                            url: internal_url.to_string(),
                        }],
                    },
                },
            )]),
        },
    }
}

/// URL the server is reached on: through ingress when ready, otherwise directly.
pub fn external_url(
    topology: &Topology,
    scheme: &str,
    external_host: Option<&str>,
    internal_url: &str,
) -> String {
    match external_host {
        Some(host) => format!("{scheme}://{host}/{}", topology.path_prefix()),
        None => internal_url.to_string(),
    }
}

/// Route configuration as a reconciled category.
///
/// Not ready (and therefore a no-op pass) until the external host is known.
#[derive(Debug, Clone)]
pub struct TraefikRouteProvider {
    topology: Topology,
    external_host: Option<String>,
    internal_url: String,
}

impl TraefikRouteProvider {
    /// Provider for the current ingress view
    pub fn new(
        topology: Topology,
        external_host: Option<String>,
        internal_url: impl Into<String>,
    ) -> Self {
        Self {
            topology,
            external_host,
            internal_url: internal_url.into(),
        }
    }
}

#[async_trait]
impl SyncCategory for TraefikRouteProvider {
    type Data = TraefikConfig;

    fn category(&self) -> Category {
        Category::Ingress
    }

    fn relation_name(&self) -> &str {
        RELATION_NAME
    }

    async fn fetch(&self) -> std::result::Result<TraefikConfig, SourceError> {
        match &self.external_host {
            Some(host) => Ok(route_config(&self.topology, host, &self.internal_url)),
            None => Err(SourceError::NotReady("ingress has no external host yet".into())),
        }
    }

    fn render(
        &self,
        data: &TraefikConfig,
    ) -> std::result::Result<BTreeMap<String, String>, CharmError> {
        Ok(BTreeMap::from([(CONFIG_KEY.to_string(), encode_json(data)?)]))
    }
}

/// Reads ingress readiness from the remote side
#[derive(Debug, Clone)]
pub struct TraefikRouteRequirer {
    relation_name: String,
}

impl Default for TraefikRouteRequirer {
    fn default() -> Self {
        Self {
            relation_name: RELATION_NAME.to_string(),
        }
    }
}

impl TraefikRouteRequirer {
    /// The (single) ingress relation, if any
    pub async fn relation<R>(
        &self,
        exchange: &RelationExchange<'_, R>,
    ) -> Result<Option<RelationId>>
    where
        R: RelationEffects + ?Sized,
    {
        Ok(exchange.relation_ids(&self.relation_name).await?.into_iter().next())
    }

    /// Host published by Traefik, `None` while the relation is missing or
    /// Traefik has not answered yet
    pub async fn external_host<R>(
        &self,
        exchange: &RelationExchange<'_, R>,
    ) -> Result<Option<String>>
    where
        R: RelationEffects + ?Sized,
    {
        match self.relation(exchange).await? {
            Some(relation) => exchange.read_raw(&relation, EXTERNAL_HOST_KEY).await,
            None => Ok(None),
        }
    }

    /// Re-read the external host into `known`; returns whether it changed.
    pub async fn refresh<R>(
        &self,
        exchange: &RelationExchange<'_, R>,
        known: &mut Option<String>,
    ) -> Result<bool>
    where
        R: RelationEffects + ?Sized,
    {
        let current = self.external_host(exchange).await?;
        if &current == known {
            return Ok(false);
        }
        tracing::info!(
            external_host = ?current,
            previous = ?known,
            "ingress external host changed"
        );
        *known = current;
        Ok(true)
    }
}
