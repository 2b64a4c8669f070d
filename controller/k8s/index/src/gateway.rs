use crate::{
    endpoints::{self, BackendPort},
    policy,
    tls::{self, SecretError},
    ClusterLookup, TargetSource,
};
use argon_controller_core::{BackendPolicy, PathMatch, Target, TargetEndpoint, TlsBundle};
use argon_controller_k8s_api::{gateway, ResourceExt};
use std::{collections::BTreeMap, net::IpAddr};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway {0} has no listeners")]
    NoListeners(String),

    #[error("gateway {0} has no addresses")]
    NoAddresses(String),

    #[error("invalid IP address {0:?}")]
    InvalidAddress(String),

    #[error("unsupported address type {0:?}")]
    UnsupportedAddressType(String),

    #[error("failed to resolve {name}: {source}")]
    Resolve {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} resolved to no addresses")]
    Unresolved { name: String },

    #[error("listener {listener}: unsupported certificate ref kind {kind:?}")]
    UnsupportedCertificateKind { listener: String, kind: String },

    #[error("listener {listener}: unsupported certificate ref group {group:?}")]
    UnsupportedCertificateGroup { listener: String, group: String },

    #[error("listener {listener}: {source}")]
    Certificate {
        listener: String,
        #[source]
        source: SecretError,
    },
}

/// An address a gateway is reachable on, as reported in its status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayAddress {
    Ip(IpAddr),
    /// A hostname or named address that must be resolved to IPs.
    Named(String),
}

/// A gateway along with the HTTP routes attached to it.
#[derive(Debug)]
pub struct GatewaySource<'a> {
    gateway: &'a gateway::Gateway,
    routes: Vec<&'a gateway::HTTPRoute>,
}

pub fn matches_class(gateway: &gateway::Gateway, class: &str) -> bool {
    gateway.spec.gateway_class_name == class
}

/// Reads a gateway's addresses from its status.
///
/// `IPAddress` entries (the default type) must be IP literals; `Hostname` and
/// `NamedAddress` entries are returned for resolution. Any other type fails.
pub fn addresses(gw: &gateway::Gateway) -> Result<Vec<GatewayAddress>, GatewayError> {
    let reported = gw
        .status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| GatewayError::NoAddresses(gateway_name(gw)))?;

    reported
        .iter()
        .map(|addr| match addr.r#type.as_deref().unwrap_or("IPAddress") {
            "IPAddress" => addr
                .value
                .parse()
                .map(GatewayAddress::Ip)
                .map_err(|_| GatewayError::InvalidAddress(addr.value.clone())),
            "Hostname" | "NamedAddress" => Ok(GatewayAddress::Named(addr.value.clone())),
            other => Err(GatewayError::UnsupportedAddressType(other.to_string())),
        })
        .collect()
}

fn gateway_name(gw: &gateway::Gateway) -> String {
    format!("{}/{}", gw.namespace().unwrap_or_default(), gw.name_unchecked())
}

// === impl GatewaySource ===

impl<'a> GatewaySource<'a> {
    /// Selects the routes that reference `gateway` as a parent.
    pub fn new(
        gateway: &'a gateway::Gateway,
        routes: impl IntoIterator<Item = &'a gateway::HTTPRoute>,
    ) -> Self {
        let routes = routes
            .into_iter()
            .filter(|route| !attached_listeners(gateway, route).is_empty())
            .collect();
        Self { gateway, routes }
    }

    pub fn gateway(&self) -> &gateway::Gateway {
        self.gateway
    }

    pub fn routes(&self) -> &[&'a gateway::HTTPRoute] {
        &self.routes
    }

    /// Builds the bundles of every terminating TLS listener, keyed by listener
    /// name. Any certificate failure fails the whole gateway.
    fn listener_bundles(
        &self,
        cluster: &dyn ClusterLookup,
    ) -> Result<BTreeMap<String, Vec<TlsBundle>>, GatewayError> {
        let namespace = self.gateway.namespace().unwrap_or_default();
        let mut bundles = BTreeMap::new();
        for listener in &self.gateway.spec.listeners {
            let Some(tls) = listener.tls.as_ref() else {
                continue;
            };
            if !matches!(
                tls.mode,
                None | Some(gateway::GatewayListenersTlsMode::Terminate)
            ) {
                continue;
            }

            let sni = listener.hostname.iter().cloned().collect::<Vec<_>>();
            let mut built = Vec::new();
            for cert in tls.certificate_refs.iter().flatten() {
                let kind = cert.kind.as_deref().unwrap_or("Secret");
                if kind != "Secret" {
                    return Err(GatewayError::UnsupportedCertificateKind {
                        listener: listener.name.clone(),
                        kind: kind.to_string(),
                    });
                }
                let group = cert.group.as_deref().unwrap_or_default();
                if !group.is_empty() {
                    return Err(GatewayError::UnsupportedCertificateGroup {
                        listener: listener.name.clone(),
                        group: group.to_string(),
                    });
                }

                let ns = cert.namespace.as_deref().unwrap_or(&namespace);
                let bundle = tls::build_bundle(cluster, ns, &cert.name, sni.clone())
                    .map_err(|source| GatewayError::Certificate {
                        listener: listener.name.clone(),
                        source,
                    })?;
                built.push(bundle);
            }
            bundles.insert(listener.name.clone(), built);
        }
        Ok(bundles)
    }
}

impl TargetSource for GatewaySource<'_> {
    fn source_key(&self) -> String {
        format!("gw:{}", gateway_name(self.gateway))
    }

    fn source_version(&self) -> Option<String> {
        self.gateway.resource_version()
    }

    /// Compiles every attached route into per-host targets.
    ///
    /// A gateway without listeners, or with a listener whose certificates
    /// cannot be loaded, fails. Routes with malformed policy annotations and
    /// backends that cannot be resolved are dropped.
    fn extract_targets(&self, cluster: &dyn ClusterLookup) -> anyhow::Result<Vec<Target>> {
        let gw = self.gateway;
        if gw.spec.listeners.is_empty() {
            return Err(GatewayError::NoListeners(gateway_name(gw)).into());
        }
        let bundles = self.listener_bundles(cluster)?;

        let mut targets = BTreeMap::<String, Target>::new();
        for route in &self.routes {
            let listeners = attached_listeners(gw, route);
            let namespace = route.namespace().unwrap_or_default();
            let name = route.name_unchecked();

            let policy = match policy::parse(route.annotations()) {
                Ok(policy) => policy,
                Err(error) => {
                    tracing::warn!(%error, %namespace, route = %name, "Skipping route with invalid policy");
                    continue;
                }
            };

            let paths = route_paths(route, cluster, &namespace, &policy);
            if paths.is_empty() {
                tracing::info!(%namespace, route = %name, "Route has no viable backends");
                continue;
            }

            for host in route_hosts(route, &listeners) {
                let tls = listeners
                    .iter()
                    .filter(|l| l.hostname.as_deref().map_or(true, |h| host_matches(h, &host)))
                    .filter_map(|l| bundles.get(&l.name).and_then(|b| b.last()))
                    .last()
                    .cloned();

                let target = targets.entry(host.clone()).or_insert_with(|| Target {
                    host,
                    ..Default::default()
                });
                target.paths.extend(paths.clone());
                if tls.is_some() {
                    target.tls = tls;
                }
            }
        }
        Ok(targets.into_values().collect())
    }
}

/// The gateway listeners a route attaches to through its parent refs.
fn attached_listeners<'g>(
    gw: &'g gateway::Gateway,
    route: &gateway::HTTPRoute,
) -> Vec<&'g gateway::GatewayListeners> {
    let gw_namespace = gw.namespace().unwrap_or_default();
    let gw_name = gw.name_unchecked();
    let route_namespace = route.namespace().unwrap_or_default();

    let mut attached = Vec::new();
    for parent in route.spec.parent_refs.iter().flatten() {
        let is_gateway = parent.kind.as_deref().map_or(true, |k| k == "Gateway")
            && parent.group.as_deref().map_or(true, |g| g == gateway::GROUP);
        let namespace = parent.namespace.as_deref().unwrap_or(&route_namespace);
        if !is_gateway || parent.name != gw_name || namespace != gw_namespace {
            continue;
        }
        for listener in &gw.spec.listeners {
            let selected = parent
                .section_name
                .as_deref()
                .map_or(true, |section| section == listener.name);
            if selected && !attached.iter().any(|l: &&gateway::GatewayListeners| l.name == listener.name) {
                attached.push(listener);
            }
        }
    }
    attached
}

/// The route's hostnames, falling back to the attached listeners' hostnames
/// and finally to the catch-all empty host.
fn route_hosts(route: &gateway::HTTPRoute, listeners: &[&gateway::GatewayListeners]) -> Vec<String> {
    let hostnames = route.spec.hostnames.clone().unwrap_or_default();
    if !hostnames.is_empty() {
        return hostnames;
    }
    let mut hosts = listeners
        .iter()
        .filter_map(|l| l.hostname.clone())
        .collect::<Vec<_>>();
    hosts.sort();
    hosts.dedup();
    if hosts.is_empty() {
        hosts.push(String::new());
    }
    hosts
}

fn route_paths(
    route: &gateway::HTTPRoute,
    cluster: &dyn ClusterLookup,
    namespace: &str,
    policy: &BackendPolicy,
) -> BTreeMap<String, TargetEndpoint> {
    let mut paths = BTreeMap::new();
    for rule in route.spec.rules.iter().flatten() {
        let Some(backend) = rule.backend_refs.iter().flatten().find(|b| {
            b.kind.as_deref().map_or(true, |k| k == "Service")
                && b.group.as_deref().map_or(true, str::is_empty)
        }) else {
            continue;
        };
        let backend_ns = backend.namespace.as_deref().unwrap_or(namespace);
        let port = BackendPort::Number(backend.port.unwrap_or_default());
        let resolved = match endpoints::resolve(cluster, backend_ns, &backend.name, port) {
            Ok(resolved) => resolved,
            Err(error) => {
                tracing::info!(%error, namespace = %backend_ns, service = %backend.name, "Backend unresolved");
                continue;
            }
        };

        let matches = rule.matches.clone().unwrap_or_default();
        let matches = if matches.is_empty() {
            vec![(PathMatch::Prefix, "/".to_string())]
        } else {
            matches.iter().map(match_path).collect()
        };
        for (path_match, path) in matches {
            paths.insert(
                path,
                TargetEndpoint {
                    port: resolved.port,
                    protocol: resolved.protocol.clone(),
                    addresses: resolved.addresses.clone(),
                    path_match,
                    policy: policy.clone(),
                },
            );
        }
    }
    paths
}

fn match_path(m: &gateway::HTTPRouteRulesMatches) -> (PathMatch, String) {
    let Some(path) = m.path.as_ref() else {
        return (PathMatch::Prefix, "/".to_string());
    };
    let value = path.value.clone().unwrap_or_else(|| "/".to_string());
    let kind = match path.r#type {
        None | Some(gateway::HTTPRouteRulesMatchesPathType::PathPrefix) => PathMatch::Prefix,
        Some(gateway::HTTPRouteRulesMatchesPathType::Exact) => PathMatch::Exact,
        Some(gateway::HTTPRouteRulesMatchesPathType::RegularExpression) => {
            PathMatch::Other("RegularExpression".to_string())
        }
    };
    (kind, value)
}

/// Matches a host against a listener hostname, which may be a `*.` wildcard
/// for any subdomain.
fn host_matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .and_then(|rest| rest.strip_suffix('.'))
            .is_some_and(|label| !label.is_empty()),
        None => pattern == host,
    }
}
