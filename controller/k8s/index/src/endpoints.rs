use crate::ClusterLookup;
use argon_controller_k8s_api::{EndpointPort, EndpointSlice};
use std::collections::BTreeSet;

const DEFAULT_PROTOCOL: &str = "TCP";

/// A backend's reference to one of its service's ports.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackendPort<'a> {
    Name(&'a str),
    Number(i32),
}

/// The ready addresses serving a backend, along with the port and protocol
/// they were discovered on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedBackend {
    pub port: u16,
    pub protocol: String,
    /// Deduplicated and sorted.
    pub addresses: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("service {namespace}/{name} not found")]
    ServiceNotFound { namespace: String, name: String },

    #[error("no endpoint slice exposes a matching port")]
    NoMatchingPort,

    #[error("no ready endpoint addresses")]
    NoReadyAddresses,
}

/// Resolves a service backend into ready addresses.
///
/// The port reference is first resolved to a port name through the service's
/// declared ports. The first endpoint slice port matching that name (or the
/// first port at all, when there is no name) fixes the port number for this
/// backend; slices that expose the name on a different port number are
/// skipped. Endpoints whose readiness is unknown are treated as ready.
pub fn resolve(
    cluster: &dyn ClusterLookup,
    namespace: &str,
    service: &str,
    port: BackendPort<'_>,
) -> Result<ResolvedBackend, ResolveError> {
    let port_name = service_port_name(cluster, namespace, service, port)?;

    let mut chosen: Option<(i32, String)> = None;
    let mut addresses = BTreeSet::new();
    for slice in cluster.endpoint_slices(namespace, service) {
        let Some(matched) = match_port(slice, port_name.as_deref()) else {
            continue;
        };
        let Some(number) = matched.port else {
            continue;
        };
        let (chosen_port, _) = chosen.get_or_insert_with(|| {
            let protocol = matched
                .protocol
                .clone()
                .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
            (number, protocol)
        });
        if *chosen_port != number {
            tracing::debug!(
                %namespace,
                %service,
                slice = %slice.metadata.name.as_deref().unwrap_or_default(),
                port = number,
                chosen = *chosen_port,
                "Skipping endpoint slice on a different port"
            );
            continue;
        }

        for endpoint in &slice.endpoints {
            let ready = endpoint
                .conditions
                .as_ref()
                .and_then(|c| c.ready)
                .unwrap_or(true);
            if ready {
                addresses.extend(endpoint.addresses.iter().cloned());
            }
        }
    }

    let Some((number, protocol)) = chosen else {
        return Err(ResolveError::NoMatchingPort);
    };
    let port = u16::try_from(number).map_err(|_| ResolveError::NoMatchingPort)?;
    if addresses.is_empty() {
        return Err(ResolveError::NoReadyAddresses);
    }

    Ok(ResolvedBackend {
        port,
        protocol,
        addresses: addresses.into_iter().collect(),
    })
}

/// Determines the port name that endpoint slices must expose, if any.
fn service_port_name(
    cluster: &dyn ClusterLookup,
    namespace: &str,
    service: &str,
    port: BackendPort<'_>,
) -> Result<Option<String>, ResolveError> {
    let svc = cluster
        .service(namespace, service)
        .ok_or_else(|| ResolveError::ServiceNotFound {
            namespace: namespace.to_string(),
            name: service.to_string(),
        })?;

    let name = match port {
        BackendPort::Name(name) if !name.is_empty() => Some(name.to_string()),
        BackendPort::Name(_) => None,
        BackendPort::Number(number) => svc
            .spec
            .iter()
            .flat_map(|spec| spec.ports.iter().flatten())
            .find(|p| p.port == number)
            .and_then(|p| p.name.clone()),
    };
    Ok(name.filter(|n| !n.is_empty()))
}

fn match_port<'s>(slice: &'s EndpointSlice, name: Option<&str>) -> Option<&'s EndpointPort> {
    slice.ports.iter().flatten().find(|p| {
        p.port.is_some()
            && match name {
                None => true,
                Some(name) => p.name.as_deref() == Some(name),
            }
    })
}
