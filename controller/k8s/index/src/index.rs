use argon_controller_k8s_api::{
    self as k8s, gateway, EndpointSlice, Ingress, ResourceExt, Secret, Service,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tokio::sync::Notify;

pub type SharedIndex = Arc<RwLock<Index>>;

/// A namespace and name pair.
type NsName = (String, String);

/// Read access to the cluster resources needed to resolve backends and TLS
/// bundles.
pub trait ClusterLookup {
    fn service(&self, namespace: &str, name: &str) -> Option<&Service>;

    /// Endpoint slices labeled for a service, ordered by slice name.
    fn endpoint_slices(&self, namespace: &str, service: &str) -> Vec<&EndpointSlice>;

    fn secret(&self, namespace: &str, name: &str) -> Option<&Secret>;
}

/// Holds the latest state of all watched resources.
#[derive(Debug, Default)]
pub struct Index {
    ingresses: BTreeMap<NsName, Ingress>,
    services: BTreeMap<NsName, Service>,
    secrets: BTreeMap<NsName, Secret>,
    gateways: BTreeMap<NsName, gateway::Gateway>,
    http_routes: BTreeMap<NsName, gateway::HTTPRoute>,

    /// Endpoint slices grouped by their service, then keyed by slice name.
    slices_by_service: BTreeMap<NsName, BTreeMap<String, EndpointSlice>>,
    /// Tracks the service each slice was indexed under so deletes can find it.
    slice_services: HashMap<NsName, String>,

    changed: Arc<Notify>,
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    /// A signal raised whenever indexed state changes.
    ///
    /// Changes that occur while no one is waiting are coalesced into a single
    /// pending notification.
    pub fn changes(&self) -> Arc<Notify> {
        self.changed.clone()
    }

    pub fn ingresses(&self) -> impl Iterator<Item = &Ingress> {
        self.ingresses.values()
    }

    pub fn gateways(&self) -> impl Iterator<Item = &gateway::Gateway> {
        self.gateways.values()
    }

    pub fn http_routes(&self) -> impl Iterator<Item = &gateway::HTTPRoute> {
        self.http_routes.values()
    }

    pub(crate) fn sizes(&self) -> [(&'static str, usize); 6] {
        [
            ("ingress", self.ingresses.len()),
            ("service", self.services.len()),
            ("endpointslice", self.slice_services.len()),
            ("secret", self.secrets.len()),
            ("gateway", self.gateways.len()),
            ("httproute", self.http_routes.len()),
        ]
    }

    fn notify(&self) {
        self.changed.notify_one();
    }

    fn remove_slice(&mut self, namespace: &str, name: &str) -> bool {
        let key = (namespace.to_string(), name.to_string());
        let Some(service) = self.slice_services.remove(&key) else {
            return false;
        };
        let by_service = (namespace.to_string(), service);
        if let Some(slices) = self.slices_by_service.get_mut(&by_service) {
            slices.remove(name);
            if slices.is_empty() {
                self.slices_by_service.remove(&by_service);
            }
        }
        true
    }
}

impl ClusterLookup for Index {
    fn service(&self, namespace: &str, name: &str) -> Option<&Service> {
        self.services
            .get(&(namespace.to_string(), name.to_string()))
    }

    fn endpoint_slices(&self, namespace: &str, service: &str) -> Vec<&EndpointSlice> {
        self.slices_by_service
            .get(&(namespace.to_string(), service.to_string()))
            .map(|slices| slices.values().collect())
            .unwrap_or_default()
    }

    fn secret(&self, namespace: &str, name: &str) -> Option<&Secret> {
        self.secrets.get(&(namespace.to_string(), name.to_string()))
    }
}

fn key<T: ResourceExt>(resource: &T) -> Option<NsName> {
    let namespace = resource.namespace()?;
    Some((namespace, resource.name_unchecked()))
}

/// Implements `IndexNamespacedResource` for a resource type stored in a plain
/// map on the index.
macro_rules! index_by_name {
    ($ty:ty, $field:ident, $kind:literal) => {
        impl kubert::index::IndexNamespacedResource<$ty> for Index {
            fn apply(&mut self, resource: $ty) {
                let Some(key) = key(&resource) else {
                    tracing::warn!(kind = $kind, name = %resource.name_any(), "Ignoring resource without a namespace");
                    return;
                };
                tracing::debug!(kind = $kind, namespace = %key.0, name = %key.1, "Indexing");
                self.$field.insert(key, resource);
                self.notify();
            }

            fn delete(&mut self, namespace: String, name: String) {
                if self.$field.remove(&(namespace, name)).is_some() {
                    self.notify();
                }
            }
        }
    };
}

index_by_name!(Ingress, ingresses, "ingress");
index_by_name!(Service, services, "service");
index_by_name!(gateway::Gateway, gateways, "gateway");
index_by_name!(gateway::HTTPRoute, http_routes, "httproute");

impl kubert::index::IndexNamespacedResource<Secret> for Index {
    fn apply(&mut self, secret: Secret) {
        let Some(key) = key(&secret) else {
            return;
        };
        if secret.type_.as_deref() != Some(k8s::TLS_SECRET_TYPE) {
            if self.secrets.remove(&key).is_some() {
                self.notify();
            }
            return;
        }
        tracing::debug!(namespace = %key.0, name = %key.1, "Indexing TLS secret");
        self.secrets.insert(key, secret);
        self.notify();
    }

    fn delete(&mut self, namespace: String, name: String) {
        if self.secrets.remove(&(namespace, name)).is_some() {
            self.notify();
        }
    }
}

impl kubert::index::IndexNamespacedResource<EndpointSlice> for Index {
    fn apply(&mut self, slice: EndpointSlice) {
        let Some((namespace, name)) = key(&slice) else {
            return;
        };
        // A slice may be relabeled, so drop whatever was indexed before.
        self.remove_slice(&namespace, &name);

        let Some(service) = slice.labels().get(k8s::SERVICE_NAME_LABEL).cloned() else {
            tracing::debug!(%namespace, %name, "Ignoring endpoint slice without a service label");
            self.notify();
            return;
        };
        tracing::debug!(%namespace, %name, %service, "Indexing endpoint slice");
        self.slice_services
            .insert((namespace.clone(), name.clone()), service.clone());
        self.slices_by_service
            .entry((namespace, service))
            .or_default()
            .insert(name, slice);
        self.notify();
    }

    fn delete(&mut self, namespace: String, name: String) {
        if self.remove_slice(&namespace, &name) {
            self.notify();
        }
    }
}
