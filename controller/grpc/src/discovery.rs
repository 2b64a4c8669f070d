use crate::{
    api::{
        self,
        config_discovery_server::{ConfigDiscovery, ConfigDiscoveryServer},
    },
    metrics::{GrpcServerMetricsFamily, ResponseObserver},
};
use argon_controller_core::{
    hub::SharedHub, AuthConfig, Cluster, Endpoint, HeaderRewrite, Route, Snapshot, Subscription,
    TlsBundle,
};
use futures::prelude::*;
use std::pin::Pin;
use tonic::server::NamedService;

/// Serves snapshot watches from the distribution hub.
#[derive(Clone, Debug)]
pub struct ConfigDiscoveryService {
    hub: SharedHub,
    drain: drain::Watch,
    metrics: GrpcServerMetricsFamily,
}

type BoxWatchStream = Pin<Box<dyn Stream<Item = Result<api::Snapshot, tonic::Status>> + Send>>;

impl ConfigDiscoveryService {
    pub fn new(hub: SharedHub, drain: drain::Watch, metrics: GrpcServerMetricsFamily) -> Self {
        Self {
            hub,
            drain,
            metrics,
        }
    }

    pub fn svc(self) -> ConfigDiscoveryServer<Self> {
        ConfigDiscoveryServer::new(self)
    }
}

#[async_trait::async_trait]
impl ConfigDiscovery for ConfigDiscoveryService {
    type WatchStream = BoxWatchStream;

    async fn watch(
        &self,
        req: tonic::Request<api::WatchRequest>,
    ) -> Result<tonic::Response<BoxWatchStream>, tonic::Status> {
        let client = req.remote_addr();
        let node = req.into_inner().node_id;
        let sub = self.hub.subscribe();
        tracing::debug!(?client, %node, id = sub.id(), "Watch started");

        let observer = self
            .metrics
            .server_stream_rpc(ConfigDiscoveryServer::<Self>::NAME, "Watch")
            .start();
        Ok(tonic::Response::new(response_stream(
            self.drain.clone(),
            sub,
            observer,
        )))
    }
}

fn response_stream(
    drain: drain::Watch,
    mut sub: Subscription,
    mut observer: ResponseObserver,
) -> BoxWatchStream {
    Box::pin(async_stream::try_stream! {
        tokio::pin! {
            let shutdown = drain.signaled();
        }

        if !sub.current().is_empty() {
            let snapshot = to_proto(sub.current());
            observer.msg_sent();
            yield snapshot;
        }

        loop {
            tokio::select! {
                res = sub.next() => match res {
                    Some(snapshot) => {
                        tracing::trace!(id = sub.id(), version = %snapshot.version, "Sending snapshot");
                        observer.msg_sent();
                        yield to_proto(&snapshot);
                    }
                    None => {
                        observer.end();
                        return;
                    }
                },

                // If the server starts shutting down, close the stream so that it doesn't hold the
                // server open.
                _ = &mut shutdown => {
                    observer.end();
                    return;
                }
            }
        }
    })
}

pub fn to_proto(snapshot: &Snapshot) -> api::Snapshot {
    api::Snapshot {
        version: snapshot.version.clone(),
        controller_id: snapshot.controller_id.clone(),
        ingress_class_name: snapshot.ingress_class.clone(),
        generated_at_unix_sec: snapshot
            .generated_at
            .map(|at| at.timestamp())
            .unwrap_or_default(),
        resource_versions: snapshot.resource_versions.clone().into_iter().collect(),
        routes: snapshot.routes.iter().map(convert_route).collect(),
        clusters: snapshot.clusters.iter().map(convert_cluster).collect(),
        server_tls: snapshot.tls.iter().map(convert_tls).collect(),
    }
}

fn convert_route(route: &Route) -> api::Route {
    api::Route {
        host: route.host.clone(),
        path: route.path.clone(),
        path_type: route.path_match.to_string(),
        cluster: route.cluster.clone(),
        priority: saturating_i32(route.priority),
    }
}

fn convert_cluster(cluster: &Cluster) -> api::Cluster {
    api::Cluster {
        name: cluster.name.clone(),
        lb_policy: cluster.lb_policy.to_string(),
        endpoints: cluster.endpoints.iter().map(convert_endpoint).collect(),
        timeout_ms: saturating_i32(cluster.timeout_ms),
        retries: saturating_i32(cluster.retries),
        backend_protocol: cluster.backend_protocol.clone(),
        request_headers: cluster.request_headers.iter().map(convert_header).collect(),
        auth: cluster.auth.as_ref().map(convert_auth),
    }
}

fn convert_endpoint(endpoint: &Endpoint) -> api::Endpoint {
    api::Endpoint {
        address: endpoint.address.clone(),
        port: endpoint.port.into(),
        weight: saturating_i32(endpoint.weight),
        zone: endpoint.zone.clone().unwrap_or_default(),
        region: endpoint.region.clone().unwrap_or_default(),
    }
}

fn convert_header(header: &HeaderRewrite) -> api::HeaderRewrite {
    api::HeaderRewrite {
        name: header.name.clone(),
        mode: header.mode.to_string(),
        value: header.value.clone().unwrap_or_default(),
    }
}

fn convert_auth(auth: &AuthConfig) -> api::AuthConfig {
    api::AuthConfig {
        url: auth.url.clone().unwrap_or_default(),
        signin: auth.signin.clone().unwrap_or_default(),
        response_headers: auth.response_headers.clone(),
        skip_paths: auth.skip_paths.clone(),
        cookie_name: auth.cookie_name.clone().unwrap_or_default(),
    }
}

fn convert_tls(bundle: &TlsBundle) -> api::ServerTlsBundle {
    api::ServerTlsBundle {
        name: bundle.name.clone(),
        sni: bundle.sni.clone(),
        cert_pem: bundle.cert_pem.clone(),
        key_pem: bundle.key_pem.clone(),
        not_after_unix: bundle.not_after,
        version: bundle.fingerprint.clone(),
    }
}

fn saturating_i32<T: TryInto<i32>>(value: T) -> i32 {
    value.try_into().unwrap_or(i32::MAX)
}
