use crate::{
    core::Hub,
    grpc,
    identity::{self, Identity},
    index::{self, Index},
    k8s::{self, gateway, Client, Resource},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::prelude::*;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, time::Duration};
use tonic::transport::{server::Router, Server};
use tracing::{info, info_span, instrument, Instrument};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[clap(name = "argon", about = "An ingress and gateway control plane")]
pub struct Args {
    #[clap(long, default_value = "argon=info,warn", env = "ARGON_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = "0.0.0.0:18000")]
    grpc_addr: SocketAddr,

    /// Only ingresses with this class are compiled.
    #[clap(long, default_value = "argon")]
    ingress_class: String,

    /// When set, gateways of this class and their HTTP routes are compiled
    /// as well.
    #[clap(long)]
    gateway_class: Option<String>,

    #[clap(long, default_value = "argon-system", env = "POD_NAMESPACE")]
    controller_namespace: String,

    /// The control plane's service name, used to issue its certificate.
    #[clap(long, default_value = "argon-controlplane")]
    service_name: String,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    /// The secret that persists the control plane's transport identity.
    #[clap(long, default_value = "grpc-tls")]
    identity_secret_name: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            grpc_addr,
            ingress_class,
            gateway_class,
            controller_namespace,
            service_name,
            cluster_domain,
            identity_secret_name,
        } = self;

        let index = Index::shared();
        let hub = Hub::shared();

        let mut prom = <Registry>::default();
        let argon = prom.sub_registry_with_prefix("argon");
        index::metrics::register(argon.sub_registry_with_prefix("index"), index.clone());
        let synthesis_metrics =
            index::metrics::SynthesisMetrics::register(argon.sub_registry_with_prefix("synthesis"));
        let grpc_metrics = grpc::metrics::GrpcServerMetricsFamily::register(
            argon.sub_registry_with_prefix("grpc_server"),
        );
        grpc::metrics::register_hub(argon, hub.clone());
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Issue and persist the transport identity before anything is served.
        let identity = Identity::issue(&service_name, &controller_namespace, &cluster_domain)?;
        identity::apply(
            runtime.client(),
            &identity,
            &controller_namespace,
            &identity_secret_name,
        )
        .await?;
        let identity_secrets = runtime.watch_namespaced::<k8s::Secret>(
            controller_namespace.clone(),
            watcher_config().fields(&format!("metadata.name={identity_secret_name}")),
        );
        tokio::spawn(
            identity::maintain(
                runtime.client(),
                identity.clone(),
                controller_namespace,
                identity_secret_name,
                identity_secrets,
            )
            .instrument(info_span!("identity")),
        );

        // Spawn resource watches.

        let ingresses = runtime.watch_all::<k8s::Ingress>(watcher_config());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), ingresses)
                .instrument(info_span!("ingresses")),
        );

        let services = runtime.watch_all::<k8s::Service>(watcher_config());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), services).instrument(info_span!("services")),
        );

        let slices = runtime.watch_all::<k8s::EndpointSlice>(watcher_config());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), slices)
                .instrument(info_span!("endpointslices")),
        );

        let secrets = runtime.watch_all::<k8s::Secret>(
            watcher_config().fields(&format!("type={}", k8s::TLS_SECRET_TYPE)),
        );
        tokio::spawn(
            kubert::index::namespaced(index.clone(), secrets).instrument(info_span!("secrets")),
        );

        if gateway_class.is_some() {
            if api_resource_exists::<gateway::Gateway>(&runtime.client()).await {
                let gateways = runtime.watch_all::<gateway::Gateway>(watcher_config());
                tokio::spawn(
                    kubert::index::namespaced(index.clone(), gateways)
                        .instrument(info_span!("gateways.gateway.networking.k8s.io")),
                );
            } else {
                tracing::warn!(
                    "gateways.gateway.networking.k8s.io resource kind not found, skipping watches"
                );
            }

            if api_resource_exists::<gateway::HTTPRoute>(&runtime.client()).await {
                let http_routes = runtime.watch_all::<gateway::HTTPRoute>(watcher_config());
                tokio::spawn(
                    kubert::index::namespaced(index.clone(), http_routes)
                        .instrument(info_span!("httproutes.gateway.networking.k8s.io")),
                );
            } else {
                tracing::warn!(
                    "httproutes.gateway.networking.k8s.io resource kind not found, skipping watches"
                );
            }
        }

        // Compile the index into snapshots as it changes.
        let synthesizer = index::Synthesizer::new(
            index,
            hub.clone(),
            ingress_class,
            gateway_class,
            index::SystemResolver,
            synthesis_metrics,
        );
        tokio::spawn(synthesizer.run().instrument(info_span!("synthesis")));

        // Binding and TLS configuration happen up front so that failures
        // abort startup.
        let listener = tokio::net::TcpListener::bind(grpc_addr)
            .await
            .with_context(|| format!("failed to bind gRPC server on {grpc_addr}"))?;
        let discovery =
            grpc::ConfigDiscoveryService::new(hub, runtime.shutdown_handle(), grpc_metrics).svc();
        let router = Server::builder()
            .tls_config(identity.server_tls_config())
            .context("failed to configure gRPC server TLS")?
            .http2_keepalive_interval(Some(KEEPALIVE_INTERVAL))
            .http2_keepalive_timeout(Some(KEEPALIVE_TIMEOUT))
            .add_service(discovery);
        tokio::spawn(serve_grpc(
            grpc_addr,
            listener,
            router,
            runtime.shutdown_handle(),
        ));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

fn watcher_config() -> k8s::watcher::Config {
    k8s::watcher::Config::default()
}

#[instrument(skip_all, fields(port = %addr.port()))]
async fn serve_grpc(
    addr: SocketAddr,
    listener: tokio::net::TcpListener,
    router: Router,
    drain: drain::Watch,
) -> Result<()> {
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    let (close_tx, close_rx) = tokio::sync::oneshot::channel();
    tokio::pin! {
        let srv = router.serve_with_incoming_shutdown(incoming, close_rx.map(|_| {}));
    }

    info!(%addr, "Config discovery gRPC server listening");
    tokio::select! {
        res = (&mut srv) => res?,
        handle = drain.signaled() => {
            let _ = close_tx.send(());
            handle.release_after(srv).await?
        }
    }
    Ok(())
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["argon"]).expect("defaults must parse");
        assert_eq!(args.grpc_addr, "0.0.0.0:18000".parse().unwrap());
        assert_eq!(args.ingress_class, "argon");
        assert_eq!(args.gateway_class, None);
        assert_eq!(args.service_name, "argon-controlplane");
        assert_eq!(args.cluster_domain, "cluster.local");
        assert_eq!(args.identity_secret_name, "grpc-tls");
    }

    #[test]
    fn gateway_class() {
        let args = Args::try_parse_from([
            "argon",
            "--gateway-class=argon-gw",
            "--controller-namespace=ingress",
            "--grpc-addr=127.0.0.1:9000",
        ])
        .expect("args must parse");
        assert_eq!(args.gateway_class.as_deref(), Some("argon-gw"));
        assert_eq!(args.controller_namespace, "ingress");
        assert_eq!(args.grpc_addr, "127.0.0.1:9000".parse().unwrap());
    }
}
