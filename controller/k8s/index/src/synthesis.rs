use crate::{
    gateway::{self, GatewayAddress, GatewayError, GatewaySource},
    index::SharedIndex,
    ingress,
    metrics::{PassResult, SynthesisMetrics},
    TargetSource,
};
use anyhow::{bail, Result};
use argon_controller_core::{hub::SharedHub, Snapshot, Target};
use argon_controller_k8s_api::ResourceExt;
use std::{collections::BTreeMap, net::IpAddr};

/// Resolves symbolic gateway addresses into IPs.
#[async_trait::async_trait]
pub trait NamedResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// Resolves names through the system resolver.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemResolver;

/// Compiles the index into snapshots and publishes them to the hub.
#[derive(Debug)]
pub struct Synthesizer<R = SystemResolver> {
    index: SharedIndex,
    hub: SharedHub,
    ingress_class: String,
    gateway_class: Option<String>,
    resolver: R,
    metrics: SynthesisMetrics,
}

#[async_trait::async_trait]
impl NamedResolver for SystemResolver {
    async fn resolve(&self, name: &str) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((name, 0)).await?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    }
}

// === impl Synthesizer ===

impl<R: NamedResolver> Synthesizer<R> {
    pub fn new(
        index: SharedIndex,
        hub: SharedHub,
        ingress_class: impl Into<String>,
        gateway_class: Option<String>,
        resolver: R,
        metrics: SynthesisMetrics,
    ) -> Self {
        Self {
            index,
            hub,
            ingress_class: ingress_class.into(),
            gateway_class,
            resolver,
            metrics,
        }
    }

    /// Runs a pass whenever the index changes. Passes never overlap.
    pub async fn run(self) {
        let changes = self.index.read().changes();
        loop {
            changes.notified().await;
            self.reconcile().await;
        }
    }

    /// Runs one synthesis pass and publishes the result if it differs from
    /// the current snapshot.
    ///
    /// A failed pass leaves the current snapshot in place.
    pub async fn reconcile(&self) -> PassResult {
        let result = match self.synthesize().await {
            Ok(snapshot) => {
                let version = snapshot.version.clone();
                let routes = snapshot.routes.len();
                let clusters = snapshot.clusters.len();
                if self.hub.publish(snapshot) {
                    tracing::info!(%version, routes, clusters, "Published snapshot");
                    PassResult::Published
                } else {
                    tracing::debug!(%version, "Snapshot unchanged");
                    PassResult::Unchanged
                }
            }
            Err(error) => {
                tracing::warn!(%error, "Synthesis failed; keeping the current snapshot");
                PassResult::Failed
            }
        };
        self.metrics.record(result);
        result
    }

    pub async fn synthesize(&self) -> Result<Snapshot> {
        if let Some(class) = self.gateway_class.as_deref() {
            self.check_gateway_addresses(class).await?;
        }

        let (targets, versions) = self.collect_targets()?;
        Ok(Snapshot::synthesize(
            self.ingress_class.clone(),
            targets,
            versions,
        ))
    }

    /// Ensures every gateway of the class is reachable on at least one
    /// address.
    async fn check_gateway_addresses(&self, class: &str) -> Result<()> {
        let gateways = {
            let index = self.index.read();
            index
                .gateways()
                .filter(|gw| gateway::matches_class(gw, class))
                .map(|gw| {
                    let name = format!(
                        "{}/{}",
                        gw.namespace().unwrap_or_default(),
                        gw.name_unchecked()
                    );
                    (name, gateway::addresses(gw))
                })
                .collect::<Vec<_>>()
        };
        if gateways.is_empty() {
            bail!("no gateways match class {class}");
        }

        for (name, addresses) in gateways {
            let mut ips = Vec::new();
            for address in addresses? {
                match address {
                    GatewayAddress::Ip(ip) => ips.push(ip),
                    GatewayAddress::Named(host) => {
                        let resolved =
                            self.resolver
                                .resolve(&host)
                                .await
                                .map_err(|source| GatewayError::Resolve {
                                    name: host.clone(),
                                    source,
                                })?;
                        if resolved.is_empty() {
                            return Err(GatewayError::Unresolved { name: host }.into());
                        }
                        ips.extend(resolved);
                    }
                }
            }
            tracing::debug!(gateway = %name, addresses = ?ips, "Gateway addresses");
        }
        Ok(())
    }

    fn collect_targets(&self) -> Result<(Vec<Target>, BTreeMap<String, String>)> {
        let index = self.index.read();
        let mut targets = Vec::new();
        let mut versions = BTreeMap::new();

        for ing in index
            .ingresses()
            .filter(|ing| ingress::matches_class(ing, &self.ingress_class))
        {
            match ing.extract_targets(&*index) {
                Ok(extracted) => {
                    record_version(&mut versions, ing);
                    targets.extend(extracted);
                }
                Err(error) => {
                    tracing::warn!(error = %format!("{error:#}"), source = %ing.source_key(), "Skipping ingress");
                }
            }
        }

        if let Some(class) = self.gateway_class.as_deref() {
            let gateways = index
                .gateways()
                .filter(|gw| gateway::matches_class(gw, class))
                .map(|gw| GatewaySource::new(gw, index.http_routes()))
                .collect::<Vec<_>>();
            if gateways.is_empty() {
                bail!("no gateways match class {class}");
            }
            for source in gateways {
                match source.extract_targets(&*index) {
                    Ok(extracted) => targets.extend(extracted),
                    Err(error) if is_certificate_error(&error) => {
                        tracing::warn!(error = %format!("{error:#}"), source = %source.source_key(), "Skipping gateway");
                        continue;
                    }
                    Err(error) => return Err(error),
                }
                record_version(&mut versions, &source);
                for route in source.routes() {
                    if let Some(version) = route.resource_version() {
                        versions.insert(
                            format!(
                                "httproute:{}/{}",
                                route.namespace().unwrap_or_default(),
                                route.name_unchecked()
                            ),
                            version,
                        );
                    }
                }
            }
        }

        Ok((targets, versions))
    }
}

/// Listener certificate failures are scoped to the gateway that declares the
/// listener.
fn is_certificate_error(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<GatewayError>(),
        Some(
            GatewayError::Certificate { .. }
                | GatewayError::UnsupportedCertificateKind { .. }
                | GatewayError::UnsupportedCertificateGroup { .. }
        )
    )
}

fn record_version(versions: &mut BTreeMap<String, String>, source: &impl TargetSource) {
    if let Some(version) = source.source_version() {
        versions.insert(source.source_key(), version);
    }
}
