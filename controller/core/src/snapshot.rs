use crate::{
    target::{AuthConfig, HeaderRewrite, LbAlgorithm, PathMatch, Target},
    tls::TlsBundle,
    CONTROLLER_ID,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{cmp::Ordering, collections::BTreeMap};

/// Scales a path-match rank so that it always dominates path length.
const PRIORITY_RANK_SCALE: i64 = 1_000_000;

/// The compiled routing configuration distributed to data-plane consumers.
///
/// A snapshot is never modified after it has been built; newer state is
/// distributed by replacing it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub version: String,
    pub controller_id: String,
    pub ingress_class: String,
    pub generated_at: Option<DateTime<Utc>>,
    /// Informational only; does not contribute to the version.
    pub resource_versions: BTreeMap<String, String>,
    pub routes: Vec<Route>,
    pub clusters: Vec<Cluster>,
    pub tls: Vec<TlsBundle>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Route {
    pub host: String,
    pub path: String,
    pub path_match: PathMatch,
    pub cluster: String,
    pub priority: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Cluster {
    /// `<host>|<path>`.
    pub name: String,
    pub lb_policy: LbAlgorithm,
    pub endpoints: Vec<Endpoint>,
    pub timeout_ms: u32,
    pub retries: u32,
    pub backend_protocol: String,
    pub request_headers: Vec<HeaderRewrite>,
    pub auth: Option<AuthConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    pub weight: u32,
    pub zone: Option<String>,
    pub region: Option<String>,
}

/// The portion of a snapshot that determines its version.
#[derive(Serialize)]
struct VersionedContent<'a> {
    routes: &'a [Route],
    clusters: &'a [Cluster],
    tls: &'a [TlsBundle],
}

// === impl Snapshot ===

impl Snapshot {
    /// Compiles targets into an ordered, versioned snapshot.
    pub fn synthesize(
        ingress_class: impl Into<String>,
        targets: Vec<Target>,
        resource_versions: BTreeMap<String, String>,
    ) -> Self {
        let mut routes = Vec::new();
        let mut clusters = Vec::new();
        let mut tls = Vec::new();

        for Target {
            host,
            paths,
            tls: bundle,
        } in targets
        {
            for (path, endpoint) in paths {
                let cluster = cluster_name(&host, &path);
                routes.push(Route {
                    priority: priority(&endpoint.path_match, &path),
                    host: host.clone(),
                    path,
                    path_match: endpoint.path_match,
                    cluster: cluster.clone(),
                });

                let port = endpoint.port;
                clusters.push(Cluster {
                    name: cluster,
                    lb_policy: endpoint.policy.lb_algorithm,
                    endpoints: endpoint
                        .addresses
                        .into_iter()
                        .map(|address| Endpoint {
                            address,
                            port,
                            weight: 1,
                            zone: None,
                            region: None,
                        })
                        .collect(),
                    timeout_ms: endpoint.policy.timeout_ms,
                    retries: endpoint.policy.retries,
                    backend_protocol: endpoint.policy.backend_protocol,
                    request_headers: endpoint.policy.request_headers,
                    auth: endpoint.policy.auth,
                });
            }

            if let Some(bundle) = bundle.filter(|b| !b.name.is_empty()) {
                tls.push(bundle);
            }
        }

        let mut snapshot = Self {
            version: String::new(),
            controller_id: CONTROLLER_ID.to_string(),
            ingress_class: ingress_class.into(),
            generated_at: Some(Utc::now()),
            resource_versions,
            routes,
            clusters,
            tls,
        };
        snapshot.sort();
        snapshot.version = snapshot.compute_version();
        snapshot
    }

    /// Applies the canonical ordering to routes, clusters, and TLS bundles.
    ///
    /// Clusters and bundles order by name first; entries sharing a name are
    /// ordered by their remaining fields so that the result is total.
    pub fn sort(&mut self) {
        self.routes.sort_by(cmp_routes);
        self.clusters.sort();
        self.tls.sort();
    }

    /// Hashes the canonical rendering of the (already sorted) routes,
    /// clusters, and TLS bundles.
    pub fn compute_version(&self) -> String {
        let content = VersionedContent {
            routes: &self.routes,
            clusters: &self.clusters,
            tls: &self.tls,
        };
        // Serializing plain structs, vectors, and strings to JSON cannot fail.
        let rendered = serde_json::to_vec(&content).unwrap_or_default();
        hex::encode(Sha256::digest(&rendered))
    }

    pub fn is_empty(&self) -> bool {
        self.version.is_empty()
    }
}

pub fn cluster_name(host: &str, path: &str) -> String {
    format!("{host}|{path}")
}

pub fn priority(path_match: &PathMatch, path: &str) -> i64 {
    i64::from(path_match.rank()) * PRIORITY_RANK_SCALE + path.len() as i64
}

fn cmp_routes(a: &Route, b: &Route) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.host.cmp(&b.host))
        .then_with(|| a.path.cmp(&b.path))
        .then_with(|| b.path_match.rank().cmp(&a.path_match.rank()))
        .then_with(|| a.cluster.cmp(&b.cluster))
        .then_with(|| a.cmp(b))
}
