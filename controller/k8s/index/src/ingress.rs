use crate::{
    endpoints::{self, BackendPort},
    policy, tls, ClusterLookup, TargetSource,
};
use anyhow::Context;
use argon_controller_core::{BackendPolicy, PathMatch, Target, TargetEndpoint, TlsBundle};
use argon_controller_k8s_api::{HTTPIngressPath, Ingress, IngressRule, ResourceExt};
use std::collections::BTreeMap;

pub fn matches_class(ingress: &Ingress, class: &str) -> bool {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref())
        == Some(class)
}

impl TargetSource for Ingress {
    fn source_key(&self) -> String {
        format!(
            "ing:{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_unchecked()
        )
    }

    fn source_version(&self) -> Option<String> {
        self.resource_version()
    }

    /// Compiles each HTTP rule into a target.
    ///
    /// All targets share the ingress's annotation policy and the last TLS
    /// bundle that could be built from its `tls` entries. Paths whose backends
    /// cannot be resolved are dropped individually.
    fn extract_targets(&self, cluster: &dyn ClusterLookup) -> anyhow::Result<Vec<Target>> {
        let namespace = self.namespace().unwrap_or_default();
        let name = self.name_unchecked();
        let policy = policy::parse(self.annotations())
            .with_context(|| format!("ingress {namespace}/{name}"))?;

        let Some(spec) = self.spec.as_ref() else {
            return Ok(Vec::new());
        };
        let bundle = tls_bundle(self, cluster, &namespace);

        let targets = spec
            .rules
            .iter()
            .flatten()
            .filter_map(|rule| {
                rule_target(rule, cluster, &namespace, &name, &policy, bundle.clone())
            })
            .collect();
        Ok(targets)
    }
}

/// Returns the last bundle that could be built from the ingress's `tls`
/// entries. Entries without a secret name or without hosts are ignored.
fn tls_bundle(ingress: &Ingress, cluster: &dyn ClusterLookup, namespace: &str) -> Option<TlsBundle> {
    let entries = ingress.spec.as_ref()?.tls.as_ref()?;

    let mut bundle = None;
    for entry in entries {
        let Some(secret) = entry.secret_name.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };
        let hosts = entry.hosts.clone().unwrap_or_default();
        if hosts.is_empty() {
            continue;
        }
        match tls::build_bundle(cluster, namespace, secret, hosts) {
            Ok(b) => bundle = Some(b),
            Err(error) => tracing::warn!(
                %error,
                %namespace,
                ingress = %ingress.name_unchecked(),
                %secret,
                "Skipping TLS entry"
            ),
        }
    }
    bundle
}

fn rule_target(
    rule: &IngressRule,
    cluster: &dyn ClusterLookup,
    namespace: &str,
    ingress: &str,
    policy: &BackendPolicy,
    tls: Option<TlsBundle>,
) -> Option<Target> {
    let http = rule.http.as_ref()?;
    let host = rule.host.clone().unwrap_or_default();

    let mut paths = BTreeMap::new();
    for path in &http.paths {
        if let Some((p, endpoint)) = path_endpoint(path, cluster, namespace, policy) {
            paths.insert(p, endpoint);
        } else {
            tracing::debug!(%namespace, %ingress, %host, path = ?path.path, "Dropping path");
        }
    }

    if paths.is_empty() {
        tracing::info!(%namespace, %ingress, %host, "Rule has no viable backends");
        return None;
    }
    Some(Target { host, paths, tls })
}

fn path_endpoint(
    path: &HTTPIngressPath,
    cluster: &dyn ClusterLookup,
    namespace: &str,
    policy: &BackendPolicy,
) -> Option<(String, TargetEndpoint)> {
    let backend = path.backend.service.as_ref()?;
    let port = match backend.port.as_ref() {
        Some(port) => match port.name.as_deref() {
            Some(name) if !name.is_empty() => BackendPort::Name(name),
            _ => BackendPort::Number(port.number.unwrap_or_default()),
        },
        None => BackendPort::Number(0),
    };

    let resolved = match endpoints::resolve(cluster, namespace, &backend.name, port) {
        Ok(resolved) => resolved,
        Err(error) => {
            tracing::info!(%error, %namespace, service = %backend.name, ?port, "Backend unresolved");
            return None;
        }
    };

    let p = path.path.clone().unwrap_or_else(|| "/".to_string());
    Some((
        p,
        TargetEndpoint {
            port: resolved.port,
            protocol: resolved.protocol,
            addresses: resolved.addresses,
            path_match: PathMatch::from(path.path_type.as_str()),
            policy: policy.clone(),
        },
    ))
}
