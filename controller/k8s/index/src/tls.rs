use crate::ClusterLookup;
use argon_controller_core::{TlsBundle, TlsError};
use argon_controller_k8s_api::{self as k8s, Secret};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret {0} not found")]
    NotFound(String),

    #[error("secret {name}: {source}")]
    Bundle {
        name: String,
        #[source]
        source: TlsError,
    },
}

/// Builds a TLS bundle named `<namespace>/<name>` from a `kubernetes.io/tls`
/// secret.
pub fn build_bundle(
    cluster: &dyn ClusterLookup,
    namespace: &str,
    name: &str,
    sni: Vec<String>,
) -> Result<TlsBundle, SecretError> {
    let bundle_name = format!("{namespace}/{name}");
    let secret = cluster
        .secret(namespace, name)
        .ok_or_else(|| SecretError::NotFound(bundle_name.clone()))?;

    TlsBundle::build(
        bundle_name.clone(),
        sni,
        secret_data(secret, k8s::TLS_CERT_KEY),
        secret_data(secret, k8s::TLS_KEY_KEY),
    )
    .map_err(|source| SecretError::Bundle {
        name: bundle_name,
        source,
    })
}

fn secret_data<'s>(secret: &'s Secret, key: &str) -> &'s [u8] {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| bytes.0.as_slice())
        .unwrap_or_default()
}
