//! The control plane's own transport identity.
//!
//! A certificate authority and a leaf certificate signed by it are issued at
//! startup. The gRPC server presents the leaf and only accepts clients whose
//! certificates chain to the authority. The bundle is persisted to a TLS
//! secret so that data planes can mount it, and the secret is re-applied
//! whenever it is deleted or no longer matches the in-memory bundle.

use crate::k8s::{
    self, watcher, Api, ByteString, Client, ObjectMeta, Patch, PatchParams, Secret,
};
use anyhow::{Context, Result};
use futures::prelude::*;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use std::{collections::BTreeMap, net::Ipv4Addr};
use tonic::transport::{Certificate, ServerTlsConfig};

const FIELD_MANAGER: &str = "argon-controller";

#[derive(Clone)]
pub struct Identity {
    ca_pem: String,
    cert_pem: String,
    key_pem: String,
}

/// The DNS names the control plane service is reachable on.
pub fn dns_names(service: &str, namespace: &str, cluster_domain: &str) -> Vec<String> {
    vec![
        service.to_string(),
        format!("{service}.{namespace}"),
        format!("{service}.{namespace}.svc"),
        format!("{service}.{namespace}.svc.{cluster_domain}"),
    ]
}

// === impl Identity ===

impl Identity {
    pub fn issue(service: &str, namespace: &str, cluster_domain: &str) -> Result<Self> {
        let ca_key = KeyPair::generate()?;
        let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, format!("{service}-ca"));
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca = ca_params.self_signed(&ca_key)?;

        let names = dns_names(service, namespace, cluster_domain);
        let leaf_key = KeyPair::generate()?;
        let mut params = CertificateParams::new(names.clone())?;
        params
            .subject_alt_names
            .push(SanType::IpAddress(Ipv4Addr::LOCALHOST.into()));
        params
            .distinguished_name
            .push(DnType::CommonName, names[names.len() - 1].clone());
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let leaf = params.signed_by(&leaf_key, &ca, &ca_key)?;

        Ok(Self {
            ca_pem: ca.pem(),
            cert_pem: leaf.pem(),
            key_pem: leaf_key.serialize_pem(),
        })
    }

    pub fn ca_pem(&self) -> &str {
        &self.ca_pem
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Presents the leaf and requires client certificates issued by the
    /// authority.
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(tonic::transport::Identity::from_pem(
                &self.cert_pem,
                &self.key_pem,
            ))
            .client_ca_root(Certificate::from_pem(&self.ca_pem))
    }

    fn data(&self) -> BTreeMap<String, ByteString> {
        [
            (k8s::TLS_CERT_KEY, &self.cert_pem),
            (k8s::TLS_KEY_KEY, &self.key_pem),
            (k8s::CA_CERT_KEY, &self.ca_pem),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.clone().into_bytes())))
        .collect()
    }

    pub fn to_secret(&self, namespace: &str, name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(
                    [(
                        "app.kubernetes.io/managed-by".to_string(),
                        FIELD_MANAGER.to_string(),
                    )]
                    .into_iter()
                    .collect(),
                ),
                ..Default::default()
            },
            type_: Some(k8s::TLS_SECRET_TYPE.to_string()),
            data: Some(self.data()),
            ..Default::default()
        }
    }

    /// Whether the observed secret differs from this identity.
    pub fn is_drifted(&self, secret: &Secret) -> bool {
        secret.type_.as_deref() != Some(k8s::TLS_SECRET_TYPE)
            || secret.data.as_ref() != Some(&self.data())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity").finish_non_exhaustive()
    }
}

/// Creates or overwrites the identity secret.
pub async fn apply(client: Client, identity: &Identity, namespace: &str, name: &str) -> Result<()> {
    let api = Api::<Secret>::namespaced(client, namespace);
    api.patch(
        name,
        &PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            force: true,
            ..Default::default()
        },
        &Patch::Apply(identity.to_secret(namespace, name)),
    )
    .await
    .with_context(|| format!("failed to apply secret {namespace}/{name}"))?;
    tracing::info!(%namespace, %name, "Applied identity secret");
    Ok(())
}

/// Watches the identity secret and re-applies it whenever it is deleted or
/// drifts from `identity`.
pub async fn maintain(
    client: Client,
    identity: Identity,
    namespace: String,
    name: String,
    events: impl Stream<Item = watcher::Event<Secret>>,
) {
    tokio::pin!(events);
    let mut found = false;
    while let Some(event) = events.next().await {
        let reapply = match event {
            watcher::Event::Init => {
                found = false;
                false
            }
            watcher::Event::InitApply(secret) => {
                found = true;
                identity.is_drifted(&secret)
            }
            watcher::Event::InitDone => !found,
            watcher::Event::Apply(secret) => identity.is_drifted(&secret),
            watcher::Event::Delete(_) => true,
        };
        if !reapply {
            continue;
        }

        tracing::info!(%namespace, %name, "Identity secret missing or drifted");
        if let Err(error) = apply(client.clone(), &identity, &namespace, &name).await {
            tracing::warn!(error = %format!("{error:#}"), "Failed to restore identity secret");
        }
    }
}
