#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
pub mod gateway;

pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Secret, Service, ServicePort, ServiceSpec},
        discovery::v1::{Endpoint, EndpointConditions, EndpointPort, EndpointSlice},
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
            IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
        },
    },
    apimachinery::pkg::util::intstr::IntOrString,
    ByteString,
};
pub use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, ResourceExt},
    runtime::watcher,
    Client, Error, Resource,
};

/// Labels an `EndpointSlice` with the name of the service it backs.
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// The only secret type that carries TLS bundles.
pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

/// Secret data key holding the PEM certificate chain.
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret data key holding the PEM private key.
pub const TLS_KEY_KEY: &str = "tls.key";

/// Secret data key holding the PEM certificate authority.
pub const CA_CERT_KEY: &str = "ca.crt";
