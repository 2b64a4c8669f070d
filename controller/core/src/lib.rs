#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod hub;
pub mod snapshot;
pub mod target;
pub mod tls;

pub use self::{
    hub::{Hub, Subscription},
    snapshot::{Cluster, Endpoint, Route, Snapshot},
    target::{
        AuthConfig, BackendPolicy, HeaderMode, HeaderRewrite, LbAlgorithm, PathMatch, Target,
        TargetEndpoint,
    },
    tls::{TlsBundle, TlsError},
};

/// Identifies the snapshots produced by this controller.
pub const CONTROLLER_ID: &str = "argon.github.io/ingress";
