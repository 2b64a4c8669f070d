//! Argon controller resource index
//!
//! The index maintains the latest state of the cluster resources that feed the
//! routing snapshot:
//!
//! - `Ingress` resources whose class matches the controller's ingress class.
//! - `Gateway` resources whose class matches the controller's gateway class,
//!   along with the `HTTPRoute` resources attached to them.
//! - `Service` and `EndpointSlice` resources, used to resolve backend
//!   references into ready addresses.
//! - TLS `Secret` resources referenced by ingresses and gateway listeners.
//!
//! ```text
//! [ Ingress ] ----------------+
//!                             +--> [ Target ] --> [ Snapshot ] --> [ Hub ]
//! [ Gateway ] <- [ HTTPRoute ]+        ^
//!                                      |
//!          [ Service ] + [ EndpointSlice ] + [ Secret ]
//! ```
//!
//! Every change to the index raises a signal that wakes the synthesis task.
//! The synthesis task compiles the whole index into a new snapshot and
//! publishes it only when its version differs from the current one, so bursts
//! of resource events coalesce into at most one observable update.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod endpoints;
pub mod gateway;
mod index;
pub mod ingress;
pub mod metrics;
pub mod policy;
pub mod synthesis;
pub mod tls;


pub use self::{
    endpoints::{BackendPort, ResolveError, ResolvedBackend},
    gateway::{GatewayError, GatewaySource},
    index::{ClusterLookup, Index, SharedIndex},
    synthesis::{NamedResolver, Synthesizer, SystemResolver},
};

use argon_controller_core::Target;

/// A resource kind that can be compiled into routing targets.
pub trait TargetSource {
    /// Identifies the source in logs and in a snapshot's resource versions.
    fn source_key(&self) -> String;

    fn source_version(&self) -> Option<String>;

    fn extract_targets(&self, cluster: &dyn ClusterLookup) -> anyhow::Result<Vec<Target>>;
}
