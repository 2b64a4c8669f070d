#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod api;
mod discovery;
pub mod metrics;

pub use self::discovery::{to_proto, ConfigDiscoveryService};
