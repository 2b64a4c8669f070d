//! Wire types and service plumbing for `argon.config.ConfigDiscovery`,
//! generated from `proto/argon/config.proto`.

#![allow(clippy::derive_partial_eq_without_eq)]

tonic::include_proto!("argon.config");
