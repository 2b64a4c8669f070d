#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use argon_controller_core as core;
pub use argon_controller_grpc as grpc;
pub use argon_controller_k8s_api as k8s;
pub use argon_controller_k8s_index as index;

mod args;
pub mod identity;

pub use self::args::Args;
