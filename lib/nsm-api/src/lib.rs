//! Network Service Mesh API types
//!
//! This library defines:
//! - v1: the custom resources backing the cluster-wide registry
//!   (NetworkServiceEndpoint, NetworkService, NetworkServiceManager)
//! - registry: the messages exchanged with a registry server

pub mod v1;
pub mod registry;

pub use registry::{Empty, RemoveNseRequest, NSM_URL_LABEL};
