/// API version v1 for Network Service Mesh CRDs

pub mod network_service_endpoint;
pub mod network_service;
pub mod network_service_manager;

pub use network_service_endpoint::NetworkServiceEndpoint;
pub use network_service::NetworkService;
pub use network_service_manager::NetworkServiceManager;

/// API group for Network Service Mesh resources
pub const API_GROUP: &str = "networkservicemesh.io";
/// API version for Network Service Mesh resources
pub const API_VERSION: &str = "v1";
