//! Kubernetes integration for the network service registry
//!
//! This library provides:
//! - Informers turning watches on the registry CRDs into add/update/delete callbacks
//! - ResourceCache, an ordered single-consumer bridge from an informer to hooks
//! - Typed object caches for endpoints, services and managers
//! - A registry client storing endpoints as custom resources

pub mod client;
pub mod informer;
pub mod object_cache;
pub mod registry_client;
pub mod resource_cache;

pub use client::K8sClient;
pub use informer::{
    object_key, Informer, InformerFactory, KubeInformerFactory, ResourceEventHandler, ResourceKind,
};
pub use object_cache::{
    CacheEvent, NetworkServiceCache, NetworkServiceEndpointCache, NetworkServiceManagerCache,
    ObjectCache,
};
pub use registry_client::{KubeRegistryClient, KubeUpstreamResolver};
pub use resource_cache::{
    CacheConfig, CachedResource, ResourceCache, StopHandle, DEFAULT_QUEUE_CAPACITY,
};
