//! Client seam towards the cluster-wide registry

use crate::Result;
use async_trait::async_trait;
use nsm_api::registry::{Empty, NetworkServiceEndpoint, RemoveNseRequest};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Pass-through client to an upstream registry service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UpstreamRegistryClient: Send + Sync {
    /// Register an endpoint, returning the canonical record the registry stored
    async fn register_nse(
        &self,
        endpoint: NetworkServiceEndpoint,
    ) -> Result<NetworkServiceEndpoint>;

    async fn remove_nse(&self, request: RemoveNseRequest) -> Result<Empty>;
}

/// Resolves the upstream registry client for a call.
///
/// `Ok(None)` means no upstream registry is configured, which is a valid
/// local-only deployment and not an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UpstreamResolver: Send + Sync {
    async fn resolve(&self) -> Result<Option<Arc<dyn UpstreamRegistryClient>>>;
}

/// Resolver for deployments without an upstream registry
#[derive(Clone, Copy, Debug, Default)]
pub struct NoUpstream;

#[async_trait]
impl UpstreamResolver for NoUpstream {
    async fn resolve(&self) -> Result<Option<Arc<dyn UpstreamRegistryClient>>> {
        Ok(None)
    }
}
