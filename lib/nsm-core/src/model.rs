//! Local model of the endpoints registered through this manager

use crate::{CoreError, Result};
use nsm_api::registry::NetworkServiceEndpoint;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Model is the authoritative local store of registered endpoints.
///
/// Calls are synchronous and expected to be fast; implementations must be
/// safe to share between threads.
#[cfg_attr(test, automock)]
pub trait Model: Send + Sync {
    /// URL other managers reach this one at
    fn nsm_url(&self) -> String;

    fn get_endpoint(&self, name: &str) -> Option<NetworkServiceEndpoint>;

    fn add_endpoint(&self, endpoint: NetworkServiceEndpoint);

    /// Remove an endpoint, failing when it is not known locally
    fn delete_endpoint(&self, name: &str) -> Result<()>;

    /// All endpoints implementing the given network service
    fn endpoints_for_service(&self, network_service: &str) -> Vec<NetworkServiceEndpoint>;

    fn endpoint_count(&self) -> usize;
}

/// In-memory Model keyed by endpoint name
pub struct InMemoryModel {
    nsm_url: String,
    endpoints: RwLock<HashMap<String, NetworkServiceEndpoint>>,
}

impl InMemoryModel {
    pub fn new(nsm_url: impl Into<String>) -> Self {
        Self {
            nsm_url: nsm_url.into(),
            endpoints: RwLock::new(HashMap::new()),
        }
    }
}

impl Model for InMemoryModel {
    fn nsm_url(&self) -> String {
        self.nsm_url.clone()
    }

    fn get_endpoint(&self, name: &str) -> Option<NetworkServiceEndpoint> {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        endpoints.get(name).cloned()
    }

    fn add_endpoint(&self, endpoint: NetworkServiceEndpoint) {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        debug!("Added endpoint to model: {}", endpoint.endpoint_name);
        endpoints.insert(endpoint.endpoint_name.clone(), endpoint);
    }

    fn delete_endpoint(&self, name: &str) -> Result<()> {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        match endpoints.remove(name) {
            Some(_) => {
                debug!("Deleted endpoint from model: {}", name);
                Ok(())
            }
            None => Err(CoreError::LocalState(format!(
                "endpoint {} is not registered in the local model",
                name
            ))),
        }
    }

    fn endpoints_for_service(&self, network_service: &str) -> Vec<NetworkServiceEndpoint> {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        endpoints
            .values()
            .filter(|ep| ep.network_service_name == network_service)
            .cloned()
            .collect()
    }

    fn endpoint_count(&self) -> usize {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        endpoints.len()
    }
}
