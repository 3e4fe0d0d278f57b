//! Kubernetes client for the registry resources

use crate::informer::KubeInformerFactory;
use kube::Client;
use nsm_core::{CoreError, Result};

/// K8sClient wraps the Kubernetes client shared by informers and the
/// upstream registry client
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a client from the in-cluster or kubeconfig environment
    pub async fn new() -> Result<Self> {
        let client = Client::try_default().await.map_err(|e| {
            CoreError::Connectivity(format!("cannot create kubernetes client: {}", e))
        })?;
        Ok(Self { client })
    }

    /// Get a clone of the Kubernetes client
    pub fn clone_client(&self) -> Client {
        self.client.clone()
    }

    /// Informer factory watching `namespace`, or all namespaces when `None`
    pub fn informer_factory(&self, namespace: Option<&str>) -> KubeInformerFactory {
        KubeInformerFactory::new(self.client.clone(), namespace.map(str::to_string))
    }
}
