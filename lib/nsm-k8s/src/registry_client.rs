//! Upstream registry backed by NetworkServiceEndpoint custom resources

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, ResourceExt};
use nsm_api::registry::{Empty, NetworkServiceEndpoint, RemoveNseRequest};
use nsm_api::v1;
use nsm_core::{CoreError, Result, UpstreamRegistryClient, UpstreamResolver};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Registers endpoints by creating NetworkServiceEndpoint resources
pub struct KubeRegistryClient {
    api: Api<v1::NetworkServiceEndpoint>,
    namespace: String,
    nsm_name: Option<String>,
}

impl KubeRegistryClient {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            nsm_name: None,
        }
    }

    /// Record `nsm_name` as the owner of endpoints registered through this client
    pub fn with_nsm_name(mut self, nsm_name: impl Into<String>) -> Self {
        self.nsm_name = Some(nsm_name.into());
        self
    }
}

#[async_trait]
impl UpstreamRegistryClient for KubeRegistryClient {
    async fn register_nse(
        &self,
        endpoint: NetworkServiceEndpoint,
    ) -> Result<NetworkServiceEndpoint> {
        let name = endpoint_name(&endpoint);
        let mut resource = endpoint.to_resource(&name, &self.namespace);
        resource.spec.nsm_name = self.nsm_name.clone();

        let created = match self.api.create(&PostParams::default(), &resource).await {
            Ok(created) => created,
            // an endpoint process restarting under the name it registered before
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!("NetworkServiceEndpoint {} exists, replacing it", name);
                let existing = self.api.get(&name).await.map_err(upstream_error)?;
                resource.metadata.resource_version = existing.resource_version();
                self.api
                    .replace(&name, &PostParams::default(), &resource)
                    .await
                    .map_err(upstream_error)?
            }
            Err(e) => return Err(upstream_error(e)),
        };

        info!("Registered NetworkServiceEndpoint {}/{}", self.namespace, created.name_any());
        Ok(NetworkServiceEndpoint::from(&created))
    }

    async fn remove_nse(&self, request: RemoveNseRequest) -> Result<Empty> {
        self.api
            .delete(&request.endpoint_name, &DeleteParams::default())
            .await
            .map_err(upstream_error)?;
        info!("Removed NetworkServiceEndpoint {}/{}", self.namespace, request.endpoint_name);
        Ok(Empty {})
    }
}

/// Name to register under: the requested one, or `<service>-<uuid>`
fn endpoint_name(endpoint: &NetworkServiceEndpoint) -> String {
    if endpoint.endpoint_name.is_empty() {
        format!("{}-{}", endpoint.network_service_name, Uuid::new_v4())
    } else {
        endpoint.endpoint_name.clone()
    }
}

fn upstream_error(e: kube::Error) -> CoreError {
    CoreError::UpstreamRpc(e.to_string())
}

/// Resolves the registry client built from the daemon's Kubernetes client
pub struct KubeUpstreamResolver {
    client: Arc<KubeRegistryClient>,
}

impl KubeUpstreamResolver {
    pub fn from_client(client: Client, namespace: &str, nsm_name: Option<String>) -> Self {
        let mut registry = KubeRegistryClient::new(client, namespace);
        if let Some(name) = nsm_name {
            registry = registry.with_nsm_name(name);
        }
        Self {
            client: Arc::new(registry),
        }
    }
}

#[async_trait]
impl UpstreamResolver for KubeUpstreamResolver {
    async fn resolve(&self) -> Result<Option<Arc<dyn UpstreamRegistryClient>>> {
        Ok(Some(self.client.clone() as Arc<dyn UpstreamRegistryClient>))
    }
}
