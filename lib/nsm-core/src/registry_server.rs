//! Registry server handling endpoint registration from a local workspace
//!
//! Registrations are passed through to the upstream registry first. Local
//! state (model and workspace bookkeeping) is only touched once the
//! upstream registry accepted the call.

use crate::{
    CoreError, Model, Result, UpstreamRegistryClient, UpstreamResolver, Workspace,
    WorkspaceRegistry,
};
use nsm_api::registry::{Empty, NetworkServiceEndpoint, RemoveNseRequest, NSM_URL_LABEL};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// RegistryServer serves one workspace. Model and workspace registry are
/// shared by all servers of the process.
pub struct RegistryServer {
    model: Arc<dyn Model>,
    workspaces: Arc<dyn WorkspaceRegistry>,
    upstream: Arc<dyn UpstreamResolver>,
    workspace: Workspace,
}

impl RegistryServer {
    pub fn new(
        model: Arc<dyn Model>,
        workspaces: Arc<dyn WorkspaceRegistry>,
        upstream: Arc<dyn UpstreamResolver>,
        workspace: Workspace,
    ) -> Self {
        Self {
            model,
            workspaces,
            upstream,
            workspace,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Register an endpoint with the upstream registry and record it locally.
    ///
    /// Without an upstream registry the request is returned unchanged and
    /// nothing is recorded.
    pub async fn register_nse(
        &self,
        mut request: NetworkServiceEndpoint,
    ) -> Result<NetworkServiceEndpoint> {
        info!("Received RegisterNSE request: {:?}", request);

        let client = match self.resolve_upstream().await? {
            Some(client) => client,
            None => {
                info!(
                    "No upstream registry configured, endpoint for {} will only be registered on this nsm",
                    request.network_service_name
                );
                return Ok(request);
            }
        };

        request
            .labels
            .insert(NSM_URL_LABEL.to_string(), self.model.nsm_url());

        let endpoint = client.register_nse(request).await.map_err(|e| {
            let err = into_upstream_error(e);
            error!("{}", err);
            err
        })?;

        if self.model.get_endpoint(&endpoint.endpoint_name).is_none() {
            self.model.add_endpoint(endpoint.clone());
        } else {
            debug!("Endpoint {} already known, re-attaching to workspace", endpoint.endpoint_name);
        }
        self.workspaces
            .add_endpoint_to_workspace(&self.workspace, &endpoint);

        info!(
            "Registered endpoint {} in workspace {}",
            endpoint.endpoint_name, self.workspace.name
        );
        Ok(endpoint)
    }

    /// Remove an endpoint upstream, then from local bookkeeping.
    ///
    /// A `LocalState` error means the upstream removal and workspace cleanup
    /// already happened but the local model did not know the endpoint.
    pub async fn remove_nse(&self, request: RemoveNseRequest) -> Result<Empty> {
        info!("Received Endpoint Remove request: {:?}", request);

        let client = self.resolve_upstream().await?.ok_or_else(|| {
            let err = CoreError::Connectivity(
                "no upstream registry configured, endpoint removal requires one".to_string(),
            );
            error!("{}", err);
            err
        })?;

        client.remove_nse(request.clone()).await.map_err(|e| {
            let err = into_upstream_error(e);
            error!("{}", err);
            err
        })?;

        self.workspaces
            .delete_endpoint_from_workspace(&request.endpoint_name);
        if let Err(e) = self.model.delete_endpoint(&request.endpoint_name) {
            let err = match e {
                CoreError::LocalState(msg) => CoreError::LocalState(msg),
                other => CoreError::LocalState(other.to_string()),
            };
            warn!(
                "Endpoint {} removed upstream but local cleanup failed: {}",
                request.endpoint_name, err
            );
            return Err(err);
        }

        info!("Removed endpoint {}", request.endpoint_name);
        Ok(Empty {})
    }

    pub fn close(&self) {}

    async fn resolve_upstream(&self) -> Result<Option<Arc<dyn UpstreamRegistryClient>>> {
        self.upstream.resolve().await.map_err(|e| {
            let err = match e {
                CoreError::Connectivity(msg) => CoreError::Connectivity(msg),
                other => CoreError::Connectivity(other.to_string()),
            };
            error!("{}", err);
            err
        })
    }
}

fn into_upstream_error(e: CoreError) -> CoreError {
    match e {
        CoreError::UpstreamRpc(msg) => CoreError::UpstreamRpc(msg),
        other => CoreError::UpstreamRpc(other.to_string()),
    }
}
