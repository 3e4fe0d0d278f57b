//! Workspace bookkeeping
//!
//! A workspace is the local context of a connected endpoint process. The
//! registry tracks which endpoints each workspace registered so the
//! workspace can be notified, and cleaned up, when they change.

use nsm_api::registry::NetworkServiceEndpoint;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Local application context of a connected endpoint process
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Workspace {
    pub name: String,
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg_attr(test, automock)]
pub trait WorkspaceRegistry: Send + Sync {
    /// Associate an endpoint with a workspace, moving it if another
    /// workspace held it before
    fn add_endpoint_to_workspace(&self, workspace: &Workspace, endpoint: &NetworkServiceEndpoint);

    fn delete_endpoint_from_workspace(&self, endpoint_name: &str);

    /// Name of the workspace holding the endpoint
    fn workspace_of(&self, endpoint_name: &str) -> Option<String>;

    fn endpoints_in(&self, workspace: &str) -> Vec<String>;
}

#[derive(Default)]
struct Associations {
    by_endpoint: HashMap<String, String>,
    by_workspace: HashMap<String, BTreeSet<String>>,
}

impl Associations {
    fn detach(&mut self, endpoint_name: &str) -> Option<String> {
        let workspace = self.by_endpoint.remove(endpoint_name)?;
        if let Some(endpoints) = self.by_workspace.get_mut(&workspace) {
            endpoints.remove(endpoint_name);
            if endpoints.is_empty() {
                self.by_workspace.remove(&workspace);
            }
        }
        Some(workspace)
    }
}

/// In-memory WorkspaceRegistry shared by all registry servers of a process
#[derive(Default)]
pub struct InMemoryWorkspaceRegistry {
    inner: RwLock<Associations>,
}

impl InMemoryWorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkspaceRegistry for InMemoryWorkspaceRegistry {
    fn add_endpoint_to_workspace(&self, workspace: &Workspace, endpoint: &NetworkServiceEndpoint) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let name = endpoint.endpoint_name.clone();
        if let Some(previous) = inner.detach(&name) {
            if previous != workspace.name {
                debug!("Endpoint {} moved from workspace {} to {}", name, previous, workspace.name);
            }
        }
        inner
            .by_workspace
            .entry(workspace.name.clone())
            .or_default()
            .insert(name.clone());
        inner.by_endpoint.insert(name, workspace.name.clone());
    }

    fn delete_endpoint_from_workspace(&self, endpoint_name: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(workspace) = inner.detach(endpoint_name) {
            debug!("Endpoint {} removed from workspace {}", endpoint_name, workspace);
        }
    }

    fn workspace_of(&self, endpoint_name: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_endpoint.get(endpoint_name).cloned()
    }

    fn endpoints_in(&self, workspace: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_workspace
            .get(workspace)
            .map(|endpoints| endpoints.iter().cloned().collect())
            .unwrap_or_default()
    }
}
