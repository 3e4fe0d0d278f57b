//! nsmd configuration
//!
//! Loaded from an optional YAML file named by `NSMD_CONFIG`, then
//! overridden by individual environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct NsmdConfig {
    /// Name of this manager
    pub nsm_name: String,

    /// URL other managers reach this one at
    pub nsm_url: String,

    /// Namespace the registry caches watch; all namespaces when unset
    pub namespace: Option<String>,

    /// Upstream registry; registrations stay local when unset
    pub upstream: Option<UpstreamConfig>,

    /// Capacity of each ResourceCache event queue
    pub cache_queue_capacity: usize,

    /// Workspace served by the registry server
    pub workspace: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// Namespace NetworkServiceEndpoint resources are created in
    pub namespace: String,
}

impl Default for NsmdConfig {
    fn default() -> Self {
        Self {
            nsm_name: "nsmd".to_string(),
            nsm_url: "127.0.0.1:5001".to_string(),
            namespace: None,
            upstream: None,
            cache_queue_capacity: nsm_k8s::DEFAULT_QUEUE_CAPACITY,
            workspace: "nsm-0".to_string(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
        }
    }
}

impl NsmdConfig {
    /// Load from `NSMD_CONFIG` (if set) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("NSMD_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(name) = var("NSM_NAME") {
            self.nsm_name = name;
        }
        if let Some(url) = var("NSM_URL") {
            self.nsm_url = url;
        }
        if let Some(namespace) = var("NSM_NAMESPACE") {
            self.namespace = Some(namespace);
        }
        if let Some(namespace) = var("NSM_REGISTRY_NAMESPACE") {
            self.upstream = Some(UpstreamConfig { namespace });
        }
        if let Some(capacity) = var("NSM_CACHE_QUEUE_CAPACITY") {
            self.cache_queue_capacity = capacity
                .parse()
                .with_context(|| format!("invalid NSM_CACHE_QUEUE_CAPACITY: {}", capacity))?;
        }
        Ok(())
    }
}
