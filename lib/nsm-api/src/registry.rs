//! Messages exchanged with a network service registry
//!
//! These mirror the custom resources in [`crate::v1`] but are flat and
//! independent of Kubernetes object metadata, so a registry server can
//! accept them from local endpoint processes.

use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::v1;

/// Label key carrying the URL of the manager that registered an endpoint
pub const NSM_URL_LABEL: &str = "nsmurl";

/// A registered (or to-be-registered) network service endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkServiceEndpoint {
    /// Unique endpoint name, empty when the registry should pick one
    #[serde(default)]
    pub endpoint_name: String,
    pub network_service_name: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub socket_location: String,
}

impl NetworkServiceEndpoint {
    /// URL of the manager that registered this endpoint, if recorded
    pub fn nsm_url(&self) -> Option<&str> {
        self.labels.get(NSM_URL_LABEL).map(String::as_str)
    }

    /// Build the custom resource for this endpoint under `name`
    pub fn to_resource(&self, name: &str, namespace: &str) -> v1::NetworkServiceEndpoint {
        let labels = if self.labels.is_empty() {
            None
        } else {
            Some(self.labels.clone())
        };
        v1::NetworkServiceEndpoint {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels,
                ..Default::default()
            },
            spec: v1::network_service_endpoint::NetworkServiceEndpointSpec {
                network_service_name: self.network_service_name.clone(),
                payload: self.payload.clone(),
                nsm_name: None,
                socket_location: self.socket_location.clone(),
            },
        }
    }
}

impl From<&v1::NetworkServiceEndpoint> for NetworkServiceEndpoint {
    fn from(resource: &v1::NetworkServiceEndpoint) -> Self {
        Self {
            endpoint_name: resource.name_any(),
            network_service_name: resource.spec.network_service_name.clone(),
            payload: resource.spec.payload.clone(),
            labels: resource.labels().clone(),
            socket_location: resource.spec.socket_location.clone(),
        }
    }
}

/// A named service contract
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkService {
    pub name: String,
    pub payload: String,
}

impl From<&v1::NetworkService> for NetworkService {
    fn from(resource: &v1::NetworkService) -> Self {
        Self {
            name: resource.name_any(),
            payload: resource.spec.payload.clone(),
        }
    }
}

/// A control-plane instance and the URL it is reachable at
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkServiceManager {
    pub name: String,
    pub url: String,
}

impl From<&v1::NetworkServiceManager> for NetworkServiceManager {
    fn from(resource: &v1::NetworkServiceManager) -> Self {
        Self {
            name: resource.name_any(),
            url: resource.spec.url.clone(),
        }
    }
}

/// Request to remove a registered endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveNseRequest {
    pub endpoint_name: String,
}

impl RemoveNseRequest {
    pub fn new(endpoint_name: impl Into<String>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
        }
    }
}

/// Empty reply
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}
