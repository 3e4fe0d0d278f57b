use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NetworkServiceManager is a per-node control-plane instance
/// participating in the cluster-wide registry
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networkservicemesh.io",
    version = "v1",
    kind = "NetworkServiceManager",
    plural = "networkservicemanagers",
    shortname = "nsm",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkServiceManagerSpec {
    /// URL other managers reach this one at
    pub url: String,
}
