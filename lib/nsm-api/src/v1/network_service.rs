use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NetworkService is a named service contract implemented by one or
/// more NetworkServiceEndpoints
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networkservicemesh.io",
    version = "v1",
    kind = "NetworkService",
    plural = "networkservices",
    shortname = "ns",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkServiceSpec {
    /// Payload contract of the service
    #[serde(default = "default_payload")]
    pub payload: String,
}

fn default_payload() -> String {
    "IP".to_string()
}
