use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NetworkServiceEndpoint is a concrete process offering a network service.
/// Endpoint labels are carried in the object metadata.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networkservicemesh.io",
    version = "v1",
    kind = "NetworkServiceEndpoint",
    plural = "networkserviceendpoints",
    shortname = "nse",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.networkServiceName"}"#,
    printcolumn = r#"{"name":"Manager","type":"string","jsonPath":".spec.nsmName"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkServiceEndpointSpec {
    /// Name of the NetworkService this endpoint implements
    pub network_service_name: String,

    /// Payload type carried by the endpoint, e.g. "IP"
    #[serde(default)]
    pub payload: String,

    /// Name of the NetworkServiceManager owning the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsm_name: Option<String>,

    /// Socket the endpoint accepts connection requests on
    #[serde(default)]
    pub socket_location: String,
}
