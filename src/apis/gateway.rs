use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    meta::{NamespacedStatuses, ResourceRef, SslConfig},
    routes::Destination,
};

pub const DEFAULT_PROXY_NAME: &str = "gateway-proxy";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VirtualServiceSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpGateway {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_services: Vec<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_service_selector: Option<VirtualServiceSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_service_namespaces: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TcpHost {
    pub name: String,
    pub destination: Destination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_config: Option<SslConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TcpGateway {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_hosts: Vec<TcpHost>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GatewayKind {
    Http,
    Tcp,
}

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.solo.io",
    version = "v1",
    kind = "Gateway",
    plural = "gateways",
    shortname = "gw",
    status = "NamespacedStatuses",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    #[serde(default)]
    pub ssl: bool,
    pub bind_address: String,
    pub bind_port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_proxy_proto: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxy_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_gateway: Option<HttpGateway>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_gateway: Option<TcpGateway>,
}

impl GatewaySpec {
    /// Proxies this gateway contributes a listener to.
    pub fn proxy_names(&self) -> Vec<String> {
        if self.proxy_names.is_empty() {
            vec![DEFAULT_PROXY_NAME.to_owned()]
        } else {
            self.proxy_names.clone()
        }
    }

    /// A gateway without an explicit type serves HTTP.
    pub fn kind(&self) -> GatewayKind {
        if self.tcp_gateway.is_some() && self.http_gateway.is_none() {
            GatewayKind::Tcp
        } else {
            GatewayKind::Http
        }
    }
}
