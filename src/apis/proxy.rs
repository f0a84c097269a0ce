use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    meta::{NamespacedStatuses, SourceMetadata, SslConfig},
    gateway::TcpHost,
    matchers::Matcher,
    routes::{DirectResponseAction, RedirectAction, RouteAction, RouteOptions},
};

/// Resolved route action. Delegation never survives translation, so there is no delegate variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ProxyAction {
    RouteAction(RouteAction),
    RedirectAction(RedirectAction),
    DirectResponseAction(DirectResponseAction),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRoute {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,
    #[serde(flatten)]
    pub action: Option<ProxyAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RouteOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_static: Option<SourceMetadata>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyVirtualHost {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<ProxyRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_static: Option<SourceMetadata>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpListener {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_hosts: Vec<ProxyVirtualHost>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TcpListener {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_hosts: Vec<TcpHost>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    pub bind_address: String,
    pub bind_port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_proxy_proto: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssl_configurations: Vec<SslConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_static: Option<SourceMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_listener: Option<HttpListener>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_listener: Option<TcpListener>,
}

impl Listener {
    pub fn virtual_hosts(&self) -> &[ProxyVirtualHost] {
        self.http_listener.as_ref().map_or(&[], |http| &http.virtual_hosts)
    }
}

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gloo.solo.io",
    version = "v1",
    kind = "Proxy",
    plural = "proxies",
    shortname = "px",
    status = "NamespacedStatuses",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<Listener>,
}
