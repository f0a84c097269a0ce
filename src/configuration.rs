use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::Result;

const DEFAULT_STATUS_RETRY_INTERVAL_SECONDS: u64 = 1;

fn default_proxy_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("created_by".to_owned(), "gloo-gateway-translator".to_owned())])
}

fn default_status_retry_interval_seconds() -> u64 {
    DEFAULT_STATUS_RETRY_INTERVAL_SECONDS
}

#[derive(Debug, TypedBuilder, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[builder(setter(into))]
    pub controller_name: String,
    #[builder(setter(into))]
    pub write_namespace: String,
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub watch_namespace: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub read_gateways_from_all_namespaces: bool,
    #[serde(default)]
    #[builder(default)]
    pub compressed_proxy_spec: bool,
    #[serde(default = "default_proxy_labels")]
    #[builder(default = default_proxy_labels())]
    pub proxy_labels: BTreeMap<String, String>,
    #[serde(default = "default_status_retry_interval_seconds")]
    #[builder(default = DEFAULT_STATUS_RETRY_INTERVAL_SECONDS)]
    pub status_retry_interval_seconds: u64,
    #[serde(default)]
    #[builder(default)]
    pub enable_open_telemetry: Option<bool>,
}

#[derive(Error, Debug)]
enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("write namespace must be not empty")]
    WriteNamespace,
    #[error("status retry interval must be positive")]
    RetryInterval,
    #[error("proxy labels must be not empty, they select the proxies this controller may delete")]
    ProxyLabels,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName.into());
        }
        if self.write_namespace.is_empty() {
            return Err(ConfigurationError::WriteNamespace.into());
        }
        if self.status_retry_interval_seconds == 0 {
            return Err(ConfigurationError::RetryInterval.into());
        }
        if self.proxy_labels.is_empty() {
            return Err(ConfigurationError::ProxyLabels.into());
        }
        Ok(())
    }

    pub fn status_retry_interval(&self) -> Duration {
        Duration::from_secs(self.status_retry_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_configuration_gets_defaults() {
        let configuration: Configuration = serde_yaml::from_str(
            r"
controllerName: gateway
writeNamespace: gloo-system
",
        )
        .unwrap();
        assert!(configuration.validate().is_ok());
        assert_eq!(configuration.watch_namespace, None);
        assert!(!configuration.compressed_proxy_spec);
        assert_eq!(configuration.proxy_labels, default_proxy_labels());
        assert_eq!(configuration.status_retry_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_full_configuration() {
        let configuration: Configuration = serde_yaml::from_str(
            r"
controllerName: gateway
writeNamespace: gloo-system
watchNamespace: apps
readGatewaysFromAllNamespaces: true
compressedProxySpec: true
proxyLabels:
  owner: me
statusRetryIntervalSeconds: 5
enableOpenTelemetry: true
",
        )
        .unwrap();
        assert!(configuration.validate().is_ok());
        assert_eq!(configuration.watch_namespace.as_deref(), Some("apps"));
        assert!(configuration.read_gateways_from_all_namespaces);
        assert_eq!(configuration.proxy_labels, BTreeMap::from([("owner".to_owned(), "me".to_owned())]));
        assert_eq!(configuration.status_retry_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_validation() {
        assert!(Configuration::builder().controller_name("").write_namespace("gloo-system").build().validate().is_err());
        assert!(Configuration::builder().controller_name("gateway").write_namespace("").build().validate().is_err());
        assert!(Configuration::builder()
            .controller_name("gateway")
            .write_namespace("gloo-system")
            .status_retry_interval_seconds(0)
            .build()
            .validate()
            .is_err());
    }

    #[test]
    fn test_empty_proxy_labels_are_rejected() {
        let configuration: Configuration = serde_yaml::from_str(
            r"
controllerName: gateway
writeNamespace: gloo-system
proxyLabels: {}
",
        )
        .unwrap();
        let error = configuration.validate().unwrap_err();
        assert!(error.to_string().starts_with("proxy labels must be not empty"));
        assert!(Configuration::builder().controller_name("gateway").write_namespace("gloo-system").proxy_labels(BTreeMap::new()).build().validate().is_err());
    }
}
