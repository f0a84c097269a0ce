use kube::ResourceExt;

use super::{errors::TranslatorError, listener_name, ListenerFactory};
use crate::{
    apis::{proxy::TcpListener, Gateway, Listener},
    common::{ApiSnapshot, ResourceReports},
};

#[derive(Clone, Debug, Default)]
pub struct TcpListenerFactory;

impl ListenerFactory for TcpListenerFactory {
    fn generate_listener(&self, gateway: &Gateway, _snapshot: &ApiSnapshot, _reports: &mut ResourceReports) -> Result<Listener, TranslatorError> {
        let namespace = gateway.namespace().unwrap_or_default();
        let mut tcp_hosts = gateway.spec.tcp_gateway.as_ref().map(|tcp| tcp.tcp_hosts.clone()).unwrap_or_default();
        let mut ssl_configurations = vec![];
        for host in &mut tcp_hosts {
            if host.destination.upstream.namespace.as_deref().map_or(true, str::is_empty) {
                host.destination.upstream.namespace = Some(namespace.clone());
            }
            if let Some(ssl_config) = &host.ssl_config {
                if !ssl_configurations.contains(ssl_config) {
                    ssl_configurations.push(ssl_config.clone());
                }
            }
        }

        Ok(Listener {
            name: listener_name(gateway),
            bind_address: gateway.spec.bind_address.clone(),
            bind_port: gateway.spec.bind_port,
            use_proxy_proto: gateway.spec.use_proxy_proto,
            ssl_configurations,
            metadata_static: None,
            http_listener: None,
            tcp_listener: Some(TcpListener { tcp_hosts }),
        })
    }
}
