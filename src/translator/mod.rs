mod compress;
mod errors;
mod http_listener;
mod matchers;
mod options;
mod route_converter;
mod route_table_selector;
mod tcp_listener;

use std::collections::BTreeMap;

pub use compress::{compress_proxy, decompress_proxy, is_compressed, CompressionError, COMPRESSED_SPEC_ANNOTATION};
pub use errors::TranslatorError;
pub use http_listener::HttpListenerFactory;
use itertools::Itertools;
use kube::{api::ObjectMeta, ResourceExt};
pub use matchers::sort_routes_by_path;
pub use options::merge_route_options;
pub use route_converter::{RouteConverter, RoutingResource};
pub use route_table_selector::{index_by_weight, select_route_tables, SelectionWarning};
pub use tcp_listener::TcpListenerFactory;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::{
    apis::{Gateway, GatewayKind, Listener, Proxy, ProxySpec},
    common::{ApiSnapshot, GeneratedProxies, GeneratedProxy, Keyed, ResourceKey, ResourceReports, ValidationError},
};

/// Produces the listener a gateway contributes to its proxies.
pub trait ListenerFactory: Send + Sync {
    fn generate_listener(&self, gateway: &Gateway, snapshot: &ApiSnapshot, reports: &mut ResourceReports) -> Result<Listener, TranslatorError>;
}

pub fn listener_name(gateway: &Gateway) -> String {
    format!("listener-{}-{}", gateway.spec.bind_address, gateway.spec.bind_port)
}

fn default_listener_factories() -> BTreeMap<GatewayKind, Box<dyn ListenerFactory>> {
    let mut factories: BTreeMap<GatewayKind, Box<dyn ListenerFactory>> = BTreeMap::new();
    factories.insert(GatewayKind::Http, Box::new(HttpListenerFactory));
    factories.insert(GatewayKind::Tcp, Box::new(TcpListenerFactory));
    factories
}

#[derive(TypedBuilder)]
pub struct ProxyTranslator {
    #[builder(setter(into))]
    write_namespace: String,
    #[builder(default)]
    read_gateways_from_all_namespaces: bool,
    #[builder(default = default_listener_factories())]
    listener_factories: BTreeMap<GatewayKind, Box<dyn ListenerFactory>>,
}

impl ProxyTranslator {
    fn in_scope(&self, gateway: &Gateway) -> bool {
        self.read_gateways_from_all_namespaces || gateway.namespace().as_deref() == Some(self.write_namespace.as_str())
    }

    /// Gateways in scope grouped by the proxy names they declare.
    pub fn gateways_by_proxy_name<'a>(&self, snapshot: &'a ApiSnapshot) -> BTreeMap<String, Vec<&'a Gateway>> {
        let mut by_proxy: BTreeMap<String, Vec<&Gateway>> = BTreeMap::new();
        for gateway in snapshot.gateways.iter().filter(|gateway| self.in_scope(gateway)) {
            for proxy_name in gateway.spec.proxy_names() {
                by_proxy.entry(proxy_name).or_default().push(gateway);
            }
        }
        by_proxy
    }

    /// Builds one proxy with a listener per gateway. Returns no proxy when none of the gateways is in
    /// scope. Every gateway given and every virtual service and route table in the snapshot gets a
    /// report, so resources without problems are accepted.
    pub fn translate(&self, proxy_name: &str, snapshot: &ApiSnapshot, gateways: &[&Gateway]) -> Result<(Option<Proxy>, ResourceReports), TranslatorError> {
        let mut reports = ResourceReports::default();
        let gateway_keys: Vec<_> = gateways.iter().map(|gateway| gateway.resource_key()).collect();
        let virtual_service_keys: Vec<_> = snapshot.virtual_services.iter().map(Keyed::resource_key).collect();
        let route_table_keys: Vec<_> = snapshot.route_tables.iter().map(Keyed::resource_key).collect();
        reports.accept(gateway_keys.iter().chain(&virtual_service_keys).chain(&route_table_keys));

        let gateways: Vec<_> = gateways.iter().copied().filter(|gateway| self.in_scope(gateway)).collect();
        if gateways.is_empty() {
            debug!("No gateways in scope for proxy {proxy_name}");
            return Ok((None, reports));
        }

        validate_bind_addresses(&gateways, &mut reports);

        let mut listeners = vec![];
        for gateway in gateways {
            let kind = gateway.spec.kind();
            let factory = self.listener_factories.get(&kind).ok_or(TranslatorError::MissingListenerFactory(kind))?;
            let mut listener = factory.generate_listener(gateway, snapshot, &mut reports)?;
            listener.metadata_static.get_or_insert_with(Default::default).sources.push(gateway.source_ref());
            listeners.push(listener);
        }

        let proxy = Proxy {
            metadata: ObjectMeta { name: Some(proxy_name.to_owned()), namespace: Some(self.write_namespace.clone()), ..Default::default() },
            spec: ProxySpec { listeners },
            status: None,
        };
        Ok((Some(proxy), reports))
    }

    /// Translates every proxy declared by the gateways in the snapshot.
    pub fn translate_all(&self, snapshot: &ApiSnapshot) -> Result<GeneratedProxies, TranslatorError> {
        let mut generated = GeneratedProxies::new();
        for (proxy_name, gateways) in self.gateways_by_proxy_name(snapshot) {
            let (proxy, reports) = self.translate(&proxy_name, snapshot, &gateways)?;
            if let Some(proxy) = proxy {
                info!("Translated proxy {proxy_name} listeners {}", proxy.spec.listeners.len());
                generated.insert(ResourceKey::proxy(&proxy_name, &self.write_namespace), GeneratedProxy { proxy, reports });
            }
        }
        Ok(generated)
    }
}

fn validate_bind_addresses(gateways: &[&Gateway], reports: &mut ResourceReports) {
    let mut by_address: BTreeMap<String, Vec<ResourceKey>> = BTreeMap::new();
    for gateway in gateways {
        by_address.entry(format!("{}:{}", gateway.spec.bind_address, gateway.spec.bind_port)).or_default().push(gateway.resource_key());
    }

    for (address, keys) in by_address.into_iter().filter(|(_, keys)| keys.len() > 1) {
        let conflicting = keys.iter().join(", ");
        for key in &keys {
            reports.add_error(key, ValidationError::NonUniqueBindAddress { address: address.clone(), gateways: conflicting.clone() });
        }
    }
}
