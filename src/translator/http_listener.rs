use std::collections::BTreeMap;

use itertools::Itertools;
use kube::ResourceExt;
use tracing::{debug, error};

use super::{errors::TranslatorError, listener_name, route_converter::RouteConverter, ListenerFactory};
use crate::{
    apis::{
        gateway::HttpGateway,
        proxy::{HttpListener, ProxyVirtualHost},
        routes::ALL_NAMESPACES,
        Gateway, Listener, SourceMetadata, VirtualService,
    },
    common::{create_id, ApiSnapshot, Keyed, ResourceKey, ResourceReports, ValidationError},
};

/// Builds an HTTP listener out of the virtual services a gateway selects.
#[derive(Clone, Debug, Default)]
pub struct HttpListenerFactory;

impl ListenerFactory for HttpListenerFactory {
    fn generate_listener(&self, gateway: &Gateway, snapshot: &ApiSnapshot, reports: &mut ResourceReports) -> Result<Listener, TranslatorError> {
        let gateway_key = gateway.resource_key();
        let http_gateway = gateway.spec.http_gateway.clone().unwrap_or_default();
        let virtual_services = select_virtual_services(gateway, &http_gateway, snapshot, reports);
        debug!("Gateway {gateway_key} selected virtual services {:?}", virtual_services.iter().map(|vs| vs.resource_key().to_string()).collect::<Vec<_>>());

        validate_domains(&gateway_key, &virtual_services, reports);
        if gateway.spec.ssl {
            validate_default_ssl_config(&gateway_key, &virtual_services, reports);
        }

        let converter = RouteConverter::new(snapshot);
        let mut virtual_hosts = vec![];
        let mut ssl_configurations = vec![];
        for virtual_service in virtual_services {
            let virtual_service_key = virtual_service.resource_key();
            let Some(virtual_host) = &virtual_service.spec.virtual_host else {
                reports.add_warning(&virtual_service_key, format!("virtual service {virtual_service_key} has no virtual host"));
                continue;
            };

            let routes = match converter.convert_virtual_service(virtual_service, reports) {
                Ok(routes) => routes,
                Err(e) => {
                    error!("Unable to convert routes of virtual service {virtual_service_key} {e}");
                    reports.add_error(&virtual_service_key, ValidationError::Internal(e.to_string()));
                    continue;
                },
            };

            if let Some(ssl_config) = &virtual_service.spec.ssl_config {
                if !ssl_configurations.contains(ssl_config) {
                    ssl_configurations.push(ssl_config.clone());
                }
            }

            virtual_hosts.push(ProxyVirtualHost {
                name: create_id(&virtual_service.name_any(), &virtual_service.namespace().unwrap_or_default()),
                domains: virtual_host.domains.clone(),
                routes,
                metadata_static: Some(SourceMetadata { sources: vec![virtual_service.source_ref()] }),
            });
        }

        Ok(Listener {
            name: listener_name(gateway),
            bind_address: gateway.spec.bind_address.clone(),
            bind_port: gateway.spec.bind_port,
            use_proxy_proto: gateway.spec.use_proxy_proto,
            ssl_configurations,
            metadata_static: None,
            http_listener: Some(HttpListener { virtual_hosts }),
            tcp_listener: None,
        })
    }
}

fn in_namespaces(virtual_service: &VirtualService, namespaces: &[String]) -> bool {
    namespaces.is_empty() || namespaces.iter().any(|ns| ns == ALL_NAMESPACES || virtual_service.namespace().as_deref() == Some(ns.as_str()))
}

/// Explicit references win over a label selector; with neither every virtual service in the allowed
/// namespaces is selected. Only virtual services whose ssl setting matches the gateway are kept.
fn select_virtual_services<'a>(gateway: &Gateway, http_gateway: &HttpGateway, snapshot: &'a ApiSnapshot, reports: &mut ResourceReports) -> Vec<&'a VirtualService> {
    let gateway_namespace = gateway.namespace().unwrap_or_default();
    let selected: Vec<&VirtualService> = if !http_gateway.virtual_services.is_empty() {
        http_gateway
            .virtual_services
            .iter()
            .filter_map(|reference| {
                let namespace = reference.namespace_or(&gateway_namespace);
                let found = snapshot.virtual_service(&reference.name, namespace);
                if found.is_none() {
                    reports.add_warning(&gateway.resource_key(), format!("virtual service {} missing", create_id(&reference.name, namespace)));
                }
                found
            })
            .collect()
    } else if let Some(selector) = &http_gateway.virtual_service_selector {
        snapshot
            .virtual_services
            .iter()
            .filter(|vs| in_namespaces(vs, &http_gateway.virtual_service_namespaces))
            .filter(|vs| {
                let labels = vs.labels();
                selector.labels.iter().all(|(key, value)| labels.get(key) == Some(value))
            })
            .collect()
    } else {
        snapshot.virtual_services.iter().filter(|vs| in_namespaces(vs, &http_gateway.virtual_service_namespaces)).collect()
    };

    selected.into_iter().filter(|vs| vs.spec.ssl_config.is_some() == gateway.spec.ssl).collect()
}

fn validate_domains(gateway_key: &ResourceKey, virtual_services: &[&VirtualService], reports: &mut ResourceReports) {
    let mut by_domain: BTreeMap<String, Vec<ResourceKey>> = BTreeMap::new();
    for virtual_service in virtual_services {
        let Some(virtual_host) = &virtual_service.spec.virtual_host else {
            continue;
        };
        let key = virtual_service.resource_key();
        if virtual_host.domains.is_empty() {
            by_domain.entry(String::new()).or_default().push(key);
        } else {
            for domain in virtual_host.domains.iter().unique() {
                by_domain.entry(domain.clone()).or_default().push(key.clone());
            }
        }
    }

    let mut conflicting_domains = vec![];
    for (domain, keys) in by_domain.iter().filter(|(_, keys)| keys.len() > 1) {
        conflicting_domains.push(if domain.is_empty() { "*".to_owned() } else { domain.clone() });
        for key in keys {
            let others = format!("[{}]", keys.iter().filter(|other| *other != key).join(", "));
            let error = if domain.is_empty() {
                ValidationError::WildcardDomainConflict { virtual_services: others }
            } else {
                ValidationError::DomainConflict { domain: domain.clone(), virtual_services: others }
            };
            reports.add_error(key, error);
        }
    }

    if !conflicting_domains.is_empty() {
        reports.add_error(gateway_key, ValidationError::GatewayDomainConflict(format!("[{}]", conflicting_domains.join(", "))));
    }
}

/// An ssl gateway can serve only one virtual service without sni domains, the default filter chain.
fn validate_default_ssl_config(gateway_key: &ResourceKey, virtual_services: &[&VirtualService], reports: &mut ResourceReports) {
    let without_sni: Vec<_> = virtual_services
        .iter()
        .filter(|vs| vs.spec.ssl_config.as_ref().is_some_and(|ssl| ssl.sni_domains.is_empty()))
        .map(|vs| vs.resource_key())
        .collect();
    if without_sni.len() < 2 {
        return;
    }

    for key in &without_sni {
        let others = format!("[{}]", without_sni.iter().filter(|other| *other != key).join(", "));
        reports.add_error(key, ValidationError::SslDefaultConflict(others));
    }
    reports.add_error(gateway_key, ValidationError::GatewaySslDefaultConflict(format!("[{}]", without_sni.iter().join(", "))));
}
