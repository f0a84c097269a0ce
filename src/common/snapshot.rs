use kube::ResourceExt;
use typed_builder::TypedBuilder;

use crate::apis::{Gateway, RouteTable, VirtualService};

/// Point-in-time view of the routing configuration, shared read-only by one translation pass.
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
pub struct ApiSnapshot {
    #[builder(default)]
    pub gateways: Vec<Gateway>,
    #[builder(default)]
    pub virtual_services: Vec<VirtualService>,
    #[builder(default)]
    pub route_tables: Vec<RouteTable>,
}

impl ApiSnapshot {
    /// Orders every list by namespace then name so translations do not depend on watch order.
    pub fn sorted(mut self) -> Self {
        self.gateways.sort_by_cached_key(|r| (r.namespace(), r.name_any()));
        self.virtual_services.sort_by_cached_key(|r| (r.namespace(), r.name_any()));
        self.route_tables.sort_by_cached_key(|r| (r.namespace(), r.name_any()));
        self
    }

    pub fn route_table(&self, name: &str, namespace: &str) -> Option<&RouteTable> {
        self.route_tables.iter().find(|rt| rt.name_any() == name && rt.namespace().as_deref() == Some(namespace))
    }

    pub fn virtual_service(&self, name: &str, namespace: &str) -> Option<&VirtualService> {
        self.virtual_services.iter().find(|vs| vs.name_any() == name && vs.namespace().as_deref() == Some(namespace))
    }
}
