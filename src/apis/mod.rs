pub mod meta;
pub mod gateway;
pub mod matchers;
pub mod proxy;
pub mod route_table;
pub mod routes;
pub mod virtual_service;

pub use meta::{NamespacedStatuses, ResourceRef, SourceMetadata, SourceRef, SslConfig, State, Status, StatusHolder};
pub use gateway::{Gateway, GatewayKind, GatewaySpec};
pub use proxy::{Listener, Proxy, ProxySpec};
pub use route_table::{RouteTable, RouteTableSpec};
pub use virtual_service::{VirtualService, VirtualServiceSpec};

macro_rules! impl_status_holder {
    ($($resource:ty),*) => {
        $(
            impl StatusHolder for $resource {
                fn statuses(&self) -> Option<&NamespacedStatuses> {
                    self.status.as_ref()
                }

                fn statuses_mut(&mut self) -> &mut Option<NamespacedStatuses> {
                    &mut self.status
                }
            }
        )*
    };
}

impl_status_holder!(Gateway, VirtualService, RouteTable, Proxy);
