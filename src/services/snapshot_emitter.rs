use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::{
    apis::{Gateway, RouteTable, VirtualService},
    common::ApiSnapshot,
    store::ResourceClient,
};

/// Watches gateways, virtual services and route tables and emits a snapshot whenever any of them
/// changes, once all three have been listed.
#[derive(TypedBuilder)]
pub struct SnapshotEmitter {
    gateway_client: Arc<dyn ResourceClient<Gateway>>,
    virtual_service_client: Arc<dyn ResourceClient<VirtualService>>,
    route_table_client: Arc<dyn ResourceClient<RouteTable>>,
    #[builder(default)]
    watch_namespace: Option<String>,
    snapshot_sender: mpsc::Sender<ApiSnapshot>,
    cancellation_token: CancellationToken,
}

impl SnapshotEmitter {
    pub async fn start(self) -> crate::Result<()> {
        let namespace = self.watch_namespace.as_deref();
        let mut gateway_stream = self.gateway_client.watch(namespace);
        let mut virtual_service_stream = self.virtual_service_client.watch(namespace);
        let mut route_table_stream = self.route_table_client.watch(namespace);

        let mut gateways: Option<Vec<Gateway>> = None;
        let mut virtual_services: Option<Vec<VirtualService>> = None;
        let mut route_tables: Option<Vec<RouteTable>> = None;
        let mut last_emitted: Option<ApiSnapshot> = None;

        loop {
            tokio::select! {
                () = self.cancellation_token.cancelled() => {
                    info!("Snapshot emitter cancelled");
                    return crate::Result::<()>::Ok(());
                }
                Some(listing) = gateway_stream.next() => match listing {
                    Ok(listing) => gateways = Some(listing),
                    Err(e) => warn!("Gateway watch failed {e}"),
                },
                Some(listing) = virtual_service_stream.next() => match listing {
                    Ok(listing) => virtual_services = Some(listing),
                    Err(e) => warn!("Virtual service watch failed {e}"),
                },
                Some(listing) = route_table_stream.next() => match listing {
                    Ok(listing) => route_tables = Some(listing),
                    Err(e) => warn!("Route table watch failed {e}"),
                },
                else => {
                    warn!("All snapshot watches are closed...exiting");
                    return crate::Result::<()>::Ok(());
                }
            }

            let (Some(gateways), Some(virtual_services), Some(route_tables)) = (&gateways, &virtual_services, &route_tables) else {
                continue;
            };
            let snapshot = ApiSnapshot::builder()
                .gateways(gateways.clone())
                .virtual_services(virtual_services.clone())
                .route_tables(route_tables.clone())
                .build()
                .sorted();
            if last_emitted.as_ref() == Some(&snapshot) {
                continue;
            }
            debug!(
                "Emitting snapshot gateways {} virtual services {} route tables {}",
                snapshot.gateways.len(),
                snapshot.virtual_services.len(),
                snapshot.route_tables.len()
            );
            if self.snapshot_sender.send(snapshot.clone()).await.is_err() {
                warn!("Snapshot receiver is gone...exiting");
                return crate::Result::<()>::Ok(());
            }
            last_emitted = Some(snapshot);
        }
    }
}
