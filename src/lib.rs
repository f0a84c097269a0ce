use std::sync::Arc;

use futures::FutureExt;
use kube::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod apis;
pub mod common;
pub mod configuration;
pub mod services;
pub mod store;
pub mod translator;

pub use configuration::Configuration;

use crate::{
    apis::{Gateway, Proxy, RouteTable, VirtualService},
    services::{ProxyReconciler, SnapshotEmitter, StatusReporter, StatusSyncer, StatusSyncerService, TranslatorService},
    store::{KubeResourceClient, ResourceClient},
    translator::ProxyTranslator,
};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

pub async fn start(configuration: Configuration) -> Result<()> {
    info!("Gateway reconciler started");
    let client = Client::try_default().await?;
    let field_manager = configuration.controller_name.clone();

    let gateway_client: Arc<dyn ResourceClient<Gateway>> = Arc::new(KubeResourceClient::<Gateway>::new(client.clone(), &field_manager));
    let virtual_service_client: Arc<dyn ResourceClient<VirtualService>> = Arc::new(KubeResourceClient::<VirtualService>::new(client.clone(), &field_manager));
    let route_table_client: Arc<dyn ResourceClient<RouteTable>> = Arc::new(KubeResourceClient::<RouteTable>::new(client.clone(), &field_manager));
    let proxy_client: Arc<dyn ResourceClient<Proxy>> = Arc::new(KubeResourceClient::<Proxy>::new(client, &field_manager));

    let (snapshot_sender, snapshot_receiver) = mpsc::channel(1024);
    let (generated_proxies_sender, generated_proxies_receiver) = mpsc::channel(1024);
    let cancellation_token = CancellationToken::new();

    let snapshot_emitter = SnapshotEmitter::builder()
        .gateway_client(Arc::clone(&gateway_client))
        .virtual_service_client(Arc::clone(&virtual_service_client))
        .route_table_client(Arc::clone(&route_table_client))
        .watch_namespace(configuration.watch_namespace.clone())
        .snapshot_sender(snapshot_sender)
        .cancellation_token(cancellation_token.clone())
        .build();

    let translator = ProxyTranslator::builder()
        .write_namespace(configuration.write_namespace.clone())
        .read_gateways_from_all_namespaces(configuration.read_gateways_from_all_namespaces)
        .build();

    let reconciler = ProxyReconciler::builder()
        .proxy_client(Arc::clone(&proxy_client))
        .write_namespace(configuration.write_namespace.clone())
        .proxy_labels(configuration.proxy_labels.clone())
        .compress(configuration.compressed_proxy_spec)
        .build();

    let translator_service = TranslatorService::builder()
        .translator(translator)
        .reconciler(reconciler)
        .snapshot_receiver(snapshot_receiver)
        .generated_proxies_sender(generated_proxies_sender)
        .cancellation_token(cancellation_token.clone())
        .build();

    let reporter = StatusReporter::builder()
        .reported_by(configuration.controller_name.clone())
        .status_namespace(configuration.write_namespace.clone())
        .gateway_client(gateway_client)
        .virtual_service_client(virtual_service_client)
        .route_table_client(route_table_client)
        .build();

    let status_syncer_service = StatusSyncerService::builder()
        .syncer(StatusSyncer::builder().reporter(Arc::new(reporter)).status_namespace(configuration.write_namespace.clone()).build())
        .generated_proxies_receiver(generated_proxies_receiver)
        .proxy_client(proxy_client)
        .write_namespace(configuration.write_namespace.clone())
        .retry_interval(configuration.status_retry_interval())
        .cancellation_token(cancellation_token.clone())
        .build();

    let shutdown = async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down");
                cancellation_token.cancel();
            },
            Err(e) => warn!("Unable to listen for shutdown signal {e}"),
        }
        Result::<()>::Ok(())
    };

    let results = futures::future::join_all(vec![
        snapshot_emitter.start().boxed(),
        translator_service.start().boxed(),
        status_syncer_service.start().boxed(),
        shutdown.boxed(),
    ])
    .await;
    for result in results {
        if let Err(e) = result {
            warn!("Service finished with error {e}");
        }
    }
    Ok(())
}
