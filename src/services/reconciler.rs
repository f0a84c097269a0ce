use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::{
    apis::{Listener, NamespacedStatuses, Proxy, SourceMetadata, State, Status, StatusHolder},
    common::{GeneratedProxies, Keyed, ResourceKey, ResourceReports},
    store::{has_labels, ResourceClient, StoreError, WriteOptions},
    translator::{compress_proxy, decompress_proxy, is_compressed, CompressionError},
};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("store error {0}")]
    Store(#[from] StoreError),
    #[error("compression error {0}")]
    Compression(#[from] CompressionError),
}

pub fn listener_status_key(listener: &Listener) -> String {
    format!("listener:{}", listener.name)
}

/// Makes the stored proxies match the generated ones.
#[derive(TypedBuilder)]
pub struct ProxyReconciler {
    proxy_client: Arc<dyn ResourceClient<Proxy>>,
    #[builder(setter(into))]
    write_namespace: String,
    #[builder(default)]
    proxy_labels: BTreeMap<String, String>,
    #[builder(default)]
    compress: bool,
}

impl ProxyReconciler {
    pub async fn reconcile(&self, generated: &GeneratedProxies) -> Result<(), ReconcileError> {
        let mut desired_names = BTreeSet::new();
        for generated_proxy in generated.values() {
            let mut proxy = strip_invalid(&generated_proxy.proxy, &generated_proxy.reports);
            proxy.metadata.namespace = Some(self.write_namespace.clone());
            proxy.labels_mut().extend(self.proxy_labels.clone());
            desired_names.insert(proxy.name_any());
            self.upsert(proxy).await?;
        }

        if self.proxy_labels.is_empty() {
            warn!("No proxy labels configured, stale proxies in {} are left alone", self.write_namespace);
            return Ok(());
        }
        for stale in self.proxy_client.list(Some(&self.write_namespace), &self.proxy_labels).await? {
            let name = stale.name_any();
            if desired_names.contains(&name) {
                continue;
            }
            info!("Deleting proxy {} which is no longer generated", stale.resource_key());
            match self.proxy_client.delete(&self.write_namespace, &name).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {},
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn upsert(&self, mut desired: Proxy) -> Result<(), ReconcileError> {
        let key = desired.resource_key();
        if let Some(mut existing) = self.proxy_client.read(&key.namespace, &key.name).await? {
            let was_compressed = is_compressed(&existing);
            decompress_proxy(&mut existing)?;
            if existing.spec == desired.spec && was_compressed == self.compress && has_labels(existing.labels(), desired.labels()) {
                debug!("Proxy {key} is up to date");
                return Ok(());
            }
            desired.status = carry_over_status(&existing, &desired);
            desired.metadata.resource_version = existing.resource_version();
        }

        if self.compress {
            compress_proxy(&mut desired)?;
        }
        info!("Writing proxy {key} listeners {}", desired.spec.listeners.len());
        let status = desired.status.clone();
        let mut written = self.proxy_client.write(desired, WriteOptions::overwrite()).await?;

        // Stores with a status subresource ignore the status on a spec write.
        if status.is_some() && written.statuses() != status.as_ref() {
            debug!("Writing status of proxy {key}");
            *written.statuses_mut() = status;
            self.proxy_client.write_status(&written).await?;
        }
        Ok(())
    }
}

/// Copy of the proxy without the listeners of gateways with errors and without the virtual hosts of
/// virtual services with errors.
pub fn strip_invalid(proxy: &Proxy, reports: &ResourceReports) -> Proxy {
    let mut proxy = proxy.clone();
    proxy.spec.listeners.retain(|listener| !has_failed_source(listener.metadata_static.as_ref(), reports));
    for http in proxy.spec.listeners.iter_mut().filter_map(|listener| listener.http_listener.as_mut()) {
        http.virtual_hosts.retain(|virtual_host| !has_failed_source(virtual_host.metadata_static.as_ref(), reports));
    }
    proxy
}

fn has_failed_source(metadata: Option<&SourceMetadata>, reports: &ResourceReports) -> bool {
    metadata.is_some_and(|metadata| metadata.sources.iter().filter_map(ResourceKey::from_source).any(|key| reports.has_errors(&key)))
}

// Statuses survive a write. Listeners which really changed go back to pending so that the
// status syncer does not report a stale acceptance.
fn carry_over_status(existing: &Proxy, desired: &Proxy) -> Option<NamespacedStatuses> {
    let mut statuses = existing.status.clone()?;

    let changed: Vec<&Listener> = desired
        .spec
        .listeners
        .iter()
        .filter(|listener| {
            let listener = without_generations(listener);
            !existing.spec.listeners.iter().any(|original| without_generations(original) == listener)
        })
        .collect();
    let removed: Vec<&Listener> =
        existing.spec.listeners.iter().filter(|original| !desired.spec.listeners.iter().any(|listener| listener.name == original.name)).collect();

    if changed.is_empty() && removed.is_empty() {
        return Some(statuses);
    }

    for status in statuses.statuses.values_mut() {
        status.state = State::Pending;
        status.reason.clear();
        for listener in &changed {
            status.subresource_statuses.insert(listener_status_key(listener), Status::pending(&status.reported_by));
        }
        for listener in &removed {
            status.subresource_statuses.remove(&listener_status_key(listener));
        }
    }
    Some(statuses)
}

fn without_generations(listener: &Listener) -> Listener {
    fn clear(metadata: &mut Option<SourceMetadata>) {
        for source in metadata.iter_mut().flat_map(|metadata| metadata.sources.iter_mut()) {
            source.observed_generation = 0;
        }
    }

    let mut listener = listener.clone();
    clear(&mut listener.metadata_static);
    for virtual_host in listener.http_listener.iter_mut().flat_map(|http| http.virtual_hosts.iter_mut()) {
        clear(&mut virtual_host.metadata_static);
        for route in &mut virtual_host.routes {
            clear(&mut route.metadata_static);
        }
    }
    listener
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    use super::*;
    use crate::{
        apis::{
            proxy::{HttpListener, ProxyVirtualHost},
            ProxySpec,
        },
        common::{create_id, GeneratedProxy, ValidationError},
        store::InMemoryResourceClient,
        translator::COMPRESSED_SPEC_ANNOTATION,
    };

    const WRITE_NAMESPACE: &str = "gloo-system";

    fn listener(gateway: &str, port: u32, virtual_services: &[&str], generation: i64) -> Listener {
        let virtual_hosts = virtual_services
            .iter()
            .map(|vs| ProxyVirtualHost {
                name: create_id(vs, "default"),
                domains: vec![format!("{vs}.example.com")],
                routes: vec![],
                metadata_static: Some(SourceMetadata { sources: vec![ResourceKey::virtual_service(vs, "default").source_ref(generation)] }),
            })
            .collect();
        Listener {
            name: format!("listener-::-{port}"),
            bind_address: "::".to_owned(),
            bind_port: port,
            metadata_static: Some(SourceMetadata { sources: vec![ResourceKey::gateway(gateway, WRITE_NAMESPACE).source_ref(generation)] }),
            http_listener: Some(HttpListener { virtual_hosts }),
            ..Default::default()
        }
    }

    fn generated(name: &str, listeners: Vec<Listener>, reports: ResourceReports) -> GeneratedProxies {
        let mut proxy = Proxy::new(name, ProxySpec { listeners });
        proxy.metadata.namespace = Some(WRITE_NAMESPACE.to_owned());
        GeneratedProxies::from([(ResourceKey::proxy(name, WRITE_NAMESPACE), GeneratedProxy { proxy, reports })])
    }

    fn proxy_labels() -> BTreeMap<String, String> {
        BTreeMap::from([("created_by".to_owned(), "gloo-gateway-translator".to_owned())])
    }

    fn reconciler(client: &Arc<InMemoryResourceClient<Proxy>>, compress: bool) -> ProxyReconciler {
        ProxyReconciler::builder()
            .proxy_client(Arc::clone(client) as Arc<dyn ResourceClient<Proxy>>)
            .write_namespace(WRITE_NAMESPACE)
            .proxy_labels(proxy_labels())
            .compress(compress)
            .build()
    }

    /// Keeps the stored status on spec writes, like a store with a status subresource.
    struct StatusSubresourceClient {
        inner: InMemoryResourceClient<Proxy>,
    }

    #[async_trait]
    impl ResourceClient<Proxy> for StatusSubresourceClient {
        async fn read(&self, namespace: &str, name: &str) -> Result<Option<Proxy>, StoreError> {
            self.inner.read(namespace, name).await
        }

        async fn write(&self, mut resource: Proxy, options: WriteOptions) -> Result<Proxy, StoreError> {
            let stored = self.inner.read(&resource.namespace().unwrap_or_default(), &resource.name_any()).await?;
            resource.status = stored.and_then(|stored| stored.status);
            self.inner.write(resource, options).await
        }

        async fn write_status(&self, resource: &Proxy) -> Result<Proxy, StoreError> {
            self.inner.write_status(resource).await
        }

        async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
            self.inner.delete(namespace, name).await
        }

        async fn list(&self, namespace: Option<&str>, labels: &BTreeMap<String, String>) -> Result<Vec<Proxy>, StoreError> {
            self.inner.list(namespace, labels).await
        }

        fn watch(&self, namespace: Option<&str>) -> BoxStream<'static, Result<Vec<Proxy>, StoreError>> {
            self.inner.watch(namespace)
        }
    }

    async fn stored(client: &InMemoryResourceClient<Proxy>, name: &str) -> Proxy {
        client.read(WRITE_NAMESPACE, name).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_listeners_of_failed_gateways_are_dropped() {
        let client = Arc::new(InMemoryResourceClient::<Proxy>::new());
        let mut reports = ResourceReports::default();
        reports.accept([&ResourceKey::gateway("a", WRITE_NAMESPACE), &ResourceKey::gateway("c", WRITE_NAMESPACE)]);
        reports.add_error(
            &ResourceKey::gateway("b", WRITE_NAMESPACE),
            ValidationError::NonUniqueBindAddress { address: ":::8081".to_owned(), gateways: "gloo-system.b".to_owned() },
        );
        let desired = generated("gateway-proxy", vec![listener("a", 8080, &[], 1), listener("b", 8081, &[], 1), listener("c", 8082, &[], 1)], reports);

        reconciler(&client, false).reconcile(&desired).await.unwrap();

        let proxy = stored(&client, "gateway-proxy").await;
        assert_eq!(proxy.spec.listeners.iter().map(|l| l.bind_port).collect::<Vec<_>>(), vec![8080, 8082]);
        assert_eq!(proxy.labels().get("created_by").map(String::as_str), Some("gloo-gateway-translator"));
    }

    #[tokio::test]
    async fn test_virtual_hosts_of_failed_virtual_services_are_dropped() {
        let client = Arc::new(InMemoryResourceClient::<Proxy>::new());
        let mut reports = ResourceReports::default();
        reports.add_error(&ResourceKey::virtual_service("bad", "default"), ValidationError::NoAction);
        let desired = generated("gateway-proxy", vec![listener("a", 8080, &["good", "bad"], 1)], reports);

        reconciler(&client, false).reconcile(&desired).await.unwrap();

        let proxy = stored(&client, "gateway-proxy").await;
        assert_eq!(proxy.spec.listeners.len(), 1);
        assert_eq!(proxy.spec.listeners[0].virtual_hosts().iter().map(|vh| vh.name.as_str()).collect::<Vec<_>>(), vec!["default.good"]);
    }

    #[tokio::test]
    async fn test_generation_bumps_keep_the_status() {
        let client = Arc::new(InMemoryResourceClient::<Proxy>::new());
        let reconciler = reconciler(&client, false);
        reconciler.reconcile(&generated("gateway-proxy", vec![listener("a", 8080, &["vs"], 0)], ResourceReports::default())).await.unwrap();

        let mut proxy = stored(&client, "gateway-proxy").await;
        proxy.set_status_for(WRITE_NAMESPACE, Status::accepted("gloo"));
        client.write_status(&proxy).await.unwrap();
        let version = stored(&client, "gateway-proxy").await.resource_version();

        reconciler.reconcile(&generated("gateway-proxy", vec![listener("a", 8080, &["vs"], 0)], ResourceReports::default())).await.unwrap();
        assert_eq!(stored(&client, "gateway-proxy").await.resource_version(), version);

        reconciler.reconcile(&generated("gateway-proxy", vec![listener("a", 8080, &["vs"], 100)], ResourceReports::default())).await.unwrap();
        let proxy = stored(&client, "gateway-proxy").await;
        assert_ne!(proxy.resource_version(), version);
        assert_eq!(proxy.spec.listeners[0].metadata_static.as_ref().unwrap().sources[0].observed_generation, 100);
        assert_eq!(proxy.status_for(WRITE_NAMESPACE), Some(&Status::accepted("gloo")));
    }

    #[tokio::test]
    async fn test_changed_listeners_go_back_to_pending() {
        let client = Arc::new(InMemoryResourceClient::<Proxy>::new());
        let reconciler = reconciler(&client, false);
        reconciler.reconcile(&generated("gateway-proxy", vec![listener("a", 8080, &["vs"], 1)], ResourceReports::default())).await.unwrap();

        let mut proxy = stored(&client, "gateway-proxy").await;
        proxy.set_status_for(WRITE_NAMESPACE, Status::accepted("gloo"));
        client.write_status(&proxy).await.unwrap();

        reconciler
            .reconcile(&generated("gateway-proxy", vec![listener("a", 8080, &["vs", "other"], 1)], ResourceReports::default()))
            .await
            .unwrap();

        let proxy = stored(&client, "gateway-proxy").await;
        let status = proxy.status_for(WRITE_NAMESPACE).unwrap();
        assert_eq!(status.state, State::Pending);
        assert_eq!(status.subresource_statuses.get("listener:listener-::-8080"), Some(&Status::pending("gloo")));
    }

    #[tokio::test]
    async fn test_pending_status_is_written_when_spec_writes_ignore_it() {
        let client = Arc::new(StatusSubresourceClient { inner: InMemoryResourceClient::new() });
        let reconciler = ProxyReconciler::builder()
            .proxy_client(Arc::clone(&client) as Arc<dyn ResourceClient<Proxy>>)
            .write_namespace(WRITE_NAMESPACE)
            .proxy_labels(proxy_labels())
            .build();
        reconciler.reconcile(&generated("gateway-proxy", vec![listener("a", 8080, &["vs"], 1)], ResourceReports::default())).await.unwrap();

        let mut proxy = stored(&client.inner, "gateway-proxy").await;
        proxy.set_status_for(WRITE_NAMESPACE, Status::accepted("gloo"));
        client.write_status(&proxy).await.unwrap();

        reconciler
            .reconcile(&generated("gateway-proxy", vec![listener("a", 8080, &["vs", "other"], 1)], ResourceReports::default()))
            .await
            .unwrap();

        let proxy = stored(&client.inner, "gateway-proxy").await;
        assert_eq!(proxy.spec.listeners[0].virtual_hosts().len(), 2);
        let status = proxy.status_for(WRITE_NAMESPACE).unwrap();
        assert_eq!(status.state, State::Pending);
        assert_eq!(status.subresource_statuses.get("listener:listener-::-8080"), Some(&Status::pending("gloo")));
    }

    #[tokio::test]
    async fn test_proxies_are_not_deleted_without_proxy_labels() {
        let client = Arc::new(InMemoryResourceClient::<Proxy>::new());
        let mut foreign = Proxy::new("foreign", ProxySpec::default());
        foreign.metadata.namespace = Some(WRITE_NAMESPACE.to_owned());
        client.write(foreign, WriteOptions::default()).await.unwrap();

        let reconciler = ProxyReconciler::builder().proxy_client(Arc::clone(&client) as Arc<dyn ResourceClient<Proxy>>).write_namespace(WRITE_NAMESPACE).build();
        reconciler.reconcile(&generated("gateway-proxy", vec![listener("a", 8080, &[], 1)], ResourceReports::default())).await.unwrap();

        let names: Vec<_> = client.list(Some(WRITE_NAMESPACE), &BTreeMap::new()).await.unwrap().iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, vec!["foreign", "gateway-proxy"]);
    }

    #[tokio::test]
    async fn test_proxies_no_longer_generated_are_deleted() {
        let client = Arc::new(InMemoryResourceClient::<Proxy>::new());
        let reconciler = reconciler(&client, false);
        let mut desired = generated("first", vec![listener("a", 8080, &[], 1)], ResourceReports::default());
        desired.extend(generated("second", vec![listener("b", 8080, &[], 1)], ResourceReports::default()));
        reconciler.reconcile(&desired).await.unwrap();

        let mut unmanaged = Proxy::new("unmanaged", ProxySpec::default());
        unmanaged.metadata.namespace = Some(WRITE_NAMESPACE.to_owned());
        client.write(unmanaged, WriteOptions::default()).await.unwrap();

        reconciler.reconcile(&generated("second", vec![listener("b", 8080, &[], 1)], ResourceReports::default())).await.unwrap();

        let names: Vec<_> = client.list(Some(WRITE_NAMESPACE), &BTreeMap::new()).await.unwrap().iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, vec!["second", "unmanaged"]);
    }

    #[tokio::test]
    async fn test_compressed_proxies() {
        let client = Arc::new(InMemoryResourceClient::<Proxy>::new());
        let reconciler = reconciler(&client, true);
        let desired = generated("gateway-proxy", vec![listener("a", 8080, &["vs"], 1)], ResourceReports::default());
        reconciler.reconcile(&desired).await.unwrap();

        let proxy = stored(&client, "gateway-proxy").await;
        assert!(proxy.spec.listeners.is_empty());
        assert!(proxy.annotations().contains_key(COMPRESSED_SPEC_ANNOTATION));
        let version = proxy.resource_version();

        reconciler.reconcile(&desired).await.unwrap();
        let mut proxy = stored(&client, "gateway-proxy").await;
        assert_eq!(proxy.resource_version(), version);
        decompress_proxy(&mut proxy).unwrap();
        assert_eq!(proxy.spec.listeners, desired.values().next().unwrap().proxy.spec.listeners);
    }
}
