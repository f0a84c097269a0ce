use std::{collections::BTreeMap, marker::PhantomData};

use async_trait::async_trait;
use futures::{future, stream::BoxStream, StreamExt};
use itertools::Itertools;
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    runtime::{reflector, watcher},
    Api, Client, ResourceExt,
};
use serde_json::json;
use tracing::debug;

use super::{ResourceClient, StoreError, StoreResource, WriteOptions};
use crate::common::create_id;

/// Store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeResourceClient<R> {
    client: Client,
    field_manager: String,
    _resource: PhantomData<R>,
}

impl<R: StoreResource> KubeResourceClient<R> {
    pub fn new(client: Client, field_manager: &str) -> Self {
        Self { client, field_manager: field_manager.to_owned(), _resource: PhantomData }
    }

    fn api(&self, namespace: Option<&str>) -> Api<R> {
        match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

fn map_error(error: kube::Error, id: String) -> StoreError {
    match error {
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict(id),
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound(id),
        error => StoreError::Kube(error),
    }
}

#[async_trait]
impl<R: StoreResource> ResourceClient<R> for KubeResourceClient<R> {
    async fn read(&self, namespace: &str, name: &str) -> Result<Option<R>, StoreError> {
        Ok(self.api(Some(namespace)).get_opt(name).await?)
    }

    async fn write(&self, mut resource: R, options: WriteOptions) -> Result<R, StoreError> {
        let name = resource.name_any();
        let namespace = resource.namespace().unwrap_or_default();
        let id = create_id(&name, &namespace);
        let api = self.api(Some(&namespace));
        let params = PostParams { dry_run: false, field_manager: Some(self.field_manager.clone()) };

        match api.get_opt(&name).await? {
            None => api.create(&params, &resource).await.map_err(|e| map_error(e, id)),
            Some(_) if !options.overwrite_existing => Err(StoreError::AlreadyExists(id)),
            Some(existing) => {
                if resource.resource_version().is_none() {
                    resource.meta_mut().resource_version = existing.resource_version();
                }
                debug!("Replacing {id}");
                api.replace(&name, &params, &resource).await.map_err(|e| map_error(e, id))
            },
        }
    }

    async fn write_status(&self, resource: &R) -> Result<R, StoreError> {
        let name = resource.name_any();
        let namespace = resource.namespace().unwrap_or_default();
        let mut patch = json!({ "status": resource.statuses() });
        if let Some(version) = resource.resource_version() {
            patch["metadata"] = json!({ "resourceVersion": version });
        }
        let params = PatchParams::apply(&self.field_manager);
        self.api(Some(&namespace)).patch_status(&name, &params, &Patch::Merge(&patch)).await.map_err(|e| map_error(e, create_id(&name, &namespace)))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.api(Some(namespace)).delete(name, &DeleteParams::default()).await.map_err(|e| map_error(e, create_id(name, namespace)))?;
        Ok(())
    }

    async fn list(&self, namespace: Option<&str>, labels: &BTreeMap<String, String>) -> Result<Vec<R>, StoreError> {
        let selector = labels.iter().map(|(key, value)| format!("{key}={value}")).join(",");
        let params = if selector.is_empty() { ListParams::default() } else { ListParams::default().labels(&selector) };
        Ok(self.api(namespace).list(&params).await?.items)
    }

    fn watch(&self, namespace: Option<&str>) -> BoxStream<'static, Result<Vec<R>, StoreError>> {
        let (reader, writer) = reflector::store::<R>();
        reflector(writer, watcher(self.api(namespace), watcher::Config::default()))
            .filter_map(move |event| {
                let listing = match event {
                    Ok(watcher::Event::InitDone | watcher::Event::Apply(_) | watcher::Event::Delete(_)) => {
                        Some(Ok(reader.state().iter().map(|resource| R::clone(resource)).collect()))
                    },
                    Ok(watcher::Event::Init | watcher::Event::InitApply(_)) => None,
                    Err(e) => Some(Err(StoreError::Watch(e.to_string()))),
                };
                future::ready(listing)
            })
            .boxed()
    }
}
