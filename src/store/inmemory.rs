use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use kube::ResourceExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use super::{has_labels, ResourceClient, StoreError, StoreResource, WriteOptions};
use crate::common::create_id;

struct Resources<R> {
    items: BTreeMap<(String, String), R>,
    version: u64,
}

/// Store kept in process memory. Every change is published to watchers as a full listing.
#[derive(Clone)]
pub struct InMemoryResourceClient<R> {
    resources: Arc<Mutex<Resources<R>>>,
    sender: Arc<watch::Sender<Vec<R>>>,
}

impl<R: StoreResource> Default for InMemoryResourceClient<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: StoreResource> InMemoryResourceClient<R> {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(vec![]);
        Self { resources: Arc::new(Mutex::new(Resources { items: BTreeMap::new(), version: 0 })), sender: Arc::new(sender) }
    }

    fn key(resource: &R) -> (String, String) {
        (resource.namespace().unwrap_or_default(), resource.name_any())
    }

    fn publish(&self, resources: &Resources<R>) {
        self.sender.send_replace(resources.items.values().cloned().collect());
    }

    fn check_version(stored: &R, resource: &R) -> Result<(), StoreError> {
        match resource.resource_version() {
            Some(version) if Some(&version) != stored.resource_version().as_ref() => {
                Err(StoreError::Conflict(create_id(&stored.name_any(), &stored.namespace().unwrap_or_default())))
            },
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl<R: StoreResource> ResourceClient<R> for InMemoryResourceClient<R> {
    async fn read(&self, namespace: &str, name: &str) -> Result<Option<R>, StoreError> {
        let resources = self.resources.lock().map_err(|_| StoreError::LockingError)?;
        Ok(resources.items.get(&(namespace.to_owned(), name.to_owned())).cloned())
    }

    async fn write(&self, mut resource: R, options: WriteOptions) -> Result<R, StoreError> {
        let mut resources = self.resources.lock().map_err(|_| StoreError::LockingError)?;
        let key = Self::key(&resource);
        if let Some(stored) = resources.items.get(&key) {
            if !options.overwrite_existing {
                return Err(StoreError::AlreadyExists(create_id(&key.1, &key.0)));
            }
            Self::check_version(stored, &resource)?;
        }

        resources.version += 1;
        resource.meta_mut().resource_version = Some(resources.version.to_string());
        debug!("Stored {} version {}", create_id(&key.1, &key.0), resources.version);
        resources.items.insert(key, resource.clone());
        self.publish(&resources);
        Ok(resource)
    }

    async fn write_status(&self, resource: &R) -> Result<R, StoreError> {
        let mut resources = self.resources.lock().map_err(|_| StoreError::LockingError)?;
        let key = Self::key(resource);
        let next_version = resources.version + 1;
        let Some(stored) = resources.items.get_mut(&key) else {
            return Err(StoreError::NotFound(create_id(&key.1, &key.0)));
        };
        Self::check_version(stored, resource)?;

        *stored.statuses_mut() = resource.statuses().cloned();
        stored.meta_mut().resource_version = Some(next_version.to_string());
        let updated = stored.clone();
        resources.version = next_version;
        self.publish(&resources);
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut resources = self.resources.lock().map_err(|_| StoreError::LockingError)?;
        if resources.items.remove(&(namespace.to_owned(), name.to_owned())).is_none() {
            return Err(StoreError::NotFound(create_id(name, namespace)));
        }
        self.publish(&resources);
        Ok(())
    }

    async fn list(&self, namespace: Option<&str>, labels: &BTreeMap<String, String>) -> Result<Vec<R>, StoreError> {
        let resources = self.resources.lock().map_err(|_| StoreError::LockingError)?;
        Ok(resources
            .items
            .iter()
            .filter(|((ns, _), _)| namespace.map_or(true, |namespace| ns.as_str() == namespace))
            .filter(|(_, resource)| has_labels(resource.labels(), labels))
            .map(|(_, resource)| resource.clone())
            .collect())
    }

    fn watch(&self, namespace: Option<&str>) -> BoxStream<'static, Result<Vec<R>, StoreError>> {
        let namespace = namespace.map(ToOwned::to_owned);
        WatchStream::new(self.sender.subscribe())
            .map(move |resources| {
                Ok(resources.into_iter().filter(|resource| namespace.is_none() || resource.namespace() == namespace).collect())
            })
            .boxed()
    }
}
