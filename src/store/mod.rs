mod inmemory;
mod kubernetes;

use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use futures::stream::BoxStream;
pub use inmemory::InMemoryResourceClient;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
pub use kubernetes::KubeResourceClient;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::apis::StatusHolder;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("resource version conflict on {0}")]
    Conflict(String),
    #[error("kubernetes error {0}")]
    Kube(#[from] kube::Error),
    #[error("watch error {0}")]
    Watch(String),
    #[error("locking error")]
    LockingError,
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    pub overwrite_existing: bool,
}

impl WriteOptions {
    pub fn overwrite() -> Self {
        Self { overwrite_existing: true }
    }
}

/// Anything the stores can hold.
pub trait StoreResource: Resource<DynamicType = (), Scope = NamespaceResourceScope> + StatusHolder + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreResource for T where T: Resource<DynamicType = (), Scope = NamespaceResourceScope> + StatusHolder + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Typed access to one kind of resource in the backing store.
///
/// Writes carrying a resource version are rejected with [`StoreError::Conflict`] when the stored
/// object has moved on. Writes without one replace whatever is stored.
#[async_trait]
pub trait ResourceClient<R: StoreResource>: Send + Sync {
    async fn read(&self, namespace: &str, name: &str) -> Result<Option<R>, StoreError>;

    async fn write(&self, resource: R, options: WriteOptions) -> Result<R, StoreError>;

    /// Replaces only the status of a stored resource.
    async fn write_status(&self, resource: &R) -> Result<R, StoreError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Lists resources in one or all namespaces carrying every given label.
    async fn list(&self, namespace: Option<&str>, labels: &BTreeMap<String, String>) -> Result<Vec<R>, StoreError>;

    /// Full listings, one per change, starting with the current content.
    fn watch(&self, namespace: Option<&str>) -> BoxStream<'static, Result<Vec<R>, StoreError>>;
}

pub fn has_labels(resource_labels: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    labels.iter().all(|(key, value)| resource_labels.get(key) == Some(value))
}
