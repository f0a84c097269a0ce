use std::fmt::Display;

use kube::ResourceExt;

use crate::{
    apis::{Gateway, Proxy, ResourceRef, RouteTable, SourceRef, VirtualService},
    common::create_id,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ResourceKind {
    Gateway,
    VirtualService,
    RouteTable,
    Proxy,
}

impl ResourceKind {
    /// Short form used when composing generated route names.
    pub fn short(&self) -> &'static str {
        match self {
            ResourceKind::Gateway => "gw",
            ResourceKind::VirtualService => "vs",
            ResourceKind::RouteTable => "rt",
            ResourceKind::Proxy => "px",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Gateway => "Gateway",
            ResourceKind::VirtualService => "VirtualService",
            ResourceKind::RouteTable => "RouteTable",
            ResourceKind::Proxy => "Proxy",
        }
    }

    pub fn from_kind_name(kind: &str) -> Option<Self> {
        match kind {
            "Gateway" => Some(ResourceKind::Gateway),
            "VirtualService" => Some(ResourceKind::VirtualService),
            "RouteTable" => Some(ResourceKind::RouteTable),
            "Proxy" => Some(ResourceKind::Proxy),
            _ => None,
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: &str, namespace: &str) -> Self {
        Self { kind, namespace: namespace.to_owned(), name: name.to_owned() }
    }

    pub fn gateway(name: &str, namespace: &str) -> Self {
        Self::new(ResourceKind::Gateway, name, namespace)
    }

    pub fn virtual_service(name: &str, namespace: &str) -> Self {
        Self::new(ResourceKind::VirtualService, name, namespace)
    }

    pub fn route_table(name: &str, namespace: &str) -> Self {
        Self::new(ResourceKind::RouteTable, name, namespace)
    }

    pub fn proxy(name: &str, namespace: &str) -> Self {
        Self::new(ResourceKind::Proxy, name, namespace)
    }

    pub fn to_ref(&self) -> ResourceRef {
        ResourceRef::new(&self.name, &self.namespace)
    }

    pub fn source_ref(&self, observed_generation: i64) -> SourceRef {
        SourceRef { resource_ref: self.to_ref(), resource_kind: self.kind.as_str().to_owned(), observed_generation }
    }

    /// Key of the resource a proxy element was generated from.
    pub fn from_source(source: &SourceRef) -> Option<Self> {
        let kind = ResourceKind::from_kind_name(&source.resource_kind)?;
        Some(Self::new(kind, &source.resource_ref.name, source.resource_ref.namespace.as_deref().unwrap_or_default()))
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", create_id(&self.name, &self.namespace))
    }
}

/// Resources which can be addressed by a [`ResourceKey`].
pub trait Keyed {
    fn resource_key(&self) -> ResourceKey;
    fn generation(&self) -> i64;

    fn source_ref(&self) -> SourceRef {
        self.resource_key().source_ref(self.generation())
    }
}

macro_rules! impl_keyed {
    ($($resource:ty => $kind:expr),*) => {
        $(
            impl Keyed for $resource {
                fn resource_key(&self) -> ResourceKey {
                    ResourceKey::new($kind, &self.name_any(), &self.namespace().unwrap_or_default())
                }

                fn generation(&self) -> i64 {
                    self.metadata.generation.unwrap_or_default()
                }
            }

            impl From<&$resource> for ResourceKey {
                fn from(resource: &$resource) -> Self {
                    resource.resource_key()
                }
            }
        )*
    };
}

impl_keyed!(
    Gateway => ResourceKind::Gateway,
    VirtualService => ResourceKind::VirtualService,
    RouteTable => ResourceKind::RouteTable,
    Proxy => ResourceKind::Proxy
);
