mod reports;
mod resource_key;
mod snapshot;
#[cfg(test)]
pub(crate) mod test;

use std::collections::BTreeMap;

pub use reports::{errors_to_string, InvalidReports, Report, ResourceReports, ValidationError};
pub use resource_key::{Keyed, ResourceKey, ResourceKind};
pub use snapshot::ApiSnapshot;

use crate::apis::Proxy;

pub fn create_id(name: &str, namespace: &str) -> String {
    namespace.to_owned() + "." + name
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedProxy {
    pub proxy: Proxy,
    pub reports: ResourceReports,
}

/// Desired proxies of one translation pass together with the reports produced while building them.
pub type GeneratedProxies = BTreeMap<ResourceKey, GeneratedProxy>;
