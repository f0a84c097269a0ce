use std::{collections::BTreeMap, fmt::Display};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::create_id;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ResourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self { name: name.to_owned(), namespace: Some(namespace.to_owned()) }
    }

    pub fn namespace_or<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        match self.namespace.as_deref() {
            Some(namespace) if !namespace.is_empty() => namespace,
            _ => default_namespace,
        }
    }
}

impl Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", create_id(&self.name, self.namespace.as_deref().unwrap_or_default()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum State {
    #[default]
    Pending,
    Accepted,
    Warning,
    Rejected,
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub state: State,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reported_by: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subresource_statuses: BTreeMap<String, Status>,
}

impl Status {
    pub fn pending(reported_by: &str) -> Self {
        Self { state: State::Pending, reported_by: reported_by.to_owned(), ..Default::default() }
    }

    pub fn accepted(reported_by: &str) -> Self {
        Self { state: State::Accepted, reported_by: reported_by.to_owned(), ..Default::default() }
    }

    pub fn rejected(reported_by: &str, reason: &str) -> Self {
        Self { state: State::Rejected, reason: reason.to_owned(), reported_by: reported_by.to_owned(), ..Default::default() }
    }
}

/// Statuses keyed by the namespace of the component that reported them, so several
/// writers can share one resource without overwriting each other.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NamespacedStatuses {
    #[serde(default)]
    pub statuses: BTreeMap<String, Status>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub resource_ref: ResourceRef,
    pub resource_kind: String,
    pub observed_generation: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceMetadata {
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SslConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<ResourceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sni_domains: Vec<String>,
}

pub trait StatusHolder {
    fn statuses(&self) -> Option<&NamespacedStatuses>;
    fn statuses_mut(&mut self) -> &mut Option<NamespacedStatuses>;

    fn status_for(&self, namespace: &str) -> Option<&Status> {
        self.statuses().and_then(|s| s.statuses.get(namespace))
    }

    fn set_status_for(&mut self, namespace: &str, status: Status) {
        self.statuses_mut().get_or_insert_with(NamespacedStatuses::default).statuses.insert(namespace.to_owned(), status);
    }
}
