use std::collections::{btree_map, BTreeMap};

use itertools::Itertools;
use thiserror::Error;

use super::ResourceKey;

/// Configuration problems found while translating. They are recorded in [`ResourceReports`] and
/// never returned as function errors.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid route: route must specify an action")]
    NoAction,
    #[error("invalid route: routes with delegate actions must omit or specify a single matcher")]
    MatcherCount,
    #[error("invalid route: routes with delegate actions must use a prefix matcher")]
    MissingPrefix,
    #[error("invalid route: route table matchers must begin with the prefix of their parent route's matcher: required prefix: {parent}, path: {child}")]
    InvalidPrefix { parent: String, child: String },
    #[error("invalid route: route table matchers must have all headers that were specified on their parent route's matcher: required headers: {parent}, headers: {child}")]
    InvalidHeaders { parent: String, child: String },
    #[error("invalid route: route table matchers must have all query params that were specified on their parent route's matcher: required query params: {parent}, query params: {child}")]
    InvalidQueryParams { parent: String, child: String },
    #[error("invalid route: route table matchers must have all methods that were specified on their parent route's matcher: required methods: {parent}, methods: {child}")]
    InvalidMethods { parent: String, child: String },
    #[error("invalid route: delegation cycle detected: {0}")]
    DelegationCycle(String),
    #[error("on sub route table {route_table}: {error}")]
    OnSubRouteTable { route_table: String, error: Box<ValidationError> },
    #[error("bind-address {address} is not unique in a proxy. gateways: {gateways}")]
    NonUniqueBindAddress { address: String, gateways: String },
    #[error("domain conflict: other virtual services that belong to the same Gateway as this one don't specify a domain (and thus default to '*'): {virtual_services}")]
    WildcardDomainConflict { virtual_services: String },
    #[error("domain conflict: the [{domain}] domain is present in other virtual services that belong to the same Gateway as this one: {virtual_services}")]
    DomainConflict { domain: String, virtual_services: String },
    #[error("domain conflict: the following domains are present in more than one of the virtual services associated with this gateway: {0}")]
    GatewayDomainConflict(String),
    #[error("virtual service omits sni domains on an ssl gateway where other virtual services also omit them: {0}")]
    SslDefaultConflict(String),
    #[error("ssl gateway has more than one virtual service without sni domains: {0}")]
    GatewaySslDefaultConflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ValidationError {
    pub fn on_sub_route_table(self, route_table: &ResourceKey) -> Self {
        ValidationError::OnSubRouteTable { route_table: route_table.to_string(), error: Box::new(self) }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl Report {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn merge(&mut self, other: &Report) {
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("{}", .failures.join("; "))]
pub struct InvalidReports {
    pub failures: Vec<String>,
}

/// Errors and warnings per resource for one translation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceReports(BTreeMap<ResourceKey, Report>);

impl ResourceReports {
    /// Makes sure every given resource has an entry, so that resources without problems are
    /// reported as accepted.
    pub fn accept<'a>(&mut self, keys: impl IntoIterator<Item = &'a ResourceKey>) {
        for key in keys {
            self.0.entry(key.clone()).or_default();
        }
    }

    pub fn add_error(&mut self, key: &ResourceKey, error: ValidationError) {
        self.0.entry(key.clone()).or_default().errors.push(error);
    }

    pub fn add_warning(&mut self, key: &ResourceKey, warning: impl Into<String>) {
        self.0.entry(key.clone()).or_default().warnings.push(warning.into());
    }

    pub fn insert(&mut self, key: ResourceKey, report: Report) {
        self.0.insert(key, report);
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Report> {
        self.0.get(key)
    }

    pub fn has_errors(&self, key: &ResourceKey) -> bool {
        self.0.get(key).is_some_and(Report::has_errors)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ResourceKey, Report> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenates the other reports onto these.
    pub fn merge(&mut self, other: &ResourceReports) {
        for (key, report) in other.iter() {
            self.0.entry(key.clone()).or_default().merge(report);
        }
    }

    /// Fails when any resource has errors. Warnings are ignored.
    pub fn validate(&self) -> Result<(), InvalidReports> {
        self.check(false)
    }

    /// Fails when any resource has errors or warnings.
    pub fn validate_strict(&self) -> Result<(), InvalidReports> {
        self.check(true)
    }

    fn check(&self, strict: bool) -> Result<(), InvalidReports> {
        let failures: Vec<_> = self
            .0
            .iter()
            .flat_map(|(key, report)| {
                let errors = report.errors.iter().map(move |e| format!("{} {key} has error: {e}", key.kind));
                let warnings = report.warnings.iter().filter(move |_| strict).map(move |w| format!("{} {key} has warning: {w}", key.kind));
                errors.chain(warnings)
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(InvalidReports { failures })
        }
    }
}

impl<'a> IntoIterator for &'a ResourceReports {
    type Item = (&'a ResourceKey, &'a Report);
    type IntoIter = btree_map::Iter<'a, ResourceKey, Report>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

pub fn errors_to_string(errors: &[ValidationError]) -> String {
    errors.iter().join("; ")
}
