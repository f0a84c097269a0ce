use std::collections::BTreeMap;

use kube::ResourceExt;
use thiserror::Error;

use crate::{
    apis::{
        routes::{DelegateAction, RouteTableSelector, ALL_NAMESPACES},
        RouteTable,
    },
    common::create_id,
};

/// Reasons a delegate action resolves to nothing. They surface as warnings on the delegating resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionWarning {
    #[error("route table {0} missing")]
    MissingRouteTable(String),
    #[error("no route table matches the given selector")]
    NoMatchingRouteTables,
    #[error("delegate action must specify either a route table reference or a route table selector")]
    MissingReferenceAndSelector,
}

/// Finds the route tables a delegate action points at. A direct reference without a namespace is
/// looked up in the caller's namespace.
pub fn select_route_tables<'a>(route_tables: &'a [RouteTable], action: &DelegateAction, caller_namespace: &str) -> Result<Vec<&'a RouteTable>, SelectionWarning> {
    if let Some(reference) = &action.reference {
        let namespace = reference.namespace_or(caller_namespace);
        return route_tables
            .iter()
            .find(|rt| rt.name_any() == reference.name && rt.namespace().as_deref() == Some(namespace))
            .map(|rt| vec![rt])
            .ok_or_else(|| SelectionWarning::MissingRouteTable(create_id(&reference.name, namespace)));
    }

    let Some(selector) = &action.selector else {
        return Err(SelectionWarning::MissingReferenceAndSelector);
    };

    let mut selected: Vec<_> = route_tables.iter().filter(|rt| matches_selector(rt, selector)).collect();
    if selected.is_empty() {
        return Err(SelectionWarning::NoMatchingRouteTables);
    }
    selected.sort_by_cached_key(|rt| (rt.namespace(), rt.name_any()));
    Ok(selected)
}

fn matches_selector(route_table: &RouteTable, selector: &RouteTableSelector) -> bool {
    let namespace_matches = selector.namespaces.is_empty()
        || selector.namespaces.iter().any(|ns| ns == ALL_NAMESPACES || route_table.namespace().as_deref() == Some(ns.as_str()));
    let labels = route_table.labels();
    let labels_match = selector.labels.iter().all(|(key, value)| labels.get(key) == Some(value));
    namespace_matches && labels_match
}

/// Groups route tables by weight, keeping their relative order inside a group. The returned
/// weights are ascending, which is the order the groups are emitted in.
pub fn index_by_weight(route_tables: Vec<&RouteTable>) -> (BTreeMap<i32, Vec<&RouteTable>>, Vec<i32>) {
    let mut by_weight: BTreeMap<i32, Vec<&RouteTable>> = BTreeMap::new();
    for route_table in route_tables {
        by_weight.entry(route_table.spec.weight.unwrap_or_default()).or_default().push(route_table);
    }
    let weights = by_weight.keys().copied().collect();
    (by_weight, weights)
}
