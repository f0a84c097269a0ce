use std::iter;

use itertools::Itertools;
use tracing::debug;

use super::{
    errors::TranslatorError,
    matchers::sort_routes_by_path,
    options::merge_route_options,
    route_table_selector::{index_by_weight, select_route_tables},
};
use crate::{
    apis::{
        matchers::{headers_to_string, query_parameters_to_string, Matcher, PathSpecifier, DEFAULT_PREFIX},
        proxy::{ProxyAction, ProxyRoute},
        routes::{Action, DelegateAction, Route, RouteOptions},
        RouteTable, SourceRef, VirtualService,
    },
    common::{ApiSnapshot, Keyed, ResourceKey, ResourceKind, ResourceReports, ValidationError},
};

const UNNAMED_ROUTE: &str = "<unnamed>";

#[derive(Clone, Copy, Debug)]
pub enum RoutingResource<'a> {
    VirtualService(&'a VirtualService),
    RouteTable(&'a RouteTable),
}

impl<'a> RoutingResource<'a> {
    pub fn resource_key(&self) -> ResourceKey {
        match self {
            RoutingResource::VirtualService(vs) => vs.resource_key(),
            RoutingResource::RouteTable(rt) => rt.resource_key(),
        }
    }

    pub fn routes(&self) -> &'a [Route] {
        match self {
            RoutingResource::VirtualService(vs) => vs.spec.virtual_host.as_ref().map_or(&[], |vh| &vh.routes),
            RoutingResource::RouteTable(rt) => &rt.spec.routes,
        }
    }

    fn source_ref(&self) -> SourceRef {
        match self {
            RoutingResource::VirtualService(vs) => vs.source_ref(),
            RoutingResource::RouteTable(rt) => rt.source_ref(),
        }
    }
}

/// What a delegate route hands down to the routes of the tables it delegates to.
#[derive(Clone, Debug)]
struct RouteInfo {
    matcher: Matcher,
    options: Option<RouteOptions>,
    name: String,
    has_name: bool,
    inheritable_matchers: Option<bool>,
}

/// Flattens the delegation tree of a virtual service into the route list of a proxy virtual host.
pub struct RouteConverter<'a> {
    snapshot: &'a ApiSnapshot,
}

impl<'a> RouteConverter<'a> {
    pub fn new(snapshot: &'a ApiSnapshot) -> Self {
        Self { snapshot }
    }

    /// Returns an error only for internal failures. Invalid configuration is written to `reports`
    /// and the offending subtree is left out of the result.
    pub fn convert_virtual_service(&self, virtual_service: &'a VirtualService, reports: &mut ResourceReports) -> Result<Vec<ProxyRoute>, TranslatorError> {
        let mut visitor = Visitor { route_tables: &self.snapshot.route_tables, top_virtual_service: virtual_service.resource_key(), reports };
        visitor.visit(RoutingResource::VirtualService(virtual_service), None, &[])
    }
}

struct Visitor<'a, 'r> {
    route_tables: &'a [RouteTable],
    top_virtual_service: ResourceKey,
    reports: &'r mut ResourceReports,
}

impl<'a> Visitor<'a, '_> {
    fn visit(&mut self, resource: RoutingResource<'a>, parent: Option<&RouteInfo>, visited: &[ResourceKey]) -> Result<Vec<ProxyRoute>, TranslatorError> {
        let resource_key = resource.resource_key();
        let mut converted = vec![];

        for source_route in resource.routes() {
            let mut route = source_route.clone();
            let has_name = !route.name.is_empty() || parent.is_some_and(|p| p.has_name);
            route.name = route_name(&resource_key, &route.name, parent);

            if let Some(parent) = parent {
                if let Err(error) = validate_and_merge_parent_route(&mut route, parent) {
                    debug!("Route {} on {resource_key} is not valid under its parent {error}", route.name);
                    self.report_error(&resource_key, error);
                    continue;
                }
            }

            match route.action.take() {
                None => self.report_error(&resource_key, ValidationError::NoAction),
                Some(Action::DelegateAction(delegate)) => {
                    let delegated = self.visit_delegate(&resource_key, route, &delegate, has_name, visited)?;
                    converted.extend(delegated);
                },
                Some(action) => {
                    if !has_name {
                        route.name.clear();
                    }
                    converted.push(convert_simple_route(route, action, &resource_key.namespace)?);
                },
            }
        }

        let source = resource.source_ref();
        for route in &mut converted {
            route.metadata_static.get_or_insert_with(Default::default).sources.push(source.clone());
        }
        Ok(converted)
    }

    fn visit_delegate(&mut self, resource_key: &ResourceKey, route: Route, delegate: &DelegateAction, has_name: bool, visited: &[ResourceKey]) -> Result<Vec<ProxyRoute>, TranslatorError> {
        let matcher = match delegate_route_matcher(&route) {
            Ok(matcher) => matcher,
            Err(error) => {
                self.report_error(resource_key, error);
                return Ok(vec![]);
            },
        };

        let route_tables = match select_route_tables(self.route_tables, delegate, &resource_key.namespace) {
            Ok(route_tables) => route_tables,
            Err(warning) => {
                self.reports.add_warning(resource_key, warning.to_string());
                return Ok(vec![]);
            },
        };

        let info = RouteInfo { matcher, options: route.options, name: route.name, has_name, inheritable_matchers: route.inheritable_matchers };
        let (by_weight, weights) = index_by_weight(route_tables);
        let mut delegated = vec![];
        for weight in weights {
            let Some(route_tables) = by_weight.get(&weight) else {
                continue;
            };
            let mut weighted = vec![];
            for route_table in route_tables.iter().copied() {
                let route_table_key = route_table.resource_key();
                if visited.contains(&route_table_key) {
                    let chain = visited.iter().chain(iter::once(&route_table_key)).map(|key| format!("[{key}]")).join(" -> ");
                    self.report_error(&route_table_key, ValidationError::DelegationCycle(chain));
                    continue;
                }

                let mut branch_visited = visited.to_vec();
                branch_visited.push(route_table_key);
                weighted.extend(self.visit(RoutingResource::RouteTable(route_table), Some(&info), &branch_visited)?);
            }

            if route_tables.len() > 1 {
                sort_routes_by_path(&mut weighted);
            }
            delegated.extend(weighted);
        }
        Ok(delegated)
    }

    /// Errors on route tables are mirrored to the virtual service the traversal started from.
    fn report_error(&mut self, resource_key: &ResourceKey, error: ValidationError) {
        if resource_key.kind == ResourceKind::RouteTable {
            self.reports.add_error(&self.top_virtual_service, error.clone().on_sub_route_table(resource_key));
        }
        self.reports.add_error(resource_key, error);
    }
}

fn route_name(resource_key: &ResourceKey, route_name: &str, parent: Option<&RouteInfo>) -> String {
    let prefix = parent.map(|p| format!("{}_", p.name)).unwrap_or_default();
    let display_name = if route_name.is_empty() { UNNAMED_ROUTE } else { route_name };
    format!("{prefix}{}:{}_route:{display_name}", resource_key.kind.short(), resource_key.name)
}

fn delegate_route_matcher(route: &Route) -> Result<Matcher, ValidationError> {
    match route.matchers.as_slice() {
        [] => Ok(Matcher::default_matcher()),
        [matcher] => match &matcher.path_specifier {
            None => Ok(Matcher { path_specifier: Some(PathSpecifier::Prefix(DEFAULT_PREFIX.to_owned())), ..matcher.clone() }),
            Some(PathSpecifier::Prefix(_)) => Ok(matcher.clone()),
            Some(_) => Err(ValidationError::MissingPrefix),
        },
        _ => Err(ValidationError::MatcherCount),
    }
}

fn validate_and_merge_parent_route(child: &mut Route, parent: &RouteInfo) -> Result<(), ValidationError> {
    if child.inheritable_matchers.is_none() {
        child.inheritable_matchers = parent.inheritable_matchers;
    }
    let inherit = child.inheritable_matchers.unwrap_or_default();

    if child.matchers.is_empty() {
        child.matchers.push(if inherit { parent.matcher.clone() } else { Matcher::default_matcher() });
    } else {
        for matcher in &mut child.matchers {
            matcher.path_specifier.get_or_insert_with(|| PathSpecifier::Prefix(DEFAULT_PREFIX.to_owned()));
            if inherit {
                matcher.headers.splice(0..0, parent.matcher.headers.iter().cloned());
                matcher.query_parameters.splice(0..0, parent.matcher.query_parameters.iter().cloned());
                let missing_methods: Vec<_> = parent.matcher.methods.iter().filter(|m| !matcher.methods.contains(m)).cloned().collect();
                matcher.methods.splice(0..0, missing_methods);
            }
        }
    }

    for matcher in &child.matchers {
        validate_matcher(matcher, &parent.matcher)?;
    }

    child.options = merge_route_options(child.options.take(), parent.options.as_ref());
    Ok(())
}

fn validate_matcher(child: &Matcher, parent: &Matcher) -> Result<(), ValidationError> {
    let required_prefix = parent.prefix_value();
    let path = child.path_as_string();
    if !path.starts_with(required_prefix) {
        return Err(ValidationError::InvalidPrefix { parent: required_prefix.to_owned(), child: path.to_owned() });
    }

    if !parent.headers.iter().all(|header| child.headers.contains(header)) {
        return Err(ValidationError::InvalidHeaders { parent: headers_to_string(&parent.headers), child: headers_to_string(&child.headers) });
    }

    if !parent.query_parameters.iter().all(|parameter| child.query_parameters.contains(parameter)) {
        return Err(ValidationError::InvalidQueryParams {
            parent: query_parameters_to_string(&parent.query_parameters),
            child: query_parameters_to_string(&child.query_parameters),
        });
    }

    if !parent.methods.iter().all(|method| child.methods.contains(method)) {
        return Err(ValidationError::InvalidMethods { parent: methods_to_string(&parent.methods), child: methods_to_string(&child.methods) });
    }
    Ok(())
}

fn methods_to_string(methods: &[String]) -> String {
    format!("[{}]", methods.join(", "))
}

fn convert_simple_route(mut route: Route, action: Action, namespace: &str) -> Result<ProxyRoute, TranslatorError> {
    let action = match action {
        Action::RouteAction(mut route_action) => {
            route_action.default_namespace(namespace);
            ProxyAction::RouteAction(route_action)
        },
        Action::RedirectAction(redirect) => ProxyAction::RedirectAction(redirect),
        Action::DirectResponseAction(direct_response) => ProxyAction::DirectResponseAction(direct_response),
        Action::DelegateAction(_) => return Err(TranslatorError::UnexpectedDelegateAction(route.name)),
    };

    if route.matchers.is_empty() {
        route.matchers.push(Matcher::default_matcher());
    }

    Ok(ProxyRoute { name: route.name, matchers: route.matchers, action: Some(action), options: route.options, metadata_static: None })
}
