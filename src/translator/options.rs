use crate::apis::routes::{HeaderManipulation, RouteOptions};

/// Merges inherited options underneath the child's own. Every field the child sets wins;
/// extensions are merged per plugin name.
pub fn merge_route_options(child: Option<RouteOptions>, parent: Option<&RouteOptions>) -> Option<RouteOptions> {
    let Some(parent) = parent else {
        return child;
    };
    let Some(mut child) = child else {
        return Some(parent.clone());
    };

    child.timeout = child.timeout.or_else(|| parent.timeout.clone());
    child.retries = child.retries.or_else(|| parent.retries.clone());
    child.prefix_rewrite = child.prefix_rewrite.or_else(|| parent.prefix_rewrite.clone());
    child.host_rewrite = child.host_rewrite.or_else(|| parent.host_rewrite.clone());
    child.auto_host_rewrite = child.auto_host_rewrite.or(parent.auto_host_rewrite);
    child.header_manipulation = match (child.header_manipulation, parent.header_manipulation.as_ref()) {
        (Some(child_headers), Some(parent_headers)) => Some(merge_header_manipulation(child_headers, parent_headers)),
        (child_headers, parent_headers) => child_headers.or_else(|| parent_headers.cloned()),
    };
    for (plugin, config) in &parent.extensions {
        child.extensions.entry(plugin.clone()).or_insert_with(|| config.clone());
    }
    Some(child)
}

fn merge_header_manipulation(mut child: HeaderManipulation, parent: &HeaderManipulation) -> HeaderManipulation {
    for (name, value) in &parent.request_headers_to_add {
        child.request_headers_to_add.entry(name.clone()).or_insert_with(|| value.clone());
    }
    for (name, value) in &parent.response_headers_to_add {
        child.response_headers_to_add.entry(name.clone()).or_insert_with(|| value.clone());
    }
    if child.request_headers_to_remove.is_empty() {
        child.request_headers_to_remove.clone_from(&parent.request_headers_to_remove);
    }
    if child.response_headers_to_remove.is_empty() {
        child.response_headers_to_remove.clone_from(&parent.response_headers_to_remove);
    }
    child
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_child_wins_per_field() {
        let parent = RouteOptions {
            timeout: Some("10s".to_owned()),
            prefix_rewrite: Some("/parent".to_owned()),
            extensions: BTreeMap::from([("rateLimit".to_owned(), json!({"rpm": 10})), ("cors".to_owned(), json!({"allow": "*"}))]),
            ..Default::default()
        };
        let child = RouteOptions {
            prefix_rewrite: Some("/child".to_owned()),
            extensions: BTreeMap::from([("rateLimit".to_owned(), json!({"rpm": 100}))]),
            ..Default::default()
        };

        let merged = merge_route_options(Some(child), Some(&parent)).unwrap();
        assert_eq!(merged.timeout.as_deref(), Some("10s"));
        assert_eq!(merged.prefix_rewrite.as_deref(), Some("/child"));
        assert_eq!(merged.extensions["rateLimit"], json!({"rpm": 100}));
        assert_eq!(merged.extensions["cors"], json!({"allow": "*"}));
    }

    #[test]
    fn test_missing_sides() {
        let parent = RouteOptions { timeout: Some("1s".to_owned()), ..Default::default() };
        assert_eq!(merge_route_options(None, Some(&parent)), Some(parent.clone()));
        assert_eq!(merge_route_options(Some(parent.clone()), None), Some(parent));
        assert_eq!(merge_route_options(None, None), None);
    }

    #[test]
    fn test_header_manipulation_merges_maps() {
        let parent = RouteOptions {
            header_manipulation: Some(HeaderManipulation {
                request_headers_to_add: BTreeMap::from([("x-a".to_owned(), "parent".to_owned()), ("x-b".to_owned(), "parent".to_owned())]),
                request_headers_to_remove: vec!["x-remove".to_owned()],
                ..Default::default()
            }),
            ..Default::default()
        };
        let child = RouteOptions {
            header_manipulation: Some(HeaderManipulation {
                request_headers_to_add: BTreeMap::from([("x-a".to_owned(), "child".to_owned())]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge_route_options(Some(child), Some(&parent)).unwrap().header_manipulation.unwrap();
        assert_eq!(merged.request_headers_to_add["x-a"], "child");
        assert_eq!(merged.request_headers_to_add["x-b"], "parent");
        assert_eq!(merged.request_headers_to_remove, vec!["x-remove".to_owned()]);
    }
}
