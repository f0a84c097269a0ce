use std::cmp::Ordering;

use tracing::debug;

use crate::apis::{
    matchers::{Matcher, PathSpecifier, DEFAULT_PREFIX},
    proxy::ProxyRoute,
};

fn method_matching(this: &Matcher, other: &Matcher) -> Ordering {
    other.methods.len().cmp(&this.methods.len())
}

fn specifier_rank(matcher: &Matcher) -> u8 {
    match matcher.path_specifier {
        Some(PathSpecifier::Exact(_)) => 0,
        Some(PathSpecifier::Regex(_)) => 1,
        Some(PathSpecifier::Prefix(_)) | None => 2,
    }
}

fn path_matching(this: &Matcher, other: &Matcher) -> Ordering {
    let maybe_equal = specifier_rank(this).cmp(&specifier_rank(other));
    if maybe_equal == Ordering::Equal {
        path_length(other).cmp(&path_length(this))
    } else {
        maybe_equal
    }
}

fn path_length(matcher: &Matcher) -> usize {
    match &matcher.path_specifier {
        Some(specifier) => specifier.value().len(),
        None => DEFAULT_PREFIX.len(),
    }
}

/// Orders matchers from most to least specific: more methods first, then exact before regex before
/// prefix, then longer paths first.
pub fn compare_matchers(this: &Matcher, other: &Matcher) -> Ordering {
    let method_match = method_matching(this, other);
    let result = if method_match == Ordering::Equal { path_matching(this, other) } else { method_match };
    debug!("Comparing {:?} {:?} {result:?}", this.path_specifier, other.path_specifier);
    result
}

fn first_matcher(route: &ProxyRoute) -> Matcher {
    route.matchers.first().cloned().unwrap_or_else(Matcher::default_matcher)
}

/// Stable sort of routes by the specificity of their first matcher.
pub fn sort_routes_by_path(routes: &mut [ProxyRoute]) {
    routes.sort_by(|this, other| compare_matchers(&first_matcher(this), &first_matcher(other)));
}
