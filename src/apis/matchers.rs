use std::fmt::Display;

use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PREFIX: &str = "/";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PathSpecifier {
    Prefix(String),
    Exact(String),
    Regex(String),
}

impl PathSpecifier {
    pub fn value(&self) -> &str {
        match self {
            PathSpecifier::Prefix(path) | PathSpecifier::Exact(path) | PathSpecifier::Regex(path) => path,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatcher {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub invert_match: bool,
}

impl Display for HeaderMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match (self.regex, self.invert_match) {
            (false, false) => "=",
            (false, true) => "!=",
            (true, false) => "=~",
            (true, true) => "!~",
        };
        write!(f, "{}{op}{}", self.name, self.value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueryParameterMatcher {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default)]
    pub regex: bool,
}

impl Display for QueryParameterMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.name, if self.regex { "=~" } else { "=" }, self.value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Matcher {
    #[serde(flatten)]
    pub path_specifier: Option<PathSpecifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatcher>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_parameters: Vec<QueryParameterMatcher>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

impl Matcher {
    pub fn default_matcher() -> Self {
        Self::prefix(DEFAULT_PREFIX)
    }

    pub fn prefix(prefix: &str) -> Self {
        Self { path_specifier: Some(PathSpecifier::Prefix(prefix.to_owned())), ..Default::default() }
    }

    pub fn exact(path: &str) -> Self {
        Self { path_specifier: Some(PathSpecifier::Exact(path.to_owned())), ..Default::default() }
    }

    pub fn regex(regex: &str) -> Self {
        Self { path_specifier: Some(PathSpecifier::Regex(regex.to_owned())), ..Default::default() }
    }

    /// The prefix of a prefix matcher, empty for every other path specifier.
    pub fn prefix_value(&self) -> &str {
        match &self.path_specifier {
            Some(PathSpecifier::Prefix(prefix)) => prefix,
            _ => "",
        }
    }

    pub fn path_as_string(&self) -> &str {
        self.path_specifier.as_ref().map_or("", PathSpecifier::value)
    }
}

pub fn headers_to_string(headers: &[HeaderMatcher]) -> String {
    format!("[{}]", headers.iter().join(", "))
}

pub fn query_parameters_to_string(query_parameters: &[QueryParameterMatcher]) -> String {
    format!("[{}]", query_parameters.iter().join(", "))
}
