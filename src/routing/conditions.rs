//! `has` / `missing` condition evaluation.
//!
//! # Design Decisions
//! - Never fails: an absent header, cookie or query value is `valid: false`
//! - Value patterns are matched case-insensitively
//! - A pattern with named captures can rewrite the route destination

use std::collections::HashMap;

use axum::http::HeaderMap;
use url::Url;

use crate::http::headers::joined_value;
use crate::http::search_params::SearchParams;
use crate::manifest::Condition;
use crate::pattern::{apply_pcre_matches, PatternCache};

/// Request state a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ConditionInput<'a> {
    pub url: &'a Url,
    pub cookies: &'a HashMap<String, String>,
    pub headers: &'a HeaderMap,
    /// Destination template of the route being checked.
    pub route_dest: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HasFieldResult {
    pub valid: bool,
    pub new_route_dest: Option<String>,
}

impl HasFieldResult {
    fn valid(valid: bool) -> Self {
        Self {
            valid,
            new_route_dest: None,
        }
    }
}

/// Evaluate one condition.
pub fn has_field(condition: &Condition, input: &ConditionInput<'_>, patterns: &PatternCache) -> HasFieldResult {
    match condition {
        Condition::Host { value } => HasFieldResult::valid(input.url.host_str() == Some(value.as_str())),
        Condition::Header { key, value } => {
            let found = joined_value(input.headers, key.to_ascii_lowercase());
            check_value(value.as_deref(), found.as_deref(), input.route_dest, patterns)
        }
        Condition::Cookie { key, value } => {
            let found = input.cookies.get(key).map(String::as_str);
            check_value(value.as_deref(), found, input.route_dest, patterns)
        }
        Condition::Query { key, value } => {
            let params = SearchParams::from_url(input.url);
            check_value(value.as_deref(), params.get(key), input.route_dest, patterns)
        }
    }
}

fn check_value(
    pattern: Option<&str>,
    found: Option<&str>,
    route_dest: Option<&str>,
    patterns: &PatternCache,
) -> HasFieldResult {
    let Some(pattern) = pattern else {
        return HasFieldResult::valid(found.is_some());
    };
    let Some(found) = found else {
        return HasFieldResult::valid(false);
    };

    match patterns.match_pcre(pattern, Some(found), false) {
        Ok(Some(matched)) => HasFieldResult {
            valid: true,
            new_route_dest: route_dest
                .filter(|_| matched.has_named_captures())
                .map(|dest| apply_pcre_matches(dest, &matched, true)),
        },
        Ok(None) => HasFieldResult::valid(false),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Condition pattern failed to compile");
            HasFieldResult::valid(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    struct Fixture {
        url: Url,
        cookies: HashMap<String, String>,
        headers: HeaderMap,
    }

    impl Fixture {
        fn new() -> Self {
            let mut headers = HeaderMap::new();
            headers.insert("x-nextjs-data", HeaderValue::from_static("1"));
            headers.insert("x-tenant", HeaderValue::from_static("Acme"));
            Self {
                url: Url::parse("https://shop.test/products?lang=fr").unwrap(),
                cookies: HashMap::from([("session".to_string(), "abc".to_string())]),
                headers,
            }
        }

        fn input<'a>(&'a self, dest: Option<&'a str>) -> ConditionInput<'a> {
            ConditionInput {
                url: &self.url,
                cookies: &self.cookies,
                headers: &self.headers,
                route_dest: dest,
            }
        }
    }

    fn header(key: &str, value: Option<&str>) -> Condition {
        Condition::Header {
            key: key.into(),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_host_exact() {
        let fixture = Fixture::new();
        let patterns = PatternCache::new();
        let input = fixture.input(None);

        assert!(has_field(&Condition::Host { value: "shop.test".into() }, &input, &patterns).valid);
        assert!(!has_field(&Condition::Host { value: "shop".into() }, &input, &patterns).valid);
    }

    #[test]
    fn test_presence_checks() {
        let fixture = Fixture::new();
        let patterns = PatternCache::new();
        let input = fixture.input(None);

        assert!(has_field(&header("x-nextjs-data", None), &input, &patterns).valid);
        assert!(!has_field(&header("x-missing", None), &input, &patterns).valid);
        let cookie = Condition::Cookie {
            key: "session".into(),
            value: None,
        };
        assert!(has_field(&cookie, &input, &patterns).valid);
        let query = Condition::Query {
            key: "lang".into(),
            value: Some("^fr$".into()),
        };
        assert!(has_field(&query, &input, &patterns).valid);
    }

    #[test]
    fn test_missing_value_with_pattern_is_invalid() {
        let fixture = Fixture::new();
        let patterns = PatternCache::new();
        let cookie = Condition::Cookie {
            key: "theme".into(),
            value: Some(".*".into()),
        };
        assert_eq!(
            has_field(&cookie, &fixture.input(None), &patterns),
            HasFieldResult::default()
        );
    }

    #[test]
    fn test_named_capture_rewrites_dest() {
        let fixture = Fixture::new();
        let patterns = PatternCache::new();
        let condition = header("x-tenant", Some("(?<tenant>acme|globex)"));

        let result = has_field(&condition, &fixture.input(Some("/sites/$tenant/$1")), &patterns);
        assert!(result.valid);
        assert_eq!(result.new_route_dest.as_deref(), Some("/sites/Acme/$1"));
    }
}
