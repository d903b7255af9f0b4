//! Ordered query parameters with URLSearchParams semantics.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use url::{form_urlencoded, Url};

static INTERCEPT_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\(\.+\))+").expect("valid interception marker pattern"));

/// An ordered multi-map of query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string, with or without the leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            pairs: form_urlencoded::parse(query.as_bytes()).into_owned().collect(),
        }
    }

    pub fn from_url(url: &Url) -> Self {
        Self {
            pairs: url.query_pairs().into_owned().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Replace the first `key` entry and drop the rest, or append.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(first) => {
                self.pairs[first].1 = value;
                let mut index = 0;
                self.pairs.retain(|(k, _)| {
                    let keep = index <= first || k != key;
                    index += 1;
                    keep
                });
            }
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn delete(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(self.pairs.iter());
        f.write_str(&serializer.finish())
    }
}

impl Serialize for SearchParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.pairs.iter())
    }
}

/// Merge `source` into `target`.
///
/// - `nxtP<name>` sets both the raw key and `<name>`
/// - `nxtI<name>` sets `<name>` with interception markers such as `(..)` removed
/// - any other pair is appended unless the key exists with that value (or the
///   value is empty and the key exists)
pub fn apply_search_params(target: &mut SearchParams, source: &SearchParams) {
    for (key, value) in source.iter() {
        if let Some(name) = key.strip_prefix("nxtP").filter(|n| !n.is_empty()) {
            target.set(key, value);
            target.set(name, value);
        } else if let Some(name) = key.strip_prefix("nxtI").filter(|n| !n.is_empty()) {
            target.set(name, INTERCEPT_MARKERS.replacen(value, 1, "").into_owned());
        } else if !target.has(key) || (!value.is_empty() && !target.get_all(key).any(|v| v == value)) {
            target.append(key, value);
        }
    }
}

/// Merge `params` into the query of `url`.
pub fn merge_into_url(url: &mut Url, params: &SearchParams) {
    let mut merged = SearchParams::from_url(url);
    apply_search_params(&mut merged, params);
    if merged.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&merged.to_string()));
    }
}
