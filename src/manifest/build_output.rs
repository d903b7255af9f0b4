//! Build output: the terminal mapping from a resolved path to what serves it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuildOutputItem {
    /// Served from the static assets at the request path.
    Static,
    /// Served from the static assets at `path`, with extra headers.
    Override {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<BTreeMap<String, String>>,
    },
    Function {
        entrypoint: String,
    },
    Middleware {
        entrypoint: String,
    },
}

impl BuildOutputItem {
    /// Entrypoint of a function or middleware item.
    pub fn entrypoint(&self) -> Option<&str> {
        match self {
            BuildOutputItem::Function { entrypoint } | BuildOutputItem::Middleware { entrypoint } => {
                Some(entrypoint)
            }
            _ => None,
        }
    }

    pub fn is_middleware(&self) -> bool {
        matches!(self, BuildOutputItem::Middleware { .. })
    }
}

/// Output path (including `.rsc` and `.json` variants) → item.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct BuildOutput {
    items: HashMap<String, BuildOutputItem>,
}

impl BuildOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&BuildOutputItem> {
        self.items.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.items.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, item: BuildOutputItem) -> Option<BuildOutputItem> {
        self.items.insert(path.into(), item)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BuildOutputItem)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<(String, BuildOutputItem)> for BuildOutput {
    fn from_iter<T: IntoIterator<Item = (String, BuildOutputItem)>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_output() {
        let output: BuildOutput = serde_json::from_str(
            r#"{
                "/": {"type": "static"},
                "/about": {"type": "override", "path": "/about.html", "headers": {"content-type": "text/html"}},
                "/api/hello": {"type": "function", "entrypoint": "api/hello"},
                "middleware": {"type": "middleware", "entrypoint": "middleware"}
            }"#,
        )
        .unwrap();

        assert_eq!(output.len(), 4);
        assert_eq!(output.get("/"), Some(&BuildOutputItem::Static));
        assert_eq!(output.get("/api/hello").and_then(|i| i.entrypoint()), Some("api/hello"));
        assert!(output.get("middleware").is_some_and(|i| i.is_middleware()));
        assert!(!output.contains("/missing"));
    }
}
