//! Route manifest schema.
//!
//! Routes are accepted in two shapes: grouped by phase
//! (`{"none": [...], "filesystem": [...]}`) or as the flat Vercel list in
//! which `{"handle": "<phase>"}` entries switch the phase that subsequent
//! routes belong to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::routing::Phase;

/// The routing manifest produced at build time.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesManifest {
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub routes: PhaseRoutes,

    #[serde(default)]
    pub images: Option<ImagesConfig>,

    /// Raw output path → override of where (and as what) it is served.
    #[serde(default)]
    pub overrides: BTreeMap<String, OverrideConfig>,

    #[serde(default)]
    pub wildcard: Vec<WildcardConfig>,
}

/// A declarative match-and-transform rule.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub src: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has: Option<Vec<Condition>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<Condition>>,

    #[serde(default, rename = "continue")]
    pub continue_: bool,

    #[serde(default, rename = "override")]
    pub override_: bool,

    #[serde(default)]
    pub important: bool,

    #[serde(default)]
    pub check: bool,

    #[serde(default)]
    pub case_sensitive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middleware_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<RouteLocale>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RouteLocale {
    /// Locale code → redirect target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<BTreeMap<String, String>>,

    /// Cookie holding the preferred locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

/// A `has`/`missing` condition. An absent `value` is a presence check.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    Host {
        value: String,
    },
    Header {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Cookie {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Query {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl Condition {
    /// The value pattern, if this condition carries one.
    pub fn pattern(&self) -> Option<&str> {
        match self {
            Condition::Host { .. } => None,
            Condition::Header { value, .. }
            | Condition::Cookie { value, .. }
            | Condition::Query { value, .. } => value.as_deref(),
        }
    }
}

/// Ordered route lists, one per phase.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(from = "RawRoutes")]
pub struct PhaseRoutes {
    #[serde(default)]
    pub none: Vec<Route>,
    #[serde(default)]
    pub filesystem: Vec<Route>,
    #[serde(default)]
    pub rewrite: Vec<Route>,
    #[serde(default)]
    pub resource: Vec<Route>,
    #[serde(default)]
    pub miss: Vec<Route>,
    #[serde(default)]
    pub hit: Vec<Route>,
    #[serde(default)]
    pub error: Vec<Route>,
}

impl PhaseRoutes {
    pub fn get(&self, phase: Phase) -> &[Route] {
        match phase {
            Phase::None => &self.none,
            Phase::Filesystem => &self.filesystem,
            Phase::Rewrite => &self.rewrite,
            Phase::Resource => &self.resource,
            Phase::Miss => &self.miss,
            Phase::Hit => &self.hit,
            Phase::Error => &self.error,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut Vec<Route> {
        match phase {
            Phase::None => &mut self.none,
            Phase::Filesystem => &mut self.filesystem,
            Phase::Rewrite => &mut self.rewrite,
            Phase::Resource => &mut self.resource,
            Phase::Miss => &mut self.miss,
            Phase::Hit => &mut self.hit,
            Phase::Error => &mut self.error,
        }
    }

    /// Every route with the phase it belongs to, in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &Route)> {
        Phase::ALL
            .into_iter()
            .flat_map(move |phase| self.get(phase).iter().map(move |route| (phase, route)))
    }

    /// Build grouped routes from the flat Vercel form.
    pub fn from_flat(entries: Vec<FlatEntry>) -> Self {
        let mut routes = PhaseRoutes::default();
        let mut phase = Phase::None;
        for entry in entries {
            match entry {
                FlatEntry::Handle { handle } => phase = handle,
                FlatEntry::Route(route) => routes.get_mut(phase).push(route),
            }
        }
        routes
    }
}

/// One element of the flat route list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlatEntry {
    Handle { handle: Phase },
    Route(Route),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRoutes {
    Flat(Vec<FlatEntry>),
    Grouped(GroupedRoutes),
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GroupedRoutes {
    none: Vec<Route>,
    filesystem: Vec<Route>,
    rewrite: Vec<Route>,
    resource: Vec<Route>,
    miss: Vec<Route>,
    hit: Vec<Route>,
    error: Vec<Route>,
}

impl From<RawRoutes> for PhaseRoutes {
    fn from(raw: RawRoutes) -> Self {
        match raw {
            RawRoutes::Flat(entries) => PhaseRoutes::from_flat(entries),
            RawRoutes::Grouped(g) => PhaseRoutes {
                none: g.none,
                filesystem: g.filesystem,
                rewrite: g.rewrite,
                resource: g.resource,
                miss: g.miss,
                hit: g.hit,
                error: g.error,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Per-domain value substituted for `$wildcard` in route destinations.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WildcardConfig {
    pub domain: String,
    pub value: String,
}

/// Image optimization settings (`next.config.js` `images`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagesConfig {
    #[serde(default)]
    pub sizes: Vec<u32>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub remote_patterns: Vec<RemotePattern>,
    #[serde(default, rename = "minimumCacheTTL", skip_serializing_if = "Option::is_none")]
    pub minimum_cache_ttl: Option<u64>,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default, rename = "dangerouslyAllowSVG")]
    pub dangerously_allow_svg: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_security_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_disposition_type: Option<String>,
}

/// Allowed remote image source. `hostname`, `port` and `pathname` are
/// regular expressions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RemotePattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pathname: Option<String>,
}
