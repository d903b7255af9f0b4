//! Route matching engine.
//!
//! # Responsibilities
//! - Hold the mutable per-request routing state (path, status, headers,
//!   query, body)
//! - Match single routes, including `has`/`missing` conditions
//! - Apply overrides, locale redirects, headers, status and destinations
//! - Invoke middleware and absorb its response
//! - Drive the phase state machine with a hard iteration cap
//!
//! # Design Decisions
//! - Phase transitions run in an explicit loop; a `check` route that needs
//!   another phase ends the current pass and hands over to that phase
//! - Middleware runs at most once per middleware path within one phase pass
//! - The loop cap turns a self-referential route table into a 500

use std::collections::HashMap;
use std::sync::LazyLock;

use axum::body::Body;
use axum::http::header::{COOKIE, LOCATION};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response};
use regex::Regex;
use url::Url;

use crate::http::cookies::parse_cookies;
use crate::http::headers::{apply_header_map, apply_route_headers, joined_value};
use crate::http::request::EdgeRequest;
use crate::http::search_params::{apply_search_params, SearchParams};
use crate::manifest::{BuildOutputItem, Deployment, Route, WildcardConfig};
use crate::observability::metrics;
use crate::pattern::{apply_pcre_matches, PcreMatch};
use crate::routing::conditions::{has_field, ConditionInput};
use crate::routing::locale::{locale_friendly_src, preferred_redirect, strip_locale_prefix};
use crate::routing::Phase;
use crate::runtime::RuntimeEnv;
use crate::serve::materialize::run_or_fetch_build_output_item;

/// Phase passes allowed per `run` before routing is declared a loop.
pub const MAX_PHASE_CHECKS: usize = 50;

const OVERRIDE_HEADERS: &str = "x-middleware-override-headers";
const REQUEST_HEADER_PREFIX: &str = "x-middleware-request-";
const MIDDLEWARE_REWRITE: &str = "x-middleware-rewrite";
const MIDDLEWARE_NEXT: &str = "x-middleware-next";

static INTERCEPT_ROUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\(\.+\))+").expect("valid intercept pattern"));
static INDEX_RSC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/index\.rsc$").expect("valid index rsc pattern"));
static INDEX_ROUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^/(?:index)?$").expect("valid index pattern"));
static PREFETCH_INDEX_RSC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^/__index\.prefetch\.rsc$").expect("valid prefetch pattern"));
static RSC_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.rsc").expect("valid rsc pattern"));

/// Whether `path` is an absolute `http(s)` URL (a cross-origin rewrite).
pub fn is_absolute_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Response headers accumulated while routing.
#[derive(Debug, Clone, Default)]
pub struct RouteHeaders {
    pub normal: HeaderMap,
    /// Wins over everything else in the final merge.
    pub important: HeaderMap,
    /// `location` set by middleware, kept apart from later redirects.
    pub middleware_location: Option<String>,
}

/// Result of checking one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Skip,
    Next,
    Done,
    Error,
    /// Leave the current phase pass and continue at the given phase.
    Jump(Phase),
}

/// Result of a full routing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Done,
    Error,
}

enum PhaseStep {
    Continue(Phase),
    Finished(MatchStatus),
}

pub struct RoutesMatcher<'a> {
    deployment: &'a Deployment,
    env: &'a RuntimeEnv,
    request: &'a mut EdgeRequest,
    url: Url,
    cookies: HashMap<String, String>,
    wildcard: Option<&'a WildcardConfig>,
    pub path: String,
    pub status: Option<u16>,
    pub headers: RouteHeaders,
    pub search_params: SearchParams,
    pub body: Option<Body>,
    counter: usize,
    middleware_invoked: Vec<String>,
}

impl<'a> RoutesMatcher<'a> {
    pub fn new(deployment: &'a Deployment, env: &'a RuntimeEnv, request: &'a mut EdgeRequest) -> Self {
        let url = request.url.clone();
        let cookie_header = request
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");
        let cookies = parse_cookies(&cookie_header);

        let mut search_params = SearchParams::new();
        apply_search_params(&mut search_params, &SearchParams::from_url(&url));

        let wildcard = deployment
            .wildcard()
            .iter()
            .find(|w| url.host_str() == Some(w.domain.as_str()));

        let path = match url.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };

        Self {
            deployment,
            env,
            request,
            url,
            cookies,
            wildcard,
            path,
            status: None,
            headers: RouteHeaders::default(),
            search_params,
            body: None,
            counter: 0,
            middleware_invoked: Vec::new(),
        }
    }

    pub fn request(&self) -> &EdgeRequest {
        self.request
    }

    /// Match `route` against the current state. Returns the source match and
    /// the destination, possibly rewritten by a condition.
    fn check_route_match(
        &self,
        route: &Route,
        check_status: bool,
        check_intercept: bool,
    ) -> Option<(PcreMatch, Option<String>)> {
        let matched = match self
            .env
            .patterns()
            .match_pcre(&route.src, Some(&self.path), route.case_sensitive)
        {
            Ok(matched) => matched?,
            Err(e) => {
                tracing::warn!(src = %route.src, error = %e, "Skipping route with invalid pattern");
                return None;
            }
        };

        if let Some(methods) = &route.methods {
            let method = self.request.method.as_str();
            if !methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
                return None;
            }
        }

        let mut route_dest = route.dest.clone();
        for condition in route.has.iter().flatten() {
            let input = ConditionInput {
                url: &self.url,
                cookies: &self.cookies,
                headers: &self.request.headers,
                route_dest: route_dest.as_deref(),
            };
            let result = has_field(condition, &input, self.env.patterns());
            if let Some(dest) = result.new_route_dest {
                route_dest = Some(dest);
            }
            if !result.valid {
                return None;
            }
        }

        let input = ConditionInput {
            url: &self.url,
            cookies: &self.cookies,
            headers: &self.request.headers,
            route_dest: route_dest.as_deref(),
        };
        if route
            .missing
            .iter()
            .flatten()
            .any(|condition| has_field(condition, &input, self.env.patterns()).valid)
        {
            return None;
        }

        if check_status && route.status != self.status {
            return None;
        }

        if check_intercept {
            if let Some(dest) = &route.dest {
                if INTERCEPT_ROUTE.is_match(dest) && !INTERCEPT_ROUTE.is_match(&self.path) {
                    return None;
                }
            }
        }

        Some((matched, route_dest))
    }

    fn apply_route_overrides(&mut self, route: &Route) {
        if !route.override_ {
            return;
        }
        self.status = None;
        self.headers.normal = HeaderMap::new();
        self.headers.important = HeaderMap::new();
    }

    fn apply_locale_redirects(&mut self, route: &Route) {
        let Some(locale) = &route.locale else {
            return;
        };
        let Some(redirects) = &locale.redirect else {
            return;
        };

        let src_is_regex = route.src.starts_with('^');
        if !src_is_regex && route.src != self.path {
            return;
        }
        if self.headers.normal.contains_key(LOCATION) {
            return;
        }

        let cookie_value = locale
            .cookie
            .as_ref()
            .and_then(|name| self.cookies.get(name))
            .map(String::as_str);
        let accept_language = joined_value(&self.request.headers, "accept-language");

        let Some(target) = preferred_redirect(redirects, cookie_value, accept_language.as_deref()) else {
            return;
        };
        if self.path.starts_with(target) {
            return;
        }
        match HeaderValue::from_str(target) {
            Ok(value) => {
                self.headers.normal.insert(LOCATION, value);
                self.status = Some(307);
            }
            Err(_) => tracing::warn!(target = %target, "Skipping invalid locale redirect"),
        }
    }

    /// Run the middleware at `path`. Returns false when routing should stop
    /// with an error.
    async fn run_route_middleware(&mut self, path: Option<&str>) -> bool {
        let Some(path) = path else {
            return true;
        };

        let item = self.deployment.output().get(path);
        if !item.is_some_and(BuildOutputItem::is_middleware) {
            tracing::error!(middleware = %path, "Route references a missing middleware");
            self.status = Some(500);
            return false;
        }

        let response =
            run_or_fetch_build_output_item(self.env, item, &*self.request, &self.path, &self.search_params)
                .await;
        self.middleware_invoked.push(path.to_string());

        if response.status().as_u16() == 500 {
            metrics::record_middleware(path, "error");
            self.status = Some(500);
            return false;
        }
        metrics::record_middleware(path, "ok");
        self.process_middleware_resp(response);
        true
    }

    /// Absorb a middleware response into the routing state.
    pub fn process_middleware_resp(&mut self, response: Response<Body>) {
        let (parts, body) = response.into_parts();
        let mut headers = parts.headers;

        if let Some(overridden) = header_string(&headers, OVERRIDE_HEADERS) {
            let mut keys: Vec<String> = overridden
                .split(',')
                .map(|key| key.trim().to_ascii_lowercase())
                .filter(|key| !key.is_empty())
                .collect();
            keys.dedup();

            for key in keys {
                let value_key = format!("{REQUEST_HEADER_PREFIX}{key}");
                let value = headers.get(value_key.as_str()).cloned();
                if let Ok(name) = HeaderName::from_bytes(key.as_bytes()) {
                    if self.request.headers.get(&name) != value.as_ref() {
                        match value {
                            Some(value) if !value.is_empty() => {
                                self.request.headers.insert(name, value);
                            }
                            _ => {
                                self.request.headers.remove(&name);
                            }
                        }
                    }
                }
                headers.remove(value_key.as_str());
            }
            headers.remove(OVERRIDE_HEADERS);
        }

        let rewrite = header_string(&headers, MIDDLEWARE_REWRITE);
        if let Some(rewrite) = &rewrite {
            match self.url.join(rewrite) {
                Ok(new_url) => {
                    let external = self.url.host_str() != new_url.host_str();
                    self.path = if external {
                        new_url.to_string()
                    } else {
                        new_url.path().to_string()
                    };
                    apply_search_params(&mut self.search_params, &SearchParams::from_url(&new_url));
                }
                Err(e) => tracing::warn!(rewrite = %rewrite, error = %e, "Ignoring invalid middleware rewrite"),
            }
            headers.remove(MIDDLEWARE_REWRITE);
        }

        let has_location = headers.contains_key(LOCATION);
        if headers.contains_key(MIDDLEWARE_NEXT) {
            headers.remove(MIDDLEWARE_NEXT);
        } else if rewrite.is_none() && !has_location {
            self.body = Some(body);
            self.status = Some(parts.status.as_u16());
        } else if has_location && parts.status.is_redirection() {
            if rewrite.is_some() {
                tracing::warn!(path = %self.path, "Middleware response both rewrites and redirects");
            }
            self.status = Some(parts.status.as_u16());
        }

        apply_header_map(&mut self.request.headers, &headers);
        apply_header_map(&mut self.headers.normal, &headers);
        self.headers.middleware_location = header_string(&self.headers.normal, LOCATION.as_str());
    }

    fn apply_route_headers(&mut self, route: &Route, matched: &PcreMatch) {
        let Some(headers) = &route.headers else {
            return;
        };
        apply_route_headers(&mut self.headers.normal, headers, Some(matched));
        if route.important {
            apply_route_headers(&mut self.headers.important, headers, Some(matched));
        }
    }

    fn apply_route_status(&mut self, route: &Route) {
        if let Some(status) = route.status {
            self.status = Some(status);
        }
    }

    /// Apply the destination and return the previous path.
    fn apply_route_dest(&mut self, dest: Option<&str>, matched: &PcreMatch) -> String {
        let prev_path = self.path.clone();
        let Some(dest) = dest else {
            return prev_path;
        };

        let dest = match self.wildcard {
            Some(wildcard) if dest.contains("$wildcard") => dest.replace("$wildcard", &wildcard.value),
            _ => dest.to_string(),
        };
        self.path = apply_pcre_matches(&dest, matched, false);

        // Rewrites to `/index.rsc` only apply to the index route itself.
        if INDEX_RSC.is_match(&self.path)
            && !INDEX_ROUTE.is_match(&prev_path)
            && !PREFETCH_INDEX_RSC.is_match(&prev_path)
        {
            self.path = prev_path.clone();
        }

        let is_rsc = self.path.to_ascii_lowercase().ends_with(".rsc");
        let is_prefetch_rsc = self.path.to_ascii_lowercase().ends_with(".prefetch.rsc");
        if is_rsc && !is_prefetch_rsc && !self.deployment.output().contains(&self.path) {
            self.path = RSC_SUFFIX.replace(&self.path, "").into_owned();
        }

        match self.url.join(&self.path) {
            Ok(dest_url) => {
                apply_search_params(&mut self.search_params, &SearchParams::from_url(&dest_url));
                if !is_absolute_url(&self.path) {
                    self.path = dest_url.path().to_string();
                }
            }
            Err(e) => tracing::warn!(dest = %self.path, error = %e, "Route destination is not a valid URL"),
        }

        prev_path
    }

    async fn check_route(&mut self, phase: Phase, raw_route: &Route) -> RouteOutcome {
        let friendly;
        let route = match phase {
            Phase::Miss => match locale_friendly_src(&raw_route.src, self.deployment.locales()) {
                Some(src) => {
                    friendly = Route {
                        src,
                        ..raw_route.clone()
                    };
                    &friendly
                }
                None => raw_route,
            },
            _ => raw_route,
        };

        let Some((matched, route_dest)) =
            self.check_route_match(route, phase == Phase::Error, phase == Phase::Rewrite)
        else {
            return RouteOutcome::Skip;
        };
        if let Some(middleware) = &route.middleware_path {
            if self.middleware_invoked.contains(middleware) {
                return RouteOutcome::Skip;
            }
        }

        tracing::debug!(phase = %phase, src = %route.src, path = %self.path, "Route matched");

        self.apply_route_overrides(route);
        self.apply_locale_redirects(route);

        if !self.run_route_middleware(route.middleware_path.as_deref()).await {
            return RouteOutcome::Error;
        }
        if self.body.is_some() || self.headers.middleware_location.is_some() {
            return RouteOutcome::Done;
        }

        self.apply_route_headers(route, &matched);
        self.apply_route_status(route);
        let prev_path = self.apply_route_dest(route_dest.as_deref(), &matched);

        if route.check && !is_absolute_url(&self.path) {
            if prev_path == self.path {
                if phase != Phase::Miss {
                    return RouteOutcome::Jump(phase.next());
                }
                self.status = Some(404);
            } else if phase == Phase::Miss {
                let output = self.deployment.output();
                let trimmed = self.path.strip_suffix('/').unwrap_or(&self.path);
                if !output.contains(&self.path) && !output.contains(trimmed) {
                    self.path = prev_path;
                }
            } else {
                return RouteOutcome::Jump(Phase::Filesystem);
            }
        }

        if !route.continue_ {
            return RouteOutcome::Done;
        }
        if route.status.is_some_and(|status| (300..=399).contains(&status)) {
            return RouteOutcome::Done;
        }
        RouteOutcome::Next
    }

    async fn check_phase(&mut self, phase: Phase) -> PhaseStep {
        if self.counter >= MAX_PHASE_CHECKS {
            tracing::error!(
                "Routing encountered an infinite loop while checking {}",
                self.url.path()
            );
            metrics::record_routing_loop();
            self.status = Some(500);
            return PhaseStep::Finished(MatchStatus::Error);
        }
        self.counter += 1;
        self.middleware_invoked.clear();

        let deployment = self.deployment;
        let mut should_continue = true;
        for route in deployment.routes().get(phase) {
            match self.check_route(phase, route).await {
                RouteOutcome::Error => return PhaseStep::Finished(MatchStatus::Error),
                RouteOutcome::Done => {
                    should_continue = false;
                    break;
                }
                RouteOutcome::Jump(next) => return PhaseStep::Continue(next),
                RouteOutcome::Skip | RouteOutcome::Next => {}
            }
        }

        if phase == Phase::Hit
            || is_absolute_url(&self.path)
            || self.headers.normal.contains_key(LOCATION)
            || self.body.is_some()
        {
            return PhaseStep::Finished(MatchStatus::Done);
        }

        let output = deployment.output();
        if phase == Phase::None {
            if let Some(path) = strip_locale_prefix(&self.path, deployment.locales(), output) {
                self.path = path;
            }
        }

        let mut exists = output.contains(&self.path);
        if !exists {
            if let Some(trimmed) = self.path.strip_suffix('/') {
                if output.contains(trimmed) {
                    self.path = trimmed.to_string();
                    exists = true;
                }
            }
        }

        if phase == Phase::Miss && !exists && !self.status.is_some_and(|status| status >= 400) {
            self.status = Some(404);
        }

        let next = if exists || phase == Phase::Miss || phase == Phase::Error {
            Phase::Hit
        } else if should_continue {
            phase.next()
        } else {
            Phase::Miss
        };
        PhaseStep::Continue(next)
    }

    /// Route starting at `phase`.
    pub async fn run(&mut self, phase: Phase) -> MatchStatus {
        self.counter = 0;

        let mut phase = phase;
        let result = loop {
            match self.check_phase(phase).await {
                PhaseStep::Continue(next) => {
                    tracing::debug!(from = %phase, to = %next, path = %self.path, "Phase transition");
                    phase = next;
                }
                PhaseStep::Finished(status) => break status,
            }
        };

        if self.headers.normal.contains_key(LOCATION)
            && !self.status.is_some_and(|status| (300..400).contains(&status))
        {
            self.status = Some(307);
        }
        result
    }

    pub(crate) fn into_parts(self) -> (String, Option<u16>, RouteHeaders, SearchParams, Option<Body>) {
        (self.path, self.status, self.headers, self.search_params, self.body)
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};

    use crate::manifest::{BuildOutput, RoutesManifest};
    use crate::runtime::{EdgeFetch, FunctionRegistry};
    use crate::serve::NoAssets;

    fn deployment(manifest: &str, output: &str) -> Deployment {
        let manifest: RoutesManifest = serde_json::from_str(manifest).unwrap();
        let output: BuildOutput = serde_json::from_str(output).unwrap();
        Deployment::new(manifest, output)
    }

    fn env() -> RuntimeEnv {
        RuntimeEnv::new(
            FunctionRegistry::new(),
            Arc::new(NoAssets),
            EdgeFetch::new(reqwest::Client::new()),
        )
    }

    async fn resolve(deployment: &Deployment, mut request: EdgeRequest) -> (String, Option<u16>) {
        let env = env();
        let mut matcher = RoutesMatcher::new(deployment, &env, &mut request);
        matcher.run(Phase::None).await;
        (matcher.path.clone(), matcher.status)
    }

    fn route(json: &str) -> Route {
        serde_json::from_str(json).unwrap()
    }

    fn middleware_response(status: u16, headers: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from("from middleware")).unwrap()
    }

    #[test]
    fn test_is_absolute_url() {
        assert!(is_absolute_url("https://other.test/foo"));
        assert!(is_absolute_url("http://other.test"));
        assert!(!is_absolute_url("/foo"));
        assert!(!is_absolute_url("blob:logo.png"));
    }

    #[test]
    fn test_middleware_overrides_request_headers() {
        let deployment = Deployment::default();
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/account").unwrap();
        request.headers.insert("x-user", HeaderValue::from_static("bob"));
        request.headers.insert("x-remove", HeaderValue::from_static("1"));

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        matcher.process_middleware_resp(middleware_response(
            200,
            &[
                (OVERRIDE_HEADERS, "x-user, x-remove"),
                ("x-middleware-request-x-user", "alice"),
                (MIDDLEWARE_NEXT, "1"),
            ],
        ));

        assert!(matcher.body.is_none());
        assert_eq!(matcher.status, None);
        assert!(matcher.headers.normal.get(OVERRIDE_HEADERS).is_none());
        assert!(matcher.headers.normal.get("x-middleware-request-x-user").is_none());
        assert!(matcher.headers.normal.get(MIDDLEWARE_NEXT).is_none());

        let headers = &matcher.request().headers;
        assert_eq!(headers["x-user"], "alice");
        assert!(headers.get("x-remove").is_none());
    }

    #[test]
    fn test_middleware_same_host_rewrite() {
        let deployment = Deployment::default();
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/old?page=2").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        matcher.process_middleware_resp(middleware_response(
            200,
            &[(MIDDLEWARE_REWRITE, "/products?sort=asc")],
        ));

        assert_eq!(matcher.path, "/products");
        assert_eq!(matcher.search_params.get("sort"), Some("asc"));
        assert_eq!(matcher.search_params.get("page"), Some("2"));
        assert!(matcher.body.is_none());
        assert!(matcher.headers.normal.get(MIDDLEWARE_REWRITE).is_none());
    }

    #[test]
    fn test_middleware_cross_origin_rewrite() {
        let deployment = Deployment::default();
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/old").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        matcher.process_middleware_resp(middleware_response(
            200,
            &[(MIDDLEWARE_REWRITE, "https://other-host/foo")],
        ));

        assert_eq!(matcher.path, "https://other-host/foo");
        assert!(is_absolute_url(&matcher.path));
    }

    #[test]
    fn test_middleware_redirect_is_remembered() {
        let deployment = Deployment::default();
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/account").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        matcher.process_middleware_resp(middleware_response(307, &[("location", "/login")]));

        assert_eq!(matcher.status, Some(307));
        assert!(matcher.body.is_none());
        assert_eq!(matcher.headers.middleware_location.as_deref(), Some("/login"));
        assert_eq!(matcher.headers.normal[LOCATION], "/login");
    }

    #[test]
    fn test_middleware_body_is_terminal() {
        let deployment = Deployment::default();
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/admin").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        matcher.process_middleware_resp(middleware_response(403, &[("x-reason", "blocked")]));

        assert_eq!(matcher.status, Some(StatusCode::FORBIDDEN.as_u16()));
        assert!(matcher.body.is_some());
        assert_eq!(matcher.headers.normal["x-reason"], "blocked");
    }

    #[tokio::test]
    async fn test_method_filter() {
        let deployment = deployment(
            r#"{"routes": {"none": [{"src": "^/form$", "methods": ["post"], "dest": "/submitted"}]}}"#,
            r#"{"/form": {"type": "static"}, "/submitted": {"type": "static"}}"#,
        );

        let get = EdgeRequest::get("https://shop.test/form").unwrap();
        assert_eq!(resolve(&deployment, get).await.0, "/form");

        let mut post = EdgeRequest::get("https://shop.test/form").unwrap();
        post.method = Method::POST;
        assert_eq!(resolve(&deployment, post).await.0, "/submitted");
    }

    #[tokio::test]
    async fn test_missing_condition_rejects_route() {
        let deployment = deployment(
            r#"{"routes": {"none": [{
                "src": "^/account$",
                "dest": "/login",
                "missing": [{"type": "cookie", "key": "session"}]
            }]}}"#,
            r#"{"/account": {"type": "static"}, "/login": {"type": "static"}}"#,
        );

        let anonymous = EdgeRequest::get("https://shop.test/account").unwrap();
        assert_eq!(resolve(&deployment, anonymous).await.0, "/login");

        let mut signed_in = EdgeRequest::get("https://shop.test/account").unwrap();
        signed_in.headers.insert(COOKIE, HeaderValue::from_static("session=abc"));
        assert_eq!(resolve(&deployment, signed_in).await.0, "/account");
    }

    #[tokio::test]
    async fn test_rsc_suffix_dropped_unless_in_output() {
        let manifest = r#"{"routes": {"none": [{"src": "^/shop$", "dest": "/shop.rsc"}]}}"#;

        let without = deployment(manifest, r#"{"/shop": {"type": "static"}}"#);
        let request = EdgeRequest::get("https://shop.test/shop").unwrap();
        assert_eq!(resolve(&without, request).await.0, "/shop");

        let with = deployment(manifest, r#"{"/shop.rsc": {"type": "static"}}"#);
        let request = EdgeRequest::get("https://shop.test/shop").unwrap();
        assert_eq!(resolve(&with, request).await.0, "/shop.rsc");
    }

    #[tokio::test]
    async fn test_index_rsc_only_for_index_route() {
        let deployment = deployment(
            r#"{"routes": {"none": [{"src": "^/(.*)$", "dest": "/index.rsc"}]}}"#,
            r#"{"/index.rsc": {"type": "static"}, "/cart": {"type": "static"}}"#,
        );

        let index = EdgeRequest::get("https://shop.test/").unwrap();
        assert_eq!(resolve(&deployment, index).await.0, "/index.rsc");

        let cart = EdgeRequest::get("https://shop.test/cart").unwrap();
        assert_eq!(resolve(&deployment, cart).await.0, "/cart");
    }

    #[tokio::test]
    async fn test_wildcard_destination() {
        let deployment = deployment(
            r#"{
                "wildcard": [{"domain": "shop.test", "value": "acme"}],
                "routes": {"none": [{"src": "^/(.*)$", "dest": "/$wildcard/$1"}]}
            }"#,
            r#"{"/acme/home": {"type": "static"}}"#,
        );

        let request = EdgeRequest::get("https://shop.test/home").unwrap();
        assert_eq!(resolve(&deployment, request).await.0, "/acme/home");
    }

    #[tokio::test]
    async fn test_intercepting_destination_needs_intercepted_path() {
        let deployment = deployment(
            r#"{"routes": {"rewrite": [
                {"src": "^/photo/(.*)$", "dest": "/(..)photo/$1"},
                {"src": "^/photo/(.*)$", "dest": "/photos/$1"}
            ]}}"#,
            r#"{"/photos/1": {"type": "static"}}"#,
        );

        let request = EdgeRequest::get("https://shop.test/photo/1").unwrap();
        assert_eq!(resolve(&deployment, request).await.0, "/photos/1");
    }

    #[tokio::test]
    async fn test_trailing_slash_retried_without_it() {
        let deployment = deployment(r#"{}"#, r#"{"/about": {"type": "static"}}"#);
        let request = EdgeRequest::get("https://shop.test/about/").unwrap();
        assert_eq!(resolve(&deployment, request).await, ("/about".to_string(), None));
    }

    #[tokio::test]
    async fn test_override_resets_status_and_headers() {
        let deployment = deployment(
            r#"{"routes": {"none": [
                {"src": "^/.*$", "headers": {"x-a": "1"}, "status": 418, "continue": true},
                {"src": "^/.*$", "override": true, "continue": true}
            ]}}"#,
            r#"{"/": {"type": "static"}}"#,
        );
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        assert_eq!(matcher.run(Phase::None).await, MatchStatus::Done);
        assert_eq!(matcher.status, None);
        assert!(matcher.headers.normal.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_path_is_404() {
        let deployment = deployment(r#"{}"#, r#"{"/": {"type": "static"}}"#);
        let request = EdgeRequest::get("https://shop.test/nope").unwrap();
        assert_eq!(resolve(&deployment, request).await, ("/nope".to_string(), Some(404)));
    }

    #[tokio::test]
    async fn test_missing_middleware_entry_is_error() {
        let deployment = deployment(
            r#"{"routes": {"none": [{"src": "^/.*$", "middlewarePath": "middleware", "continue": true}]}}"#,
            r#"{"/": {"type": "static"}}"#,
        );
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        assert_eq!(matcher.run(Phase::None).await, MatchStatus::Error);
        assert_eq!(matcher.status, Some(500));
    }

    #[tokio::test]
    async fn test_check_route_with_new_dest_jumps_to_filesystem() {
        let deployment = deployment(
            r#"{"routes": {"none": [
                {"src": "^/p/(.*)$", "dest": "/products/$1", "check": true, "continue": true},
                {"src": "^/products/(.*)$", "dest": "/elsewhere/$1"}
            ]}}"#,
            r#"{"/products/1": {"type": "static"}}"#,
        );
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/p/1").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        let check = route(r#"{"src": "^/p/(.*)$", "dest": "/products/$1", "check": true, "continue": true}"#);
        assert_eq!(matcher.check_route(Phase::None, &check).await, RouteOutcome::Jump(Phase::Filesystem));
        assert_eq!(matcher.path, "/products/1");

        let request = EdgeRequest::get("https://shop.test/p/1").unwrap();
        assert_eq!(resolve(&deployment, request).await, ("/products/1".to_string(), None));
    }

    #[tokio::test]
    async fn test_check_route_with_same_path_moves_to_next_phase() {
        let deployment = deployment(
            r#"{"routes": {
                "filesystem": [
                    {"src": "^/same$", "check": true, "continue": true},
                    {"src": "^/same$", "dest": "/skipped"}
                ],
                "rewrite": [{"src": "^/same$", "dest": "/found"}]
            }}"#,
            r#"{"/found": {"type": "static"}, "/skipped": {"type": "static"}}"#,
        );
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/same").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        let check = route(r#"{"src": "^/same$", "check": true, "continue": true}"#);
        assert_eq!(
            matcher.check_route(Phase::Filesystem, &check).await,
            RouteOutcome::Jump(Phase::Filesystem.next())
        );
        assert_eq!(matcher.path, "/same");
        assert_eq!(matcher.status, None);

        let request = EdgeRequest::get("https://shop.test/same").unwrap();
        assert_eq!(resolve(&deployment, request).await, ("/found".to_string(), None));
    }

    #[tokio::test]
    async fn test_miss_check_route_with_same_path_is_404() {
        let deployment = deployment(r#"{}"#, r#"{"/": {"type": "static"}}"#);
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/zzz").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        let check = route(r#"{"src": "^/zzz$", "check": true}"#);
        assert_eq!(matcher.check_route(Phase::Miss, &check).await, RouteOutcome::Done);
        assert_eq!(matcher.path, "/zzz");
        assert_eq!(matcher.status, Some(404));
    }

    #[tokio::test]
    async fn test_miss_dest_outside_output_keeps_previous_path() {
        let deployment = deployment(
            r#"{"routes": {"miss": [{"src": "^/(.*)$", "dest": "/missing/$1", "check": true}]}}"#,
            r#"{"/": {"type": "static"}}"#,
        );
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/zzz").unwrap();

        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        let check = route(r#"{"src": "^/(.*)$", "dest": "/missing/$1", "check": true}"#);
        assert_eq!(matcher.check_route(Phase::Miss, &check).await, RouteOutcome::Done);
        assert_eq!(matcher.path, "/zzz");

        let request = EdgeRequest::get("https://shop.test/zzz").unwrap();
        assert_eq!(resolve(&deployment, request).await, ("/zzz".to_string(), Some(404)));
    }

    #[tokio::test]
    async fn test_miss_locale_route_matches_bare_locale() {
        let deployment = deployment(
            r#"{"routes": {
                "none": [{"src": "^/$", "locale": {"redirect": {"en": "/", "fr": "/fr"}}, "continue": true}],
                "miss": [{"src": "^//?(?:en|fr)/(.*)$", "dest": "/$1", "check": true}]
            }}"#,
            r#"{"/": {"type": "static"}}"#,
        );

        let bare = EdgeRequest::get("https://shop.test/fr").unwrap();
        assert_eq!(resolve(&deployment, bare).await, ("/".to_string(), None));

        // Outside the miss phase the source is used as written.
        let env = env();
        let mut request = EdgeRequest::get("https://shop.test/fr").unwrap();
        let mut matcher = RoutesMatcher::new(&deployment, &env, &mut request);
        let locale_route = route(r#"{"src": "^//?(?:en|fr)/(.*)$", "dest": "/$1", "check": true}"#);
        assert_eq!(matcher.check_route(Phase::Rewrite, &locale_route).await, RouteOutcome::Skip);
    }
}
