//! Top-level routing orchestration.

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::HeaderMap;
use serde::Serialize;

use crate::http::request::EdgeRequest;
use crate::http::search_params::SearchParams;
use crate::manifest::Deployment;
use crate::routing::matcher::{MatchStatus, RouteHeaders, RoutesMatcher};
use crate::routing::Phase;
use crate::runtime::RuntimeEnv;

/// Final routing state, ready to be materialized into a response.
#[derive(Debug, Default)]
pub struct ResolvedState {
    pub path: String,
    pub status: Option<u16>,
    pub headers: RouteHeaders,
    pub search_params: SearchParams,
    /// A terminal body produced by middleware.
    pub body: Option<Body>,
}

impl ResolvedState {
    pub fn summary(&self) -> ResolvedSummary {
        ResolvedSummary {
            path: self.path.clone(),
            status: self.status,
            headers: header_summary(&self.headers.normal),
            important_headers: header_summary(&self.headers.important),
            middleware_location: self.headers.middleware_location.clone(),
            search_params: self.search_params.to_string(),
            has_body: self.body.is_some(),
        }
    }
}

/// Serializable view of a [`ResolvedState`].
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSummary {
    pub path: String,
    pub status: Option<u16>,
    pub headers: BTreeMap<String, Vec<String>>,
    pub important_headers: BTreeMap<String, Vec<String>>,
    pub middleware_location: Option<String>,
    pub search_params: String,
    pub has_body: bool,
}

fn header_summary(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut summary: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        summary
            .entry(name.to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    summary
}

/// Route `request` through the deployment.
///
/// A run that errors, or ends with a status of 400 or more, is retried once
/// from the `error` phase.
pub async fn handle_request(deployment: &Deployment, env: &RuntimeEnv, request: &mut EdgeRequest) -> ResolvedState {
    let mut matcher = RoutesMatcher::new(deployment, env, request);

    let result = matcher.run(Phase::None).await;
    if result == MatchStatus::Error || matcher.status.is_some_and(|status| status >= 400) {
        tracing::debug!(path = %matcher.path, status = ?matcher.status, "Retrying from the error phase");
        if matcher.run(Phase::Error).await == MatchStatus::Error {
            tracing::warn!(path = %matcher.path, "Error phase failed");
        }
    }

    let (path, status, headers, search_params, body) = matcher.into_parts();
    ResolvedState {
        path,
        status,
        headers,
        search_params,
        body,
    }
}
