//! Suspense cache backend and its HTTP sub-protocol.
//!
//! Served under the internal hostname:
//! - `GET  /v1/suspense-cache/<key>`: 200 JSON entry, or 404
//! - `POST /v1/suspense-cache/<key>`: persist in the background, 200
//! - `GET  /v1/suspense-cache/revalidate?tags=a,b`: revalidate tags, 200

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Response, StatusCode};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::request::EdgeRequest;
use crate::http::search_params::SearchParams;

const PREFIX: &str = "/v1/suspense-cache/";
const REVALIDATE_PATH: &str = "/v1/suspense-cache/revalidate";

/// A stored incremental cache value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: Value,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
}

impl CacheEntry {
    /// Tags stored with the value under `data.tags`.
    pub fn tags(&self) -> Vec<String> {
        self.value
            .pointer("/data/tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait SuspenseCacheStore: Send + Sync {
    /// Fetch an entry unless one of its tags, or one of `soft_tags`, was
    /// revalidated after it was written.
    async fn get(&self, key: &str, soft_tags: &[String]) -> Option<CacheEntry>;

    async fn set(&self, key: &str, value: Value);

    async fn revalidate_tag(&self, tag: &str);
}

/// In-process store: entries plus the last revalidation time of each tag.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
    revalidated_at: DashMap<String, i64>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SuspenseCacheStore for MemoryCacheStore {
    async fn get(&self, key: &str, soft_tags: &[String]) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?.clone();
        let written = entry.last_modified.unwrap_or_else(|| Utc::now().timestamp_millis());

        let stale = entry
            .tags()
            .iter()
            .chain(soft_tags)
            .filter_map(|tag| self.revalidated_at.get(tag).map(|at| *at))
            .any(|at| at >= written);

        (!stale).then_some(entry)
    }

    async fn set(&self, key: &str, value: Value) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                last_modified: Some(Utc::now().timestamp_millis()),
            },
        );
    }

    async fn revalidate_tag(&self, tag: &str) {
        self.revalidated_at
            .insert(tag.to_string(), Utc::now().timestamp_millis());
    }
}

/// Serve one suspense cache request.
pub async fn handle_suspense_cache_request(
    store: Arc<dyn SuspenseCacheStore>,
    request: EdgeRequest,
) -> Response<Body> {
    match serve(store, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Error handling suspense cache request");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Error handling cache request")
        }
    }
}

async fn serve(store: Arc<dyn SuspenseCacheStore>, request: EdgeRequest) -> Result<Response<Body>, serde_json::Error> {
    let path = request.url.path();

    if path == REVALIDATE_PATH {
        let params = SearchParams::from_url(&request.url);
        for tag in params.get("tags").unwrap_or_default().split(',').filter(|t| !t.is_empty()) {
            store.revalidate_tag(tag).await;
        }
        return Ok(plain(StatusCode::OK, ""));
    }

    let Some(key) = path.strip_prefix(PREFIX) else {
        return Ok(plain(StatusCode::NOT_FOUND, ""));
    };
    if key.is_empty() {
        return Ok(plain(StatusCode::BAD_REQUEST, "Invalid cache key"));
    }

    match request.method {
        Method::GET => {
            let soft_tags = header_tags(&request, "x-next-cache-soft-tags");
            let Some(entry) = store.get(key, &soft_tags).await else {
                return Ok(plain(StatusCode::NOT_FOUND, ""));
            };

            let age_secs = entry
                .last_modified
                .map_or(0, |at| (Utc::now().timestamp_millis() - at).max(0) / 1000);
            let body = serde_json::to_vec(&entry)?;

            let mut response = Response::new(Body::from(body));
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert("x-vercel-cache-state", HeaderValue::from_static("fresh"));
            headers.insert(header::AGE, HeaderValue::from(age_secs));
            Ok(response)
        }
        Method::POST => {
            let mut value: Value = serde_json::from_slice(&request.body)?;
            if value.pointer("/data/tags").is_none() {
                let tags = header_tags(&request, "x-next-cache-tags");
                if let Some(data) = value.get_mut("data").and_then(Value::as_object_mut) {
                    data.insert("tags".into(), Value::from(tags));
                }
            }

            let key = key.to_string();
            tokio::spawn(async move {
                store.set(&key, value).await;
            });
            Ok(plain(StatusCode::OK, ""))
        }
        _ => Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "")),
    }
}

fn header_tags(request: &EdgeRequest, name: &str) -> Vec<String> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
