//! Outbound fetch used by the router and by in-process functions.
//!
//! Before touching the network, two kinds of URL are served locally:
//! - `blob:<name>`: a bundled binary asset
//! - the internal suspense cache host: the configured cache store

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderValue, Response, StatusCode};
use bytes::Bytes;
use thiserror::Error;

use crate::http::request::EdgeRequest;
use crate::runtime::cache::{handle_suspense_cache_request, SuspenseCacheStore};

/// Hostname reserved for the suspense cache sub-protocol.
pub const SUSPENSE_CACHE_HOSTNAME: &str = "INTERNAL_SUSPENSE_CACHE_HOSTNAME.local";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network fetch of {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read blob {name:?}: {source}")]
    Blob {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct EdgeFetch {
    client: reqwest::Client,
    blobs: HashMap<String, Bytes>,
    cache: Option<Arc<dyn SuspenseCacheStore>>,
}

impl EdgeFetch {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            blobs: HashMap::new(),
            cache: None,
        }
    }

    pub fn with_blob(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.blobs.insert(name.into(), data.into());
        self
    }

    /// Load a blob from disk.
    pub fn with_blob_file(self, name: impl Into<String>, path: &Path) -> Result<Self, FetchError> {
        let name = name.into();
        let data = std::fs::read(path).map_err(|source| FetchError::Blob {
            name: name.clone(),
            source,
        })?;
        Ok(self.with_blob(name, data))
    }

    pub fn with_cache(mut self, cache: Arc<dyn SuspenseCacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&Arc<dyn SuspenseCacheStore>> {
        self.cache.as_ref()
    }

    /// Whether `request` targets the suspense cache host.
    pub fn is_suspense_cache_request(request: &EdgeRequest) -> bool {
        request
            .url
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(SUSPENSE_CACHE_HOSTNAME))
    }

    pub async fn fetch(&self, request: EdgeRequest) -> Result<Response<Body>, FetchError> {
        if request.url.scheme() == "blob" {
            return Ok(self.fetch_blob(request.url.path()));
        }

        if Self::is_suspense_cache_request(&request) {
            return Ok(match &self.cache {
                Some(cache) => handle_suspense_cache_request(cache.clone(), request).await,
                None => status_response(StatusCode::NOT_FOUND),
            });
        }

        self.fetch_network(request).await
    }

    fn fetch_blob(&self, name: &str) -> Response<Body> {
        let Some(data) = self.blobs.get(name) else {
            tracing::warn!(blob = %name, "Unknown blob requested");
            return status_response(StatusCode::NOT_FOUND);
        };

        let mut response = Response::new(Body::from(data.clone()));
        let mime = mime_guess::from_path(name).first_or_octet_stream();
        if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
            response.headers_mut().insert(CONTENT_TYPE, value);
        }
        response
    }

    async fn fetch_network(&self, request: EdgeRequest) -> Result<Response<Body>, FetchError> {
        let url = request.url.to_string();
        let mut headers = request.headers;
        headers.remove(HOST);

        let network_error = |source: reqwest::Error| FetchError::Network {
            url: url.clone(),
            source,
        };

        let upstream = self
            .client
            .request(request.method, request.url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(network_error)?;

        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = upstream.bytes().await.map_err(network_error)?;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

impl std::fmt::Debug for EdgeFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeFetch")
            .field("blobs", &self.blobs.keys().collect::<Vec<_>>())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

pub(crate) fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cache::MemoryCacheStore;

    #[tokio::test]
    async fn test_blob_served_locally() {
        let fetch = EdgeFetch::new(reqwest::Client::new()).with_blob("logo.png", &b"\x89PNG"[..]);
        let response = fetch.fetch(EdgeRequest::get("blob:logo.png").unwrap()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "image/png");

        let missing = fetch.fetch(EdgeRequest::get("blob:missing.png").unwrap()).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_suspense_cache_host_is_local() {
        let fetch = EdgeFetch::new(reqwest::Client::new()).with_cache(Arc::new(MemoryCacheStore::new()));
        let request = EdgeRequest::get(&format!(
            "https://{SUSPENSE_CACHE_HOSTNAME}/v1/suspense-cache/missing-key"
        ))
        .unwrap();

        assert!(EdgeFetch::is_suspense_cache_request(&request));
        let response = fetch.fetch(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
