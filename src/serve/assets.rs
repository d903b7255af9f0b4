//! Static asset fetchers.
//!
//! `static` and `override` build output items are served from a local
//! directory or an upstream origin. A missing asset is a `404` response,
//! not an error.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderValue, Response, StatusCode};
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

use crate::http::request::EdgeRequest;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read asset {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("asset origin request failed: {0}")]
    Origin(#[from] reqwest::Error),
    #[error("invalid asset url: {0}")]
    Url(#[from] url::ParseError),
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the asset at `request.url`'s path.
    async fn fetch(&self, request: &EdgeRequest) -> Result<Response<Body>, AssetError>;
}

/// Serves assets from a local directory.
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a URL path onto the root, rejecting traversal outside it.
    fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let decoded = percent_decode_str(url_path).decode_utf8().ok()?;
        let relative = Path::new(decoded.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }

        let path = self.root.join(relative);
        if decoded.ends_with('/') || path.is_dir() {
            Some(path.join("index.html"))
        } else {
            Some(path)
        }
    }
}

#[async_trait]
impl AssetFetcher for DirAssets {
    async fn fetch(&self, request: &EdgeRequest) -> Result<Response<Body>, AssetError> {
        let Some(path) = self.resolve(request.url.path()) else {
            tracing::warn!(path = %request.url.path(), "Rejected asset path");
            return Ok(not_found());
        };

        // `/about` is also served from `about.html`.
        let candidates = if path.extension().is_some() {
            vec![path]
        } else {
            let html = path.with_extension("html");
            vec![path, html]
        };
        for path in candidates {
            match tokio::fs::read(&path).await {
                Ok(data) => return Ok(asset_response(&path.to_string_lossy(), Bytes::from(data))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(AssetError::Io { path, source }),
            }
        }
        Ok(not_found())
    }
}

/// Proxies asset requests to an upstream origin.
#[derive(Debug, Clone)]
pub struct OriginAssets {
    base: Url,
    client: reqwest::Client,
}

impl OriginAssets {
    pub fn new(base: Url, client: reqwest::Client) -> Self {
        Self { base, client }
    }
}

#[async_trait]
impl AssetFetcher for OriginAssets {
    async fn fetch(&self, request: &EdgeRequest) -> Result<Response<Body>, AssetError> {
        let mut url = self.base.join(request.url.path())?;
        url.set_query(request.url.query());

        let mut headers = request.headers.clone();
        headers.remove(HOST);

        let upstream = self.client.get(url).headers(headers).send().await?;
        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = upstream.bytes().await?;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// No asset source configured: everything is a 404.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

#[async_trait]
impl AssetFetcher for NoAssets {
    async fn fetch(&self, _request: &EdgeRequest) -> Result<Response<Body>, AssetError> {
        Ok(not_found())
    }
}

/// Assets held in memory, keyed by URL path.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: HashMap<String, Bytes>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.files.insert(path.into(), data.into());
        self
    }
}

#[async_trait]
impl AssetFetcher for MemoryAssets {
    async fn fetch(&self, request: &EdgeRequest) -> Result<Response<Body>, AssetError> {
        let path = request.url.path();
        Ok(match self.files.get(path) {
            Some(data) => asset_response(path, data.clone()),
            None => not_found(),
        })
    }
}

fn asset_response(name: &str, data: Bytes) -> Response<Body> {
    let mut response = Response::new(Body::from(data));
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::from("Not Found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
