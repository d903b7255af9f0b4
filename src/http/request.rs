//! Request handling and transformation.
//!
//! # Responsibilities
//! - Attach a unique request ID (UUID v4) and echo it on the response
//! - Buffer the inbound body once (bounded) so middleware and functions can
//!   each receive a copy
//! - Reconstruct the absolute request URL routing decisions are made against
//! - Synthesize outbound requests for functions, middleware and assets
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The routing engine mutates `EdgeRequest::headers`; what middleware
//!   overrides is what downstream functions see

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName, Method, Request};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use thiserror::Error;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use url::Url;

/// Request ID header name.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer that assigns a request ID to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer that copies the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Access to the request ID assigned by [`set_request_id_layer`].
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> &str {
        self.headers().request_id()
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("failed to read request body: {0}")]
    Body(String),
    #[error("cannot build request url: {0}")]
    Url(String),
    #[error("cannot build outbound request: {0}")]
    Build(#[from] axum::http::Error),
}

/// The buffered, mutable request seen by the routing engine.
#[derive(Debug, Clone)]
pub struct EdgeRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl EdgeRequest {
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// A bodiless `GET` for `url`; convenient for tests and the CLI.
    pub fn get(url: &str) -> Result<Self, RequestError> {
        let url = Url::parse(url).map_err(|e| RequestError::Url(e.to_string()))?;
        Ok(Self::new(Method::GET, url, HeaderMap::new(), Bytes::new()))
    }

    /// Buffer an inbound server request.
    ///
    /// The URL is rebuilt from the `Host` header (falling back to
    /// `localhost`) and `x-forwarded-proto` (falling back to `http`).
    pub async fn from_request(request: Request<Body>, max_body_bytes: usize) -> Result<Self, RequestError> {
        let (parts, body) = request.into_parts();

        let scheme = parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .filter(|proto| *proto == "https" || *proto == "http")
            .unwrap_or("http");
        let host = parts
            .uri
            .authority()
            .map(|a| a.as_str())
            .or_else(|| parts.headers.get(HOST).and_then(|v| v.to_str().ok()))
            .unwrap_or("localhost");
        let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());

        let url = Url::parse(&format!("{scheme}://{host}{path_and_query}"))
            .map_err(|e| RequestError::Url(e.to_string()))?;

        let body = axum::body::to_bytes(body, max_body_bytes)
            .await
            .map_err(|e| {
                let inner = e.into_inner();
                if inner.downcast_ref::<LengthLimitError>().is_some() {
                    RequestError::BodyTooLarge(max_body_bytes)
                } else {
                    RequestError::Body(inner.to_string())
                }
            })?;

        Ok(Self::new(parts.method, url, parts.headers, body))
    }

    /// Clone this request with a different URL.
    pub fn with_url(&self, url: Url) -> Self {
        Self {
            url,
            ..self.clone()
        }
    }

    /// Build an outbound `http` request carrying this request's method,
    /// headers and body.
    pub fn to_http_request(&self) -> Result<Request<Body>, RequestError> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers.clone();
            // Framing follows the buffered body, not whatever middleware merged in.
            headers.remove(CONTENT_LENGTH);
            headers.remove(TRANSFER_ENCODING);
        }
        Ok(builder.body(Body::from(self.body.clone()))?)
    }
}
