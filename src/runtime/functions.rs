//! Function and middleware handlers.
//!
//! Entrypoints named by the build output are bound to handlers once, at
//! startup. A handler is anything implementing [`EdgeFunction`]; the
//! router ships [`UpstreamFunction`], which forwards to an HTTP server.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::HOST;
use axum::http::{HeaderValue, Request, Response, Uri, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::config::schema::FunctionsConfig;
use crate::runtime::fetch::EdgeFetch;
use crate::runtime::isolation::IsolatedScope;

#[derive(Debug, Error)]
pub enum FunctionError {
    /// The entrypoint has no callable handler.
    #[error("An error occurred while evaluating the target edge function ({0})")]
    NotAFunction(String),
    #[error("edge function {entrypoint} failed: {message}")]
    Failed { entrypoint: String, message: String },
    #[error("invalid upstream {0:?}")]
    InvalidUpstream(String),
}

/// What a handler sees besides the request.
#[derive(Debug, Clone)]
pub struct FunctionContext {
    entrypoint: String,
    scope: Arc<IsolatedScope>,
    fetch: Arc<EdgeFetch>,
}

impl FunctionContext {
    pub fn new(entrypoint: impl Into<String>, scope: Arc<IsolatedScope>, fetch: Arc<EdgeFetch>) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            scope,
            fetch,
        }
    }

    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    pub fn scope(&self) -> &IsolatedScope {
        &self.scope
    }

    /// Fetch bound to this handler's isolation scope.
    pub fn fetch(&self) -> &EdgeFetch {
        &self.fetch
    }
}

#[async_trait]
pub trait EdgeFunction: Send + Sync {
    async fn call(&self, request: Request<Body>, ctx: &FunctionContext) -> Result<Response<Body>, FunctionError>;
}

/// Adapts an async closure into an [`EdgeFunction`].
pub struct HandlerFn<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> EdgeFunction for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    async fn call(&self, request: Request<Body>, _ctx: &FunctionContext) -> Result<Response<Body>, FunctionError> {
        Ok((self.0)(request).await)
    }
}

/// Forwards the synthesized request to an upstream HTTP server.
#[derive(Clone)]
pub struct UpstreamFunction {
    base: String,
    client: Client<HttpConnector, Body>,
}

impl UpstreamFunction {
    pub fn new(base: &str, client: Client<HttpConnector, Body>) -> Result<Self, FunctionError> {
        let valid = base
            .parse::<Uri>()
            .is_ok_and(|uri| uri.scheme_str() == Some("http") && uri.authority().is_some());
        if !valid {
            return Err(FunctionError::InvalidUpstream(base.to_string()));
        }
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl EdgeFunction for UpstreamFunction {
    async fn call(&self, request: Request<Body>, ctx: &FunctionContext) -> Result<Response<Body>, FunctionError> {
        let (mut parts, body) = request.into_parts();

        let forwarded_host = parts
            .uri
            .authority()
            .map(|a| a.to_string())
            .or_else(|| parts.headers.get(HOST).and_then(|v| v.to_str().ok()).map(str::to_string));

        let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        let target = format!("{}{}", self.base, path_and_query);
        parts.uri = target
            .parse()
            .map_err(|_| FunctionError::InvalidUpstream(target.clone()))?;
        parts.version = Version::HTTP_11;
        parts.headers.remove(HOST);
        if let Some(value) = forwarded_host.and_then(|h| HeaderValue::from_str(&h).ok()) {
            parts.headers.insert("x-forwarded-host", value);
        }

        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|e| FunctionError::Failed {
                entrypoint: ctx.entrypoint().to_string(),
                message: e.to_string(),
            })?;

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

#[derive(Clone)]
struct Registered {
    handler: Arc<dyn EdgeFunction>,
    isolation: Option<String>,
}

/// Entrypoint → handler table, built once at startup.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Registered>,
    fallback: Option<Arc<dyn EdgeFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every configured upstream.
    pub fn from_config(config: &FunctionsConfig) -> Result<Self, FunctionError> {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let mut registry = Self::new();

        if let Some(upstream) = &config.default_upstream {
            registry.fallback = Some(Arc::new(UpstreamFunction::new(upstream, client.clone())?));
        }
        for route in &config.routes {
            let handler = UpstreamFunction::new(&route.upstream, client.clone())?;
            registry.functions.insert(
                route.entrypoint.clone(),
                Registered {
                    handler: Arc::new(handler),
                    isolation: route.isolation.clone(),
                },
            );
        }
        Ok(registry)
    }

    pub fn register(&mut self, entrypoint: impl Into<String>, handler: impl EdgeFunction + 'static) {
        self.functions.insert(
            entrypoint.into(),
            Registered {
                handler: Arc::new(handler),
                isolation: None,
            },
        );
    }

    /// Register a handler sharing the isolation scope `isolation`.
    pub fn register_isolated(
        &mut self,
        entrypoint: impl Into<String>,
        isolation: impl Into<String>,
        handler: impl EdgeFunction + 'static,
    ) {
        self.functions.insert(
            entrypoint.into(),
            Registered {
                handler: Arc::new(handler),
                isolation: Some(isolation.into()),
            },
        );
    }

    pub fn set_fallback(&mut self, handler: impl EdgeFunction + 'static) {
        self.fallback = Some(Arc::new(handler));
    }

    pub fn contains(&self, entrypoint: &str) -> bool {
        self.functions.contains_key(entrypoint) || self.fallback.is_some()
    }

    /// The handler for `entrypoint` and its isolation key.
    pub fn resolve(&self, entrypoint: &str) -> Result<(Arc<dyn EdgeFunction>, String), FunctionError> {
        if let Some(registered) = self.functions.get(entrypoint) {
            let key = registered.isolation.clone().unwrap_or_else(|| entrypoint.to_string());
            return Ok((registered.handler.clone(), key));
        }
        self.fallback
            .clone()
            .map(|handler| (handler, entrypoint.to_string()))
            .ok_or_else(|| FunctionError::NotAFunction(entrypoint.to_string()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.fallback.is_none()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("entrypoints", &self.functions.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
