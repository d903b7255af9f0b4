//! Runtime environment subsystem.
//!
//! # Data Flow
//! ```text
//! EdgeConfig (at startup)
//!     → functions.rs (entrypoint → handler table)
//!     → fetch.rs (blobs, suspense cache, network)
//!     → RuntimeEnv (shared via Arc)
//!
//! Function invocation:
//!     entrypoint → FunctionRegistry::resolve
//!     → IsolationRegistry::scope(isolation key), fetch patched once
//!     → EdgeFunction::call(request, FunctionContext)
//! ```
//!
//! # Design Decisions
//! - No process globals: everything a request needs is reachable from the
//!   injected `RuntimeEnv`
//! - Handlers are bound at startup; an unknown entrypoint is a
//!   configuration error surfaced as `FunctionError::NotAFunction`

pub mod cache;
pub mod fetch;
pub mod functions;
pub mod isolation;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use thiserror::Error;
use url::Url;

use crate::config::schema::EdgeConfig;
use crate::pattern::PatternCache;
use crate::serve::assets::{AssetFetcher, DirAssets, NoAssets, OriginAssets};

pub use cache::{handle_suspense_cache_request, CacheEntry, MemoryCacheStore, SuspenseCacheStore};
pub use fetch::{EdgeFetch, FetchError, SUSPENSE_CACHE_HOSTNAME};
pub use functions::{
    handler_fn, EdgeFunction, FunctionContext, FunctionError, FunctionRegistry, UpstreamFunction,
};
pub use isolation::{IsolatedScope, IsolationRegistry};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid assets origin: {0}")]
    AssetsOrigin(#[from] url::ParseError),
}

/// Process-wide collaborators of the routing engine.
pub struct RuntimeEnv {
    functions: FunctionRegistry,
    assets: Arc<dyn AssetFetcher>,
    fetch: Arc<EdgeFetch>,
    isolation: IsolationRegistry,
    patterns: PatternCache,
}

impl RuntimeEnv {
    pub fn new(functions: FunctionRegistry, assets: Arc<dyn AssetFetcher>, fetch: EdgeFetch) -> Self {
        Self {
            functions,
            assets,
            fetch: Arc::new(fetch),
            isolation: IsolationRegistry::new(),
            patterns: PatternCache::new(),
        }
    }

    pub fn from_config(config: &EdgeConfig) -> Result<Self, RuntimeError> {
        let client = reqwest::Client::new();

        let assets: Arc<dyn AssetFetcher> = match (&config.assets.dir, &config.assets.origin) {
            (Some(dir), _) => Arc::new(DirAssets::new(dir)),
            (None, Some(origin)) => Arc::new(OriginAssets::new(Url::parse(origin)?, client.clone())),
            (None, None) => Arc::new(NoAssets),
        };

        let mut fetch = EdgeFetch::new(client);
        for (name, path) in &config.blobs {
            fetch = fetch.with_blob_file(name.clone(), path)?;
        }
        if config.suspense_cache.enabled {
            fetch = fetch.with_cache(Arc::new(MemoryCacheStore::new()));
        }

        let functions = FunctionRegistry::from_config(&config.functions)?;
        tracing::info!(
            functions = functions.len(),
            blobs = config.blobs.len(),
            suspense_cache = config.suspense_cache.enabled,
            "Runtime environment ready"
        );
        Ok(Self::new(functions, assets, fetch))
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn assets(&self) -> &dyn AssetFetcher {
        self.assets.as_ref()
    }

    pub fn fetch(&self) -> &EdgeFetch {
        &self.fetch
    }

    pub fn isolation(&self) -> &IsolationRegistry {
        &self.isolation
    }

    pub fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    /// Invoke the handler bound to `entrypoint` inside its isolation scope.
    pub async fn invoke(&self, entrypoint: &str, request: Request<Body>) -> Result<Response<Body>, FunctionError> {
        let (handler, key) = self.functions.resolve(entrypoint)?;

        let scope = self.isolation.scope(&key);
        if scope.patch_fetch(self.fetch.clone()) {
            tracing::debug!(scope = %key, "Isolation scope initialized");
        }
        if let Some(cache) = self.fetch.cache() {
            scope.set_incremental_cache(cache.clone());
        }
        let fetch = scope.fetch().cloned().unwrap_or_else(|| self.fetch.clone());

        let ctx = FunctionContext::new(entrypoint, scope, fetch);
        handler.call(request, &ctx).await
    }
}

impl std::fmt::Debug for RuntimeEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEnv")
            .field("functions", &self.functions)
            .field("fetch", &self.fetch)
            .field("isolation", &self.isolation)
            .finish()
    }
}
