//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all edge handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener
//! - Dispatch requests: suspense cache, image proxy, or the routing engine
//! - Swap in reloaded deployments without dropping in-flight requests

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::EdgeConfig;
use crate::http::geo::apply_geo_headers;
use crate::http::request::{
    propagate_request_id_layer, set_request_id_layer, EdgeRequest, RequestError, RequestIdExt,
};
use crate::manifest::Deployment;
use crate::observability::metrics;
use crate::routing::handle_request;
use crate::runtime::{EdgeFetch, FetchError, RuntimeEnv};
use crate::serve::{generate_response, handle_image_resizing_request, MaterializeError, IMAGE_PATH_PREFIX};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub deployment: Arc<ArcSwap<Deployment>>,
    pub env: Arc<RuntimeEnv>,
    pub max_body_bytes: usize,
}

#[derive(Debug, Error)]
enum ServeError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        match self {
            ServeError::Request(RequestError::BodyTooLarge(_)) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response()
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
        }
    }
}

/// HTTP server for the edge router.
pub struct EdgeServer {
    router: Router,
    deployment: Arc<ArcSwap<Deployment>>,
}

impl EdgeServer {
    /// Create a new server for `deployment`.
    pub fn new(config: &EdgeConfig, deployment: Deployment, env: Arc<RuntimeEnv>) -> Self {
        let deployment = Arc::new(ArcSwap::from_pointee(deployment));
        let state = AppState {
            deployment: deployment.clone(),
            env,
            max_body_bytes: config.listener.max_body_bytes,
        };

        let router = Self::build_router(config, state);
        Self { router, deployment }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &EdgeConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(edge_handler))
            .route("/", any(edge_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Clone of the router, for driving the server without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Handle to the live deployment.
    pub fn deployment(&self) -> Arc<ArcSwap<Deployment>> {
        self.deployment.clone()
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Deployments received on `updates` replace the live one; the server
    /// drains and stops when `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut updates: mpsc::UnboundedReceiver<Deployment>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let live = self.deployment.clone();
        tokio::spawn(async move {
            while let Some(deployment) = updates.recv().await {
                live.store(Arc::new(deployment));
                tracing::info!("Deployment swapped");
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler.
async fn edge_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request.request_id().to_string();
    let method = request.method().to_string();

    let (target, response) = match serve_request(&state, request).await {
        Ok(served) => served,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to serve request");
            ("route", e.into_response())
        }
    };

    metrics::record_request(&method, response.status().as_u16(), target, start_time);
    response
}

async fn serve_request(
    state: &AppState,
    request: Request<Body>,
) -> Result<(&'static str, Response), ServeError> {
    let mut request = EdgeRequest::from_request(request, state.max_body_bytes).await?;

    if EdgeFetch::is_suspense_cache_request(&request) {
        return Ok(("cache", state.env.fetch().fetch(request).await?));
    }

    apply_geo_headers(&mut request.headers);
    let deployment = state.deployment.load_full();

    if request.url.path().starts_with(IMAGE_PATH_PREFIX) {
        let response = handle_image_resizing_request(&state.env, &deployment, &request).await?;
        return Ok(("image", response));
    }

    tracing::debug!(
        request_id = %request.headers.request_id(),
        method = %request.method,
        url = %request.url,
        "Routing request"
    );

    let resolved = handle_request(&deployment, &state.env, &mut request).await;
    let response = generate_response(&state.env, &request, resolved, deployment.output()).await?;
    Ok(("route", response))
}
