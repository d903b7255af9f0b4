//! Response materialization.
//!
//! Turns a [`ResolvedState`] into the response sent to the client:
//! 1. a `location` header → bodiless redirect
//! 2. a middleware body → that body
//! 3. an absolute-URL path → pass-through fetch
//! 4. otherwise → the build output item at the path

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, LOCATION, TRANSFER_ENCODING};
use axum::http::{HeaderValue, Response, StatusCode};
use thiserror::Error;
use url::Url;

use crate::http::headers::{apply_header_map, apply_route_headers};
use crate::http::request::{EdgeRequest, RequestError};
use crate::http::search_params::{merge_into_url, SearchParams};
use crate::manifest::{BuildOutput, BuildOutputItem};
use crate::routing::{is_absolute_url, ResolvedState};
use crate::runtime::{FetchError, FunctionError, RuntimeEnv};
use crate::serve::assets::AssetError;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid absolute destination {0:?}")]
    Destination(String),
}

/// Build the final response for `resolved`.
pub async fn generate_response(
    env: &RuntimeEnv,
    request: &EdgeRequest,
    resolved: ResolvedState,
    output: &BuildOutput,
) -> Result<Response<Body>, MaterializeError> {
    let ResolvedState {
        path,
        status,
        mut headers,
        search_params,
        body,
    } = resolved;

    let location = headers
        .normal
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(location) = location {
        if headers.middleware_location.as_deref() != Some(location.as_str()) && !search_params.is_empty() {
            let separator = if location.contains('?') { '&' } else { '?' };
            match HeaderValue::from_str(&format!("{location}{separator}{search_params}")) {
                Ok(value) => {
                    headers.normal.insert(LOCATION, value);
                }
                Err(_) => tracing::warn!(location = %location, "Keeping redirect without query"),
            }
        }

        let mut response = Response::new(Body::empty());
        *response.status_mut() = status_code(status.unwrap_or(307));
        *response.headers_mut() = headers.normal;
        return Ok(response);
    }

    let response = if let Some(body) = body {
        let mut response = Response::new(body);
        *response.status_mut() = status_code(status.unwrap_or(200));
        response
    } else if is_absolute_url(&path) {
        let mut url = Url::parse(&path).map_err(|_| MaterializeError::Destination(path.clone()))?;
        merge_into_url(&mut url, &search_params);
        tracing::debug!(url = %url, "Passing request through to external destination");
        env.fetch().fetch(request.with_url(url)).await?
    } else {
        run_or_fetch_build_output_item(env, output.get(&path), request, &path, &search_params).await
    };

    let (mut parts, body) = response.into_parts();
    let mut merged = headers.normal;
    apply_header_map(&mut merged, &parts.headers);
    apply_header_map(&mut merged, &headers.important);
    // The body may come from a different source than these headers.
    merged.remove(CONTENT_LENGTH);
    merged.remove(TRANSFER_ENCODING);

    parts.headers = merged;
    if let Some(status) = status {
        parts.status = status_code(status);
    }
    Ok(Response::from_parts(parts, body))
}

/// Serve `item` for `path`: invoke a function or middleware, or fetch the
/// asset. Failures are logged and become a plain 500.
pub async fn run_or_fetch_build_output_item(
    env: &RuntimeEnv,
    item: Option<&BuildOutputItem>,
    request: &EdgeRequest,
    path: &str,
    search_params: &SearchParams,
) -> Response<Body> {
    let mut url = request.url.clone();
    merge_into_url(&mut url, search_params);
    let request = request.with_url(url);

    match serve_item(env, item, &request, path).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to serve build output item");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn serve_item(
    env: &RuntimeEnv,
    item: Option<&BuildOutputItem>,
    request: &EdgeRequest,
    path: &str,
) -> Result<Response<Body>, MaterializeError> {
    match item {
        Some(BuildOutputItem::Function { entrypoint }) | Some(BuildOutputItem::Middleware { entrypoint }) => {
            let http_request = request.to_http_request()?;
            Ok(env.invoke(entrypoint, http_request).await?)
        }
        Some(BuildOutputItem::Override {
            path: asset_path,
            headers,
        }) => {
            let asset_request = route_request(request, asset_path.as_deref().unwrap_or(path))?;
            let mut response = env.assets().fetch(&asset_request).await?;
            if let Some(headers) = headers {
                apply_route_headers(response.headers_mut(), headers, None);
            }
            Ok(response)
        }
        Some(BuildOutputItem::Static) => Ok(env.assets().fetch(&route_request(request, path)?).await?),
        None => Ok(plain(StatusCode::NOT_FOUND, "Not Found")),
    }
}

/// `request` re-pointed at `path`, keeping its query.
fn route_request(request: &EdgeRequest, path: &str) -> Result<EdgeRequest, MaterializeError> {
    let mut url = request
        .url
        .join(path)
        .map_err(|_| MaterializeError::Destination(path.to_string()))?;
    url.set_query(request.url.query());
    Ok(request.with_url(url))
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
