//! `/_next/image` proxy.
//!
//! Validates the request against the deployment's image settings and
//! passes the source image through with caching and security headers.
//! Pixels are not transformed.

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_SECURITY_POLICY};
use axum::http::{HeaderMap, HeaderValue, Method, Response, StatusCode};
use bytes::Bytes;
use url::Url;

use crate::http::headers::apply_header_map;
use crate::http::request::EdgeRequest;
use crate::http::search_params::SearchParams;
use crate::manifest::{Deployment, ImagesConfig, RemotePattern};
use crate::pattern::PatternCache;
use crate::runtime::RuntimeEnv;
use crate::serve::materialize::MaterializeError;

pub const IMAGE_PATH_PREFIX: &str = "/_next/image";

const DEFAULT_QUALITY: i64 = 75;
const DEFAULT_CACHE_TTL: u64 = 60;

/// A validated image request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizingProperties {
    pub is_relative: bool,
    pub image_url: Url,
    pub width: u32,
    pub quality: u8,
    /// Output format negotiated from `Accept`, without the `image/` prefix.
    pub format: Option<String>,
}

/// Whether `url` is allowed by `pattern`. `hostname`, `port` and `pathname`
/// are unanchored regular expressions.
pub fn is_remote_pattern_match(url: &Url, pattern: &RemotePattern, patterns: &PatternCache) -> bool {
    if let Some(protocol) = &pattern.protocol {
        if url.scheme() != protocol.trim_end_matches(':') {
            return false;
        }
    }

    let matches = |expr: &str, value: &str| {
        patterns
            .get(expr, true)
            .is_ok_and(|compiled| compiled.is_match(value))
    };

    if !matches(&pattern.hostname, url.host_str().unwrap_or_default()) {
        return false;
    }
    if let Some(port) = &pattern.port {
        let actual = url.port().map(|p| p.to_string()).unwrap_or_default();
        if !matches(port, &actual) {
            return false;
        }
    }
    if let Some(pathname) = &pattern.pathname {
        if !matches(pathname, url.path()) {
            return false;
        }
    }
    true
}

/// Validate an image request. `None` means the request is rejected.
pub fn resizing_properties(
    request: &EdgeRequest,
    config: Option<&ImagesConfig>,
    patterns: &PatternCache,
) -> Option<ResizingProperties> {
    if request.method != Method::GET {
        return None;
    }
    let config = config?;

    let params = SearchParams::from_url(&request.url);
    let raw_url = params.get("url").filter(|u| !u.is_empty())?;
    let width = parse_int(params.get("w").unwrap_or_default())?;
    let quality = match params.get("q") {
        Some(q) => parse_int(q)?,
        None => DEFAULT_QUALITY,
    };

    let width = u32::try_from(width).ok().filter(|w| config.sizes.contains(w))?;
    let quality = u8::try_from(quality).ok().filter(|q| *q <= 100)?;

    let image_url = request.url.join(raw_url).ok()?;
    if image_url.path().ends_with(".svg") && !config.dangerously_allow_svg {
        return None;
    }

    let is_protocol_relative = raw_url.starts_with("//");
    let is_relative = raw_url.starts_with('/') && !is_protocol_relative;
    if !is_relative {
        let host = image_url.host_str().unwrap_or_default();
        let allowed = config.domains.iter().any(|d| d == host)
            || config
                .remote_patterns
                .iter()
                .any(|pattern| is_remote_pattern_match(&image_url, pattern, patterns));
        if !allowed {
            return None;
        }
    }

    let accept = request
        .headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let format = config
        .formats
        .iter()
        .find(|format| accept.contains(format.as_str()))
        .map(|format| format.trim_start_matches("image/").to_string());

    Some(ResizingProperties {
        is_relative,
        image_url,
        width,
        quality,
        format,
    })
}

/// Add the configured image headers to a source image response.
pub fn format_response(response: Response<Body>, image_url: &Url, config: Option<&ImagesConfig>) -> Response<Body> {
    let mut extra = HeaderMap::new();

    if let Some(csp) = config.and_then(|c| c.content_security_policy.as_deref()) {
        if let Ok(value) = HeaderValue::from_str(csp) {
            extra.insert(CONTENT_SECURITY_POLICY, value);
        }
    }

    if let Some(disposition) = config.and_then(|c| c.content_disposition_type.as_deref()) {
        let file_name = image_url.path().rsplit('/').next().filter(|name| !name.is_empty());
        let value = match file_name {
            Some(name) => format!("{disposition}; filename=\"{name}\""),
            None => disposition.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            extra.insert(CONTENT_DISPOSITION, value);
        }
    }

    if !response.headers().contains_key(CACHE_CONTROL) {
        let ttl = config
            .and_then(|c| c.minimum_cache_ttl)
            .unwrap_or(DEFAULT_CACHE_TTL);
        if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={ttl}")) {
            extra.insert(CACHE_CONTROL, value);
        }
    }

    let (mut parts, body) = response.into_parts();
    apply_header_map(&mut parts.headers, &extra);
    Response::from_parts(parts, body)
}

/// Serve an image proxy request.
pub async fn handle_image_resizing_request(
    env: &RuntimeEnv,
    deployment: &Deployment,
    request: &EdgeRequest,
) -> Result<Response<Body>, MaterializeError> {
    let config = deployment.images();
    let Some(props) = resizing_properties(request, config, env.patterns()) else {
        let mut response = Response::new(Body::from("Invalid image resizing request"));
        *response.status_mut() = StatusCode::BAD_REQUEST;
        return Ok(response);
    };

    tracing::debug!(
        url = %props.image_url,
        width = props.width,
        quality = props.quality,
        format = ?props.format,
        "Serving image"
    );

    let source = EdgeRequest::new(
        Method::GET,
        props.image_url.clone(),
        request.headers.clone(),
        Bytes::new(),
    );
    let response = if props.is_relative && deployment.output().contains(props.image_url.path()) {
        env.assets().fetch(&source).await?
    } else {
        env.fetch().fetch(source).await?
    };

    Ok(format_response(response, &props.image_url, config))
}

/// Leading decimal integer, ignoring trailing garbage (`"640px"` → 640).
fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, value.strip_prefix('+').unwrap_or(value)),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ImagesConfig {
        ImagesConfig {
            sizes: vec![640, 1080],
            domains: vec!["images.test".into()],
            remote_patterns: vec![RemotePattern {
                protocol: Some("https".into()),
                hostname: r"^cdn\.test$".into(),
                port: None,
                pathname: Some("^/assets/".into()),
            }],
            formats: vec!["image/avif".into(), "image/webp".into()],
            ..ImagesConfig::default()
        }
    }

    fn props(url: &str) -> Option<ResizingProperties> {
        let mut request = EdgeRequest::get(url).unwrap();
        request
            .headers
            .insert("accept", HeaderValue::from_static("image/webp,*/*"));
        resizing_properties(&request, Some(&config()), &PatternCache::new())
    }

    #[test]
    fn test_relative_image() {
        let props = props("https://shop.test/_next/image?url=%2Fhero.png&w=640").unwrap();
        assert!(props.is_relative);
        assert_eq!(props.image_url.as_str(), "https://shop.test/hero.png");
        assert_eq!(props.quality, 75);
        assert_eq!(props.format.as_deref(), Some("webp"));
    }

    #[test]
    fn test_rejections() {
        // width not in sizes
        assert!(props("https://shop.test/_next/image?url=%2Fa.png&w=100").is_none());
        // quality out of range
        assert!(props("https://shop.test/_next/image?url=%2Fa.png&w=640&q=101").is_none());
        // svg without dangerouslyAllowSVG
        assert!(props("https://shop.test/_next/image?url=%2Fa.svg&w=640").is_none());
        // remote host not allowed
        assert!(props("https://shop.test/_next/image?url=https%3A%2F%2Fevil.test%2Fa.png&w=640").is_none());
        // protocol-relative is not relative
        assert!(props("https://shop.test/_next/image?url=%2F%2Fevil.test%2Fa.png&w=640").is_none());
    }

    #[test]
    fn test_remote_sources() {
        assert!(props("https://shop.test/_next/image?url=https%3A%2F%2Fimages.test%2Fa.png&w=1080").is_some());
        assert!(props("https://shop.test/_next/image?url=https%3A%2F%2Fcdn.test%2Fassets%2Fa.png&w=640").is_some());
        assert!(props("https://shop.test/_next/image?url=https%3A%2F%2Fcdn.test%2Fother%2Fa.png&w=640").is_none());
    }

    #[test]
    fn test_format_response_headers() {
        let config = ImagesConfig {
            content_security_policy: Some("script-src 'none'".into()),
            content_disposition_type: Some("inline".into()),
            minimum_cache_ttl: Some(300),
            ..ImagesConfig::default()
        };
        let url = Url::parse("https://shop.test/img/hero.png").unwrap();

        let response = format_response(Response::new(Body::empty()), &url, Some(&config));
        let headers = response.headers();
        assert_eq!(headers[CONTENT_DISPOSITION], "inline; filename=\"hero.png\"");
        assert_eq!(headers[CACHE_CONTROL], "public, max-age=300");
        assert_eq!(headers[CONTENT_SECURITY_POLICY], "script-src 'none'");
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("640px"), Some(640));
        assert_eq!(parse_int("-5"), Some(-5));
        assert_eq!(parse_int("abc"), None);
    }
}
