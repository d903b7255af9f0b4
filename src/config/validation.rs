//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, body limit > 0, addresses parse)
//! - Check referential integrity of a deployment (middleware paths point at
//!   middleware entries, every function entrypoint has a handler)
//! - Compile every route pattern once so bad patterns fail at load time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EdgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config or a deployment is accepted into the system

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::config::schema::EdgeConfig;
use crate::manifest::{BuildOutputItem, Deployment};
use crate::pattern::{compile, PatternError};
use crate::routing::Phase;
use crate::runtime::FunctionRegistry;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),
    #[error("listener.max_body_bytes must be greater than 0")]
    ZeroBodyLimit,
    #[error("timeouts.request_secs must be greater than 0")]
    ZeroTimeout,
    #[error("assets.dir and assets.origin are mutually exclusive")]
    ConflictingAssets,
    #[error("{field} {url:?} is not a supported {expected} URL")]
    UpstreamUrl {
        field: String,
        url: String,
        expected: &'static str,
    },
    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
    #[error("blob {name:?} not found at {}", path.display())]
    MissingBlob { name: String, path: PathBuf },
    #[error("{phase} route {index}: {source}")]
    Pattern {
        phase: Phase,
        index: usize,
        #[source]
        source: PatternError,
    },
    #[error("{phase} route {index}: status {status} is not an HTTP status")]
    Status { phase: Phase, index: usize, status: u16 },
    #[error("{phase} route {index}: middlewarePath {path:?} is not a middleware entry")]
    MiddlewarePath { phase: Phase, index: usize, path: String },
    #[error("no handler registered for entrypoint {0:?}")]
    MissingHandler(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }
    if config.assets.dir.is_some() && config.assets.origin.is_some() {
        errors.push(ValidationError::ConflictingAssets);
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let origins = config
        .assets
        .origin
        .iter()
        .map(|url| ("assets.origin".to_string(), url, &["http", "https"][..]));
    // Function upstreams are reached through the plain-HTTP connector.
    let upstreams = config
        .functions
        .default_upstream
        .iter()
        .map(|url| ("functions.default_upstream".to_string(), url))
        .chain(config.functions.routes.iter().map(|route| {
            (format!("functions.routes[{}].upstream", route.entrypoint), &route.upstream)
        }))
        .map(|(field, url)| (field, url, &["http"][..]));
    for (field, url, schemes) in origins.chain(upstreams) {
        let supported = Url::parse(url).is_ok_and(|u| schemes.contains(&u.scheme()) && u.has_host());
        if !supported {
            errors.push(ValidationError::UpstreamUrl {
                field,
                url: url.clone(),
                expected: if schemes.len() > 1 { "http(s)" } else { "http" },
            });
        }
    }

    for (name, path) in &config.blobs {
        if !path.is_file() {
            errors.push(ValidationError::MissingBlob {
                name: name.clone(),
                path: path.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a deployment against the registered function handlers.
pub fn validate_deployment(
    deployment: &Deployment,
    functions: &FunctionRegistry,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let output = deployment.output();

    for phase in Phase::ALL {
        for (index, route) in deployment.routes().get(phase).iter().enumerate() {
            let patterns = std::iter::once(route.src.as_str()).chain(
                route
                    .has
                    .iter()
                    .chain(route.missing.iter())
                    .flatten()
                    .filter_map(|condition| condition.pattern()),
            );
            for pattern in patterns {
                if let Err(source) = compile(&format!("%{pattern}%")) {
                    errors.push(ValidationError::Pattern { phase, index, source });
                }
            }

            if let Some(status) = route.status {
                if !(100..=599).contains(&status) {
                    errors.push(ValidationError::Status { phase, index, status });
                }
            }

            if let Some(path) = &route.middleware_path {
                if !output.get(path).is_some_and(BuildOutputItem::is_middleware) {
                    errors.push(ValidationError::MiddlewarePath {
                        phase,
                        index,
                        path: path.clone(),
                    });
                }
            }
        }
    }

    let mut entrypoints: Vec<&str> = output.iter().filter_map(|(_, item)| item.entrypoint()).collect();
    entrypoints.sort_unstable();
    entrypoints.dedup();
    for entrypoint in entrypoints {
        if !functions.contains(entrypoint) {
            errors.push(ValidationError::MissingHandler(entrypoint.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{BuildOutput, RoutesManifest};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&EdgeConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = EdgeConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.timeouts.request_secs = 0;
        config.assets.dir = Some("public".into());
        config.assets.origin = Some("ftp://assets".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], ValidationError::BindAddress(_)));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UpstreamUrl { field, .. } if field == "assets.origin")));
    }

    #[test]
    fn test_deployment_references() {
        let manifest: RoutesManifest = serde_json::from_str(
            r#"{"routes": {"none": [
                {"src": "^/(?P<bad$"},
                {"src": "^/.*$", "middlewarePath": "/_next/static/x.js", "status": 999}
            ]}}"#,
        )
        .unwrap();
        let output: BuildOutput = serde_json::from_str(
            r#"{
                "/_next/static/x.js": {"type": "static"},
                "/api": {"type": "function", "entrypoint": "api"}
            }"#,
        )
        .unwrap();
        let deployment = Deployment::new(manifest, output);

        let errors = validate_deployment(&deployment, &FunctionRegistry::new()).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Pattern { index: 0, .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Status { status: 999, .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MiddlewarePath { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingHandler(ep) if ep == "api")));
    }
}
