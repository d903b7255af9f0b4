//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Locations of the deployment manifests.
    pub manifest: ManifestConfig,

    /// Where static assets are served from.
    pub assets: AssetsConfig,

    /// Upstreams implementing function and middleware entrypoints.
    pub functions: FunctionsConfig,

    /// Bundled binary assets served for `blob:<name>` URLs.
    pub blobs: BTreeMap<String, PathBuf>,

    pub suspense_cache: SuspenseCacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body accepted; larger bodies get 413.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Routes manifest (`config.json` in the build output).
    pub routes_path: PathBuf,

    /// Build output map.
    pub build_output_path: PathBuf,

    /// Reload both files when either changes.
    pub watch: bool,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            routes_path: PathBuf::from("config.json"),
            build_output_path: PathBuf::from("build-output.json"),
            watch: false,
        }
    }
}

/// Static asset source. At most one of `dir` and `origin` may be set.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AssetsConfig {
    pub dir: Option<PathBuf>,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FunctionsConfig {
    /// Upstream for entrypoints without an explicit route.
    pub default_upstream: Option<String>,

    pub routes: Vec<FunctionRoute>,
}

/// Maps one entrypoint to the upstream that implements it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionRoute {
    pub entrypoint: String,

    /// Base URL of the upstream (e.g., "http://127.0.0.1:3000").
    pub upstream: String,

    /// Isolation scope shared by functions with the same key.
    /// Defaults to the entrypoint.
    #[serde(default)]
    pub isolation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SuspenseCacheConfig {
    pub enabled: bool,
}

impl Default for SuspenseCacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: EdgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.timeouts.request_secs, 30);
        assert!(config.suspense_cache.enabled);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_full_config() {
        let config: EdgeConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:3000"

            [manifest]
            routes_path = "out/config.json"
            watch = true

            [assets]
            origin = "http://127.0.0.1:9000"

            [functions]
            default_upstream = "http://127.0.0.1:4000"

            [[functions.routes]]
            entrypoint = "middleware"
            upstream = "http://127.0.0.1:4001"

            [blobs]
            "logo.png" = "assets/logo.png"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.max_body_bytes, 4 * 1024 * 1024);
        assert!(config.manifest.watch);
        assert_eq!(config.manifest.build_output_path, PathBuf::from("build-output.json"));
        assert_eq!(config.functions.routes[0].entrypoint, "middleware");
        assert!(config.functions.routes[0].isolation.is_none());
        assert_eq!(config.blobs["logo.png"], PathBuf::from("assets/logo.png"));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
