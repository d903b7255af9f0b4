//! Deployment manifests subsystem.
//!
//! # Data Flow
//! ```text
//! config.json (routes manifest)   build-output.json
//!     → routes.rs                    → build_output.rs
//!     → Deployment::new (apply overrides, collect locales)
//!     → routing engine (read-only, shared via ArcSwap)
//! ```
//!
//! # Design Decisions
//! - Manifests are immutable once loaded; a reload builds a fresh `Deployment`
//! - Overrides are folded into the build output up front so the request path
//!   needs a single lookup

pub mod build_output;
pub mod routes;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use thiserror::Error;

pub use build_output::{BuildOutput, BuildOutputItem};
pub use routes::{
    Condition, ImagesConfig, OverrideConfig, PhaseRoutes, RemotePattern, Route, RouteLocale,
    RoutesManifest, WildcardConfig,
};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A routes manifest paired with its build output.
#[derive(Debug, Clone, Default)]
pub struct Deployment {
    manifest: RoutesManifest,
    output: BuildOutput,
    locales: BTreeSet<String>,
}

impl Deployment {
    pub fn new(manifest: RoutesManifest, mut output: BuildOutput) -> Self {
        for (raw_path, item) in &manifest.overrides {
            let (served_at, item) = override_entry(raw_path, item);
            output.insert(served_at, item);
        }

        let locales = manifest
            .routes
            .iter()
            .filter_map(|(_, route)| route.locale.as_ref()?.redirect.as_ref())
            .flat_map(|redirect| redirect.keys().cloned())
            .collect();

        Self {
            manifest,
            output,
            locales,
        }
    }

    pub fn manifest(&self) -> &RoutesManifest {
        &self.manifest
    }

    pub fn routes(&self) -> &PhaseRoutes {
        &self.manifest.routes
    }

    pub fn output(&self) -> &BuildOutput {
        &self.output
    }

    pub fn images(&self) -> Option<&ImagesConfig> {
        self.manifest.images.as_ref()
    }

    pub fn wildcard(&self) -> &[WildcardConfig] {
        &self.manifest.wildcard
    }

    /// Locale codes known from route locale redirects.
    pub fn locales(&self) -> &BTreeSet<String> {
        &self.locales
    }
}

fn override_entry(raw_path: &str, config: &OverrideConfig) -> (String, BuildOutputItem) {
    let raw_path = raw_path.trim_start_matches('/');
    let served_at = config
        .path
        .as_deref()
        .unwrap_or(raw_path)
        .trim_start_matches('/');

    let headers = config.content_type.as_ref().map(|content_type| {
        BTreeMap::from([("content-type".to_string(), content_type.clone())])
    });

    (
        format!("/{served_at}"),
        BuildOutputItem::Override {
            path: Some(format!("/{raw_path}")),
            headers,
        },
    )
}

/// Load the routes manifest and build output from disk.
pub fn load_deployment(routes_path: &Path, output_path: &Path) -> Result<Deployment, ManifestError> {
    let manifest: RoutesManifest = read_json(routes_path)?;
    let output: BuildOutput = read_json(output_path)?;

    tracing::debug!(
        routes = manifest.routes.iter().count(),
        outputs = output.len(),
        "Deployment manifests loaded"
    );
    Ok(Deployment::new(manifest, output))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
        path: path.display().to_string(),
        source,
    })
}
