//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! edge.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EdgeConfig (validated, immutable)
//!
//! config.json + build-output.json
//!     → manifest::load_deployment
//!     → validation.rs (patterns, statuses, entrypoints)
//!     → Deployment, swapped atomically into the server
//!
//! On change (manifest.watch = true):
//!     watcher.rs detects change
//!     → reloads and validates the deployment
//!     → server swaps in the new Arc<Deployment>
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the deployment hot-reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AssetsConfig, EdgeConfig, FunctionRoute, FunctionsConfig, ListenerConfig, LogFormat,
    ManifestConfig, ObservabilityConfig, SuspenseCacheConfig, TimeoutConfig,
};
pub use validation::{validate_config, validate_deployment, ValidationError};
pub use watcher::ManifestWatcher;
