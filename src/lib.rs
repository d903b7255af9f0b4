//! Edge request router for Vercel build output.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod manifest;
pub mod observability;
pub mod pattern;
pub mod routing;
pub mod runtime;
pub mod serve;

pub use config::schema::EdgeConfig;
pub use http::{EdgeRequest, EdgeServer};
pub use lifecycle::Shutdown;
pub use manifest::{load_deployment, Deployment};
pub use routing::{handle_request, ResolvedState};
pub use runtime::RuntimeEnv;
