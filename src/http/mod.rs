//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout)
//!     → request.rs (buffer body, rebuild absolute URL)
//!     → geo.rs (edge metadata headers)
//!     → [routing engine resolves the request]
//!     → [serve layer materializes the response]
//!     → Send to client
//! ```
//!
//! The remaining modules are the web-platform helpers routing relies on:
//! header merging, cookie parsing, `Accept-Language` and query strings.

pub mod accept;
pub mod cookies;
pub mod geo;
pub mod headers;
pub mod request;
pub mod search_params;
pub mod server;

pub use request::{EdgeRequest, RequestError, RequestIdExt, X_REQUEST_ID};
pub use search_params::SearchParams;
pub use server::{AppState, EdgeServer};
