//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! EdgeRequest (url, headers, cookies)
//!     → dispatcher.rs (run from `none`, retry once from `error`)
//!     → matcher.rs (phase loop: none → filesystem → rewrite → resource → miss → hit)
//!         → conditions.rs (has / missing)
//!         → locale.rs (locale redirects, locale-prefixed paths)
//!         → middleware (via serve::materialize)
//!     → ResolvedState { path, status, headers, search_params, body }
//! ```
//!
//! # Design Decisions
//! - Routes are immutable at runtime; all mutation happens on per-request state
//! - Within a phase routes run in manifest order; the first `done` or
//!   `error` ends the pass
//! - At most 50 phase passes per run

pub mod conditions;
pub mod dispatcher;
pub mod locale;
pub mod matcher;
pub mod phase;

pub use dispatcher::{handle_request, ResolvedState, ResolvedSummary};
pub use matcher::{is_absolute_url, MatchStatus, RouteHeaders, RouteOutcome, RoutesMatcher, MAX_PHASE_CHECKS};
pub use phase::Phase;
