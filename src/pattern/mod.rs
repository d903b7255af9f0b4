//! Pattern subsystem.
//!
//! # Data Flow
//! ```text
//! Route manifest pattern ("^/blog/(?P<slug>[^/]+)$")
//!     → pcre.rs (strip delimiters/flags, rewrite named groups,
//!                expand POSIX classes, compile with `regex`,
//!                falling back to `fancy-regex` for lookaround)
//!     → cache.rs (compiled once per source + case sensitivity)
//!     → PcreMatch (owned groups + capture names)
//!     → substitute.rs ($1 / $name expansion into dest/header templates)
//! ```
//!
//! # Design Decisions
//! - Capture names are recorded by ordinal, the engine only sees plain groups
//! - Compile errors are configuration errors and surface at load time
//! - Matches own their text so route application can outlive the subject

pub mod cache;
pub mod pcre;
pub mod substitute;

pub use cache::PatternCache;
pub use pcre::{compile, CompiledPattern, PatternError, PcreMatch};
pub use substitute::apply_pcre_matches;
