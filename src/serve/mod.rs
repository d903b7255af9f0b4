//! Response serving subsystem.
//!
//! # Data Flow
//! ```text
//! ResolvedState
//!     → materialize.rs (redirect | body | pass-through | build output item)
//!         → assets.rs (static and override items)
//!         → runtime (function and middleware items)
//!     → Response
//!
//! /_next/image?url=..&w=..&q=..
//!     → images.rs (validate, fetch source, add headers)
//! ```

pub mod assets;
pub mod images;
pub mod materialize;

pub use assets::{AssetError, AssetFetcher, DirAssets, MemoryAssets, NoAssets, OriginAssets};
pub use images::{handle_image_resizing_request, IMAGE_PATH_PREFIX};
pub use materialize::{generate_response, run_or_fetch_build_output_item, MaterializeError};
