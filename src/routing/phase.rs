//! Routing phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One stage of the routing state machine, each with its own route list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    None,
    Filesystem,
    Rewrite,
    Resource,
    Miss,
    Hit,
    Error,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::None,
        Phase::Filesystem,
        Phase::Rewrite,
        Phase::Resource,
        Phase::Miss,
        Phase::Hit,
        Phase::Error,
    ];

    /// The phase that follows `self` in the linear order
    /// `none → filesystem → rewrite → resource → miss`.
    ///
    /// Every phase from `miss` onward falls back to `miss`.
    pub fn next(self) -> Phase {
        match self {
            Phase::None => Phase::Filesystem,
            Phase::Filesystem => Phase::Rewrite,
            Phase::Rewrite => Phase::Resource,
            Phase::Resource => Phase::Miss,
            Phase::Miss | Phase::Hit | Phase::Error => Phase::Miss,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::None => "none",
            Phase::Filesystem => "filesystem",
            Phase::Rewrite => "rewrite",
            Phase::Resource => "resource",
            Phase::Miss => "miss",
            Phase::Hit => "hit",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
