//! Typed error taxonomy for the crate.
//!
//! Every variant corresponds to one row of the error-handling table: most
//! failures are communicated back to the caller as a sentinel value (an
//! empty path, a `None`, a `-1` agent handle) rather than as an error; only
//! the handful of cases that truly abort an operation become a [`NavError`].

use thiserror::Error;

/// Errors that can abort a bake or a file read. Query-time "failures" (no
/// path, sample outside, unknown agent) are represented as sentinel return
/// values elsewhere and never appear here.
#[derive(Debug, Error)]
pub enum NavError {
    /// The baker was given zero input triangles.
    #[error("bake input contained no triangles")]
    BakeInputEmpty,

    /// A pipeline stage hit a numeric or capacity limit it cannot recover
    /// from. The stage name is recorded for diagnostics.
    #[error("bake stage '{stage}' failed")]
    BakeStageFailure { stage: &'static str },

    /// The watershed region counter would have exceeded `u16::MAX`.
    #[error("region id overflow during watershed region growing")]
    RegionIdOverflow,

    /// A persistence stream was malformed (wrong terminator, truncated
    /// array, or an unrecognized text layout).
    #[error("malformed navmesh file: {0}")]
    FileFormatError(String),
}

pub type Result<T> = std::result::Result<T, NavError>;
