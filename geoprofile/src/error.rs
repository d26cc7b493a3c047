//! Error types for the geoprofile library.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when loading or querying terrain data.
///
/// Load-time failures (`MalformedIndex`, `MalformedAttributes`,
/// `InvalidTileReference`) abort the construction of the raster dataset for
/// the affected spatial reference. Per-query tile read failures degrade to
/// "no altitude available" instead of surfacing here; "point outside all
/// tiles" is represented as `None`, never as an error.
#[derive(Error, Debug)]
pub enum DtmError {
    /// IO error when reading files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tile index stream is corrupt or truncated.
    #[error("malformed tile index: {reason}")]
    MalformedIndex { reason: String },

    /// The companion attribute table is corrupt or truncated.
    #[error("malformed attribute table: {reason}")]
    MalformedAttributes { reason: String },

    /// An attribute record does not resolve to a supported tile file.
    #[error("invalid tile reference {location:?} in index {}", index.display())]
    InvalidTileReference { location: String, index: PathBuf },

    /// No raster dataset is configured for the requested spatial reference.
    #[error("no raster dataset configured for spatial reference {sr}")]
    UnknownSpatialReference { sr: u32 },

    /// A load failure observed through the raster cache. The original error
    /// is shared between every caller that raced on the same first load.
    #[error("{0}")]
    Shared(Arc<DtmError>),
}

/// Result type alias using [`DtmError`].
pub type Result<T> = std::result::Result<T, DtmError>;
