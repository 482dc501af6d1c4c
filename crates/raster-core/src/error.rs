//! Error types for raster cube access.

use thiserror::Error;

use crate::types::InterleaveFormat;

/// Errors that can occur while resolving requests, paging data or
/// computing statistics.
#[derive(Error, Debug)]
pub enum RasterError {
    /// The request could not be polished or failed validation.
    #[error("invalid data request: {0}")]
    InvalidRequest(String),

    /// A writable request was made through a read-only borrow of the element.
    #[error("writable access requested on a read-only element")]
    ReadOnlyElement,

    /// No pager is available and none can be created.
    #[error("no pager available: {0}")]
    NoPager(String),

    /// The requested interleave cannot be synthesized from the native one.
    #[error("cannot convert {native} data to {requested}")]
    UnsupportedConversion {
        native: InterleaveFormat,
        requested: InterleaveFormat,
    },

    /// The pager is too old for the features the request uses.
    #[error("pager supports request version {supported}, request requires {required}")]
    UnsupportedRequestVersion { supported: u32, required: u32 },

    /// The pager returned no page for the request.
    #[error("pager returned no page at row {row}, column {column}, band {band}")]
    PageUnavailable { row: usize, column: usize, band: usize },

    /// The pager answered a writable request with a read-only page.
    #[error("pager returned a read-only page for a writable request")]
    ReadOnlyPage,

    /// A requested region is outside the cube.
    #[error("requested region {requested} is outside cube bounds {cube}")]
    OutOfBounds { requested: String, cube: String },

    /// Invalid descriptor or geometry.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The operation was aborted through its abort flag.
    #[error("operation aborted")]
    Aborted,

    /// Storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Statistics could not be computed.
    #[error("statistics error: {0}")]
    StatisticsError(String),
}

impl RasterError {
    /// Create an InvalidRequest error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a NoPager error.
    pub fn no_pager(msg: impl Into<String>) -> Self {
        Self::NoPager(msg.into())
    }

    /// Create an OutOfBounds error.
    pub fn out_of_bounds(requested: impl Into<String>, cube: impl Into<String>) -> Self {
        Self::OutOfBounds {
            requested: requested.into(),
            cube: cube.into(),
        }
    }

    /// Create an InvalidDescriptor error.
    pub fn invalid_descriptor(msg: impl Into<String>) -> Self {
        Self::InvalidDescriptor(msg.into())
    }

    /// Create a StorageError.
    pub fn storage_error(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Create a StatisticsError.
    pub fn statistics_error(msg: impl Into<String>) -> Self {
        Self::StatisticsError(msg.into())
    }
}

impl From<std::io::Error> for RasterError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
