//! Error types for kernel and transform construction.
//!
//! Runtime pulls speak [`raster_core::Error`]; this type covers the
//! parameter validation that happens while a transform is being built.

use thiserror::Error;

/// Error type for kernel parameter validation.
#[derive(Error, Debug)]
pub enum OpsError {
    /// Invalid dimensions specified.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not supported for this format.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type for kernel construction.
pub type OpsResult<T> = Result<T, OpsError>;

impl From<OpsError> for raster_core::Error {
    fn from(err: OpsError) -> Self {
        match err {
            OpsError::InvalidDimensions(msg) | OpsError::InvalidParameter(msg) => {
                raster_core::Error::InvalidParameter(msg)
            }
            OpsError::Unsupported(msg) => raster_core::Error::Unsupported(msg),
        }
    }
}
