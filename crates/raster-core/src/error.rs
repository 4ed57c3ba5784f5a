//! Error types for pipeline operations.
//!
//! This module provides the unified error handling for every stage of the
//! raster pipeline: source pulls, format conversion, resampling, and the
//! codec boundaries.
//!
//! # Overview
//!
//! The [`Error`] enum covers the failure modes of:
//! - Pull-model pixel transfers (bounds, stride, buffer sizing)
//! - Transform construction (unsupported format / operation)
//! - Codec adapters (decode/encode failures, corrupt streams)
//! - The buffer pool (allocation failure)
//!
//! # Usage
//!
//! ```rust
//! use raster_core::{Error, Result};
//!
//! fn check_row(y: u32, height: u32) -> Result<()> {
//!     if y >= height {
//!         return Err(Error::invalid_area(0, y, 1, 1, 1, height));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Propagation
//!
//! Errors from an upstream source's `copy_pixels` propagate unchanged
//! through the chain; no transform swallows them. Codec, corrupt-stream,
//! and allocation errors are fatal for the pipeline; argument errors leave
//! the pipeline usable if the caller retries with valid arguments.

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during raster pipeline operations.
///
/// This enum uses [`thiserror`] for automatic [`std::error::Error`] and
/// [`std::fmt::Display`] implementations.
///
/// # Categories
///
/// - **Argument errors**: [`InvalidArea`](Error::InvalidArea),
///   [`InvalidStride`](Error::InvalidStride),
///   [`BufferTooSmall`](Error::BufferTooSmall),
///   [`InvalidParameter`](Error::InvalidParameter)
/// - **Capability errors**: [`UnsupportedFormat`](Error::UnsupportedFormat),
///   [`Unsupported`](Error::Unsupported)
/// - **Codec errors**: [`Codec`](Error::Codec),
///   [`CorruptStream`](Error::CorruptStream)
/// - **Resource errors**: [`AllocationFailed`](Error::AllocationFailed)
#[derive(Debug, Error)]
pub enum Error {
    /// Requested area extends beyond the source bounds.
    #[error("area ({x}, {y}, {w}x{h}) exceeds source bounds {width}x{height}")]
    InvalidArea {
        /// Area X origin
        x: u32,
        /// Area Y origin
        y: u32,
        /// Area width
        w: u32,
        /// Area height
        h: u32,
        /// Source width
        width: u32,
        /// Source height
        height: u32,
    },

    /// Row stride is smaller than one line of the requested area.
    #[error("stride {stride} is less than minimum {min_stride}")]
    InvalidStride {
        /// Provided stride in bytes
        stride: usize,
        /// Minimum stride for the requested area
        min_stride: usize,
    },

    /// Destination buffer cannot hold the requested rows.
    #[error("buffer of {actual} bytes cannot hold {required} bytes")]
    BufferTooSmall {
        /// Bytes required by the request
        required: usize,
        /// Bytes provided
        actual: usize,
    },

    /// A parameter is outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The pixel format is not accepted by this transform.
    #[error("unsupported pixel format {format} for {operation}")]
    UnsupportedFormat {
        /// Stable identifier of the offending format
        format: &'static str,
        /// Operation that rejected it
        operation: &'static str,
    },

    /// The requested conversion has no implementation.
    ///
    /// Fatal for the pipeline: the builder could not assemble a chain that
    /// satisfies the settings (e.g. CMYK input without a color transform
    /// provider).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Failure reported by a decoder or encoder adapter.
    ///
    /// The adapter's message is carried verbatim. Fatal for the pipeline.
    #[error("codec error: {0}")]
    Codec(String),

    /// The decoder reported truncation or invalid markers. Fatal.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// The buffer pool could not allocate backing memory. Fatal.
    #[error("failed to allocate {requested} bytes")]
    AllocationFailed {
        /// Bytes requested
        requested: usize,
    },
}

impl Error {
    /// Creates an [`Error::InvalidArea`] error.
    #[inline]
    pub fn invalid_area(x: u32, y: u32, w: u32, h: u32, width: u32, height: u32) -> Self {
        Self::InvalidArea {
            x,
            y,
            w,
            h,
            width,
            height,
        }
    }

    /// Creates an [`Error::InvalidStride`] error.
    #[inline]
    pub fn invalid_stride(stride: usize, min_stride: usize) -> Self {
        Self::InvalidStride { stride, min_stride }
    }

    /// Creates an [`Error::BufferTooSmall`] error.
    #[inline]
    pub fn buffer_too_small(required: usize, actual: usize) -> Self {
        Self::BufferTooSmall { required, actual }
    }

    /// Creates an [`Error::InvalidParameter`] error.
    #[inline]
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates an [`Error::UnsupportedFormat`] error.
    #[inline]
    pub fn unsupported_format(format: &'static str, operation: &'static str) -> Self {
        Self::UnsupportedFormat { format, operation }
    }

    /// Creates an [`Error::Unsupported`] error.
    #[inline]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Creates an [`Error::Codec`] error.
    #[inline]
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Creates an [`Error::CorruptStream`] error.
    #[inline]
    pub fn corrupt_stream(msg: impl Into<String>) -> Self {
        Self::CorruptStream(msg.into())
    }

    /// Returns `true` if this error is an argument error the caller can
    /// retry past.
    #[inline]
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArea { .. }
                | Self::InvalidStride { .. }
                | Self::BufferTooSmall { .. }
                | Self::InvalidParameter(_)
        )
    }

    /// Returns `true` if this error aborts the pipeline.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unsupported(_)
                | Self::Codec(_)
                | Self::CorruptStream(_)
                | Self::AllocationFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_area_message() {
        let err = Error::invalid_area(10, 20, 30, 40, 25, 25);
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("30x40"));
        assert!(msg.contains("25x25"));
        assert!(err.is_argument_error());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::codec("jpeg: bad huffman table").is_fatal());
        assert!(Error::corrupt_stream("truncated").is_fatal());
        assert!(Error::AllocationFailed { requested: 1 << 40 }.is_fatal());
        assert!(!Error::invalid_stride(10, 12).is_fatal());
    }

    #[test]
    fn test_stride_message() {
        let err = Error::invalid_stride(100, 300);
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("300"));
    }
}
