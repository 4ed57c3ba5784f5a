//! # raster-core
//!
//! Core types for the raster-rs image processing pipeline.
//!
//! This crate provides the foundational types used throughout the
//! raster-rs workspace:
//!
//! - [`PixelFormat`] / [`FormatId`] - Interned pixel format registry
//! - [`PixelArea`], [`Orientation`] - Rectangle arithmetic and the 8-way
//!   Exif orientation algebra
//! - [`PixelSource`], [`ChainedSource`] - The pull-model line producer
//!   contract and the chain base
//! - [`PlanarSource`] - Y'CbCr plane bundles with subsampling metadata
//! - [`FrameBufferSource`] - Owned full-canvas rasters
//! - [`buffer`] - Pooled scratch buffers with scoped leases
//! - [`profiler`] - Per-source self-time hooks
//!
//! ## Design Philosophy
//!
//! The pipeline is a linear chain of pull-model sources. Each transform
//! wraps exactly one upstream and produces lines on demand, so memory
//! stays bounded by a few scanlines regardless of image size. Nothing in
//! this crate performs pixel math; the kernels live in `raster-ops` and
//! the assembly logic in `raster-pipeline`.
//!
//! ## Crate Structure
//!
//! This crate is the foundation of raster-rs and has no internal
//! dependencies. The other workspace crates depend on `raster-core`:
//!
//! ```text
//! raster-core (this crate)
//!    ^
//!    |
//!    +-- raster-ops (kernels, transforms)
//!    +-- raster-pipeline (builder, codecs, orchestration)
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` - Enable serialization for area/orientation metadata types

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod buffer;
pub mod error;
pub mod format;
pub mod framebuffer;
pub mod profiler;
pub mod rect;
pub mod source;

// Re-exports for convenience
pub use error::{Error, Result};
pub use format::{
    AlphaRepr, ColorRepr, FormatId, PixelFormat, PixelNumeric, ValueEncoding, ValueRange,
    UQ15_HALF, UQ15_ONE,
};
pub use framebuffer::FrameBufferSource;
pub use profiler::{ProfilerEntry, SourceProfiler};
pub use rect::{Orientation, PixelArea};
pub use source::{
    validate_copy, ChainedSource, ChromaPosition, ChromaSubsampling, EmptySource, PixelSource,
    PlanarSource,
};

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```
/// use raster_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::format::{
        AlphaRepr, ColorRepr, FormatId, PixelFormat, PixelNumeric, ValueEncoding, ValueRange,
        UQ15_ONE,
    };
    pub use crate::framebuffer::FrameBufferSource;
    pub use crate::rect::{Orientation, PixelArea};
    pub use crate::source::{
        ChainedSource, ChromaPosition, ChromaSubsampling, PixelSource, PlanarSource,
    };
}
