//! # raster-pipeline
//!
//! Pipeline assembly and codec contracts for raster-rs.
//!
//! This crate turns a decoded frame into an encoded one: it resolves the
//! caller's [`ProcessImageSettings`] against the frame, negotiates
//! decoder and encoder capabilities, assembles the transform chain from
//! `raster-ops` building blocks in the canonical order, and drives the
//! encoder pull.
//!
//! # Modules
//!
//! - [`codec`] - Decoder/encoder adapter traits and metadata contracts
//! - [`settings`] - Processing settings and `fixup` resolution
//! - [`profile`] - Color profiles, the process-wide cache, and the
//!   color-space transform
//! - [`context`] - Per-image pipeline state
//! - [`animation`] - Screen-buffer replay for animated containers
//! - [`builder`] - Canonical chain assembly
//! - [`processor`] - The top-level `process_image` entry point
//!
//! # Example
//!
//! ```rust,ignore
//! use raster_pipeline::{process_image, ProcessImageSettings};
//!
//! let settings = ProcessImageSettings {
//!     width: 640,
//!     height: 480,
//!     ..Default::default()
//! };
//! process_image(&mut container, &settings, &mut encoder)?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod animation;
pub mod builder;
pub mod codec;
pub mod context;
pub mod processor;
pub mod profile;
pub mod settings;

pub use processor::{process_image, process_image_with, ProcessImageResult};
pub use settings::{
    BlendingMode, ColorProfileMode, CropScaleMode, HybridMode, OrientationMode,
    ProcessImageSettings, ResolvedSettings, WorkingDepth,
};
