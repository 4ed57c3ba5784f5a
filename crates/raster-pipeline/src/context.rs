//! Per-image pipeline state.
//!
//! A [`PipelineContext`] is created for each processed image and carries
//! the caller settings, the per-frame facts read from the container
//! (orientation, profiles, animation properties), the current chain head,
//! and the profiler registrations. The chain owns its transforms: each
//! wrapper exclusively owns its upstream, so dropping the context tears
//! the whole pipeline down in reverse construction order.

use crate::animation::AnimationState;
use crate::codec::FrameMetadata;
use crate::profile::ColorProfile;
use crate::settings::{ProcessImageSettings, ResolvedSettings};
use raster_core::profiler::{ProfilerEntry, SourceProfiler};
use raster_core::{Orientation, PixelSource, PlanarSource};
use raster_ops::planar::YccMatrix;
use std::rc::Rc;
use std::sync::Arc;

/// The current head of the pipeline under construction.
pub enum PipelineSource {
    /// A single interleaved (or grey) chain.
    Interleaved(Box<dyn PixelSource>),
    /// Three planar chains awaiting the merge step.
    Planar {
        /// The plane bundle.
        planar: PlanarSource,
        /// Matrix declared by the frame, or the BT.601 default.
        matrix: YccMatrix,
    },
}

impl PipelineSource {
    /// Presentation dimensions of the current head.
    pub fn dims(&self) -> (u32, u32) {
        match self {
            Self::Interleaved(s) => (s.width(), s.height()),
            Self::Planar { planar, .. } => (planar.width(), planar.height()),
        }
    }
}

/// Facts about the frame being processed, captured from the container.
#[derive(Default)]
pub struct FrameInfo {
    /// Exif orientation declared by the frame.
    pub orientation: Option<Orientation>,
    /// Raw ICC profile bytes.
    pub icc_profile: Option<Vec<u8>>,
    /// Raw Exif bytes.
    pub exif: Option<Vec<u8>>,
    /// Animation properties of this frame.
    pub animation: Option<crate::codec::AnimationFrame>,
    /// Palette of an indexed frame.
    pub palette: Option<Vec<u32>>,
    /// Whether the decoder reports inverted CMYK.
    pub inverted_cmyk: bool,
}

/// Pipeline-scoped mutable state.
pub struct PipelineContext {
    /// Caller settings.
    pub settings: ProcessImageSettings,
    /// Settings resolved against the frame, once `fixup` ran.
    pub resolved: Option<ResolvedSettings>,
    /// Orientation the pipeline realizes (`Normal` when preserved).
    pub orientation: Orientation,
    /// Frame facts.
    pub info: FrameInfo,
    /// Profile of the decoded pixels.
    pub source_profile: Arc<ColorProfile>,
    /// Profile of the encoded output.
    pub dest_profile: Arc<ColorProfile>,
    /// Metadata accumulated for the encoder.
    pub metadata: FrameMetadata,
    /// Animation replay state, shared across an animation's frames.
    pub animation: Option<AnimationState>,
    profilers: Vec<Rc<SourceProfiler>>,
}

impl PipelineContext {
    /// Creates a context for one image.
    pub fn new(settings: ProcessImageSettings) -> Self {
        Self {
            settings,
            resolved: None,
            orientation: Orientation::Normal,
            info: FrameInfo::default(),
            source_profile: Arc::new(ColorProfile::Srgb),
            dest_profile: Arc::new(ColorProfile::Srgb),
            metadata: FrameMetadata::default(),
            animation: None,
            profilers: Vec::new(),
        }
    }

    /// Registers a source's profiler for the final report.
    pub fn register_profiler(&mut self, source: &dyn PixelSource) {
        if let Some(p) = source.profiler() {
            self.profilers.push(p);
        }
    }

    /// Timing entries of every registered source, in registration order.
    pub fn profiler_report(&self) -> Vec<ProfilerEntry> {
        self.profilers.iter().map(|p| ProfilerEntry::from(&**p)).collect()
    }
}
