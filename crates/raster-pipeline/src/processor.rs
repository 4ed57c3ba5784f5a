//! Top-level image processing orchestration.
//!
//! [`process_image`] drives the whole flow: obtain a frame from the
//! container, resolve the settings against it, negotiate decoder
//! capabilities (native crop and scale), run the builder, and hand the
//! chain head to the encoder. Animations iterate the selected frame
//! range, replaying skipped frames into the screen buffer when their
//! disposal requires it.

use crate::animation::AnimationState;
use crate::builder;
use crate::codec::{AnimationFrame, Encoder, ImageContainer, ImageFrame};
use crate::context::{FrameInfo, PipelineContext, PipelineSource};
use crate::profile::{self, ColorProfile};
use crate::settings::{ColorProfileMode, OrientationMode, ProcessImageSettings};
use raster_core::{Error, Orientation, PixelArea, PixelSource, Result};
use raster_ops::convert::ConversionSource;
use raster_ops::palette::{Palette, PaletteSource};
use raster_ops::swizzle::{self, SwizzleSource};
use raster_ops::YccMatrix;
use std::sync::Arc;
use tracing::debug;

/// Summary of one completed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessImageResult {
    /// Output canvas dimensions.
    pub width: u32,
    /// Output canvas height.
    pub height: u32,
    /// Frames written.
    pub frames_written: u32,
    /// Per-source timing entries of the last frame's chain.
    pub profile: Vec<raster_core::ProfilerEntry>,
}

/// A hook turning raw ICC bytes into a [`ColorProfile`].
///
/// ICC parsing lives outside this workspace; `None` means the profile is
/// unreadable and pixels are treated as sRGB.
pub type ProfileParser<'a> = &'a dyn Fn(&[u8]) -> Option<ColorProfile>;

/// Processes one image with the default (sRGB-assuming) profile parser.
pub fn process_image(
    container: &mut dyn ImageContainer,
    settings: &ProcessImageSettings,
    encoder: &mut dyn Encoder,
) -> Result<ProcessImageResult> {
    process_image_with(container, settings, encoder, &|_| None)
}

/// Processes one image, parsing embedded profiles with `parser`.
pub fn process_image_with(
    container: &mut dyn ImageContainer,
    settings: &ProcessImageSettings,
    encoder: &mut dyn Encoder,
    parser: ProfileParser<'_>,
) -> Result<ProcessImageResult> {
    let frame_count = container.frame_count();
    if frame_count == 0 {
        return Err(Error::corrupt_stream("container holds no frames".to_string()));
    }

    let animation = container.animation().filter(|_| frame_count > 1);
    let range = match &settings.frame_range {
        Some(r) => r.start.min(frame_count)..r.end.min(frame_count),
        None => 0..if animation.is_some() { frame_count } else { 1 },
    };
    if range.is_empty() {
        return Err(Error::invalid_parameter(format!(
            "frame range selects no frames of {frame_count}"
        )));
    }

    let mut ctx = PipelineContext::new(settings.clone());

    if let Some(anim) = animation {
        if let Some(animated) = encoder.as_animated() {
            animated.write_animation_metadata(&anim)?;
        }
        ctx.animation = Some(AnimationState::new(anim)?);

        // Skipped leading frames replay onto the screen when any of them
        // leaves pixels behind.
        if range.start > 0 {
            let mut disposals = Vec::with_capacity(range.start as usize);
            for i in 0..range.start {
                let frame = container.frame(i)?;
                disposals.push(frame.animation().map(|a| a.disposal).unwrap_or_default());
            }
            if AnimationState::requires_replay(&disposals, range.start) {
                debug!(frames = range.start, "replaying skipped animation frames");
                for i in 0..range.start {
                    compose_animation_frame(container, i, &mut ctx)?;
                }
            }
        }
    }

    let mut result = ProcessImageResult {
        width: 0,
        height: 0,
        frames_written: 0,
        profile: Vec::new(),
    };

    for index in range {
        let (mut head, area) = build_frame(container, index, &mut ctx, encoder, parser)?;
        encoder.write_frame(head.as_mut(), &ctx.metadata, area)?;
        result.width = area.width;
        result.height = area.height;
        result.frames_written += 1;
        result.profile = ctx.profiler_report();
    }

    encoder.commit()?;
    Ok(result)
}

/// Reads the per-frame facts the builder needs.
fn read_frame_info(frame: &dyn ImageFrame) -> FrameInfo {
    let mut info = FrameInfo {
        orientation: frame.orientation(),
        animation: frame.animation(),
        palette: frame.palette().map(<[u32]>::to_vec),
        inverted_cmyk: frame.reports_inverted_cmyk(),
        ..FrameInfo::default()
    };
    if let Some(icc) = frame.icc_profile() {
        let mut bytes = vec![0u8; icc.profile_length()];
        if icc.copy_profile(&mut bytes).is_ok() {
            info.icc_profile = Some(bytes);
        }
    }
    if let Some(exif) = frame.exif() {
        let mut bytes = vec![0u8; exif.exif_length()];
        if exif.copy_exif(&mut bytes).is_ok() {
            info.exif = Some(bytes);
        }
    }
    info
}

/// Normalizes a decoded animation frame to straight 8-bit BGRA.
fn frame_to_bgra32(
    palette: Option<&[u32]>,
    mut src: Box<dyn PixelSource>,
) -> Result<Box<dyn PixelSource>> {
    use raster_core::FormatId as F;
    if src.format().id == F::Indexed8 {
        let entries = palette
            .ok_or_else(|| Error::corrupt_stream("indexed frame carries no palette".to_string()))?;
        src = Box::new(PaletteSource::new(src, Palette::new(entries.to_vec())?)?);
    }
    loop {
        match src.format().id {
            F::Bgra32 => return Ok(src),
            F::Pbgra32 => src = Box::new(ConversionSource::new(src, F::Bgra32)?),
            F::Rgb24 => src = Box::new(SwizzleSource::new(src, F::Bgr24)?),
            id if swizzle::can_swizzle(id, F::Bgra32) => {
                src = Box::new(SwizzleSource::new(src, F::Bgra32)?)
            }
            id => return Err(Error::unsupported_format(id.name(), "animation compose")),
        }
    }
}

/// Decodes frame `index`, composites it onto the animation screen, and
/// returns the frame's animation properties.
fn compose_animation_frame(
    container: &mut dyn ImageContainer,
    index: u32,
    ctx: &mut PipelineContext,
) -> Result<AnimationFrame> {
    let mut frame = container.frame(index)?;
    let meta = frame.animation().unwrap_or_default();
    let palette = frame.palette().map(<[u32]>::to_vec);
    let src = frame.pixel_source()?;
    let mut bgra = frame_to_bgra32(palette.as_deref(), src)?;
    let state = ctx
        .animation
        .as_mut()
        .ok_or_else(|| Error::invalid_parameter("no animation state".to_string()))?;
    state.compose_frame(bgra.as_mut(), &meta)?;
    Ok(meta)
}

/// Resolves settings, negotiates decoder capabilities, and builds the
/// chain for one frame.
fn build_frame(
    container: &mut dyn ImageContainer,
    index: u32,
    ctx: &mut PipelineContext,
    encoder: &dyn Encoder,
    parser: ProfileParser<'_>,
) -> Result<(Box<dyn PixelSource>, PixelArea)> {
    // Animated containers composite the frame onto the screen and feed
    // the screen snapshot through the pipeline.
    if ctx.animation.is_some() {
        let meta = compose_animation_frame(container, index, ctx)?;
        let state = ctx
            .animation
            .as_mut()
            .ok_or_else(|| Error::invalid_parameter("no animation state".to_string()))?;
        let screen = state.screen_source()?;
        ctx.info = FrameInfo::default();
        ctx.metadata = crate::codec::FrameMetadata::default();
        ctx.metadata.animation = Some(meta);
        ctx.orientation = Orientation::Normal;
        let resolved = ctx.settings.fixup(screen.width(), screen.height())?;
        let area = PixelArea::of(resolved.outer_size.0, resolved.outer_size.1);
        ctx.resolved = Some(resolved);
        let head = builder::build(ctx, PipelineSource::Interleaved(Box::new(screen)), encoder)?;
        return Ok((head, area));
    }

    let mut frame = container.frame(index)?;
    ctx.info = read_frame_info(frame.as_ref());
    ctx.metadata = crate::codec::FrameMetadata::default();
    ctx.metadata.exif = ctx.info.exif.clone();

    ctx.orientation = match ctx.settings.orientation_mode {
        OrientationMode::Normalize => ctx.info.orientation.unwrap_or_default(),
        OrientationMode::Preserve => Orientation::Normal,
    };

    // Color profile read: preserve only when the encoder can embed it;
    // otherwise fall back to converting pixels to sRGB.
    let preserve = ctx.settings.profile_mode == ColorProfileMode::Preserve
        && encoder.supports_color_profile();
    ctx.source_profile = match (&ctx.info.icc_profile, preserve) {
        (Some(bytes), false) => profile::cached(bytes, parser),
        (Some(bytes), true) => {
            ctx.metadata.icc_profile = Some(bytes.clone());
            Arc::new(ColorProfile::Srgb)
        }
        (None, _) => Arc::new(ColorProfile::Srgb),
    };

    let (mut sw, mut sh) = (frame.width(), frame.height());
    let mut eff = ctx.settings.clone();
    let (pw, ph) = ctx.orientation.oriented_dims(sw, sh);
    let mut resolved = eff.fixup(pw, ph)?;

    // Native decode crop.
    if resolved.crop != PixelArea::of(pw, ph) {
        let storage = ctx.orientation.de_orient(resolved.crop, sw, sh);
        if let Some(cropper) = frame.as_cropped_decoder() {
            if cropper.set_decode_crop(storage).is_ok() {
                sw = storage.width;
                sh = storage.height;
                eff.crop = None;
                let (pw, ph) = ctx.orientation.oriented_dims(sw, sh);
                resolved = eff.fixup(pw, ph)?;
            }
        }
    }

    // Native decode scale, when no crop remains in the way.
    let (opw, oph) = ctx.orientation.oriented_dims(sw, sh);
    if resolved.hybrid_ratio > 1 && resolved.crop == PixelArea::of(opw, oph) {
        if let Some(scaler) = frame.as_scaled_decoder() {
            if let Ok((nw, nh)) = scaler.set_decode_scale(resolved.hybrid_ratio) {
                debug!(ratio = resolved.hybrid_ratio, nw, nh, "native decoder scaling");
                sw = nw;
                sh = nh;
                let (pw, ph) = ctx.orientation.oriented_dims(sw, sh);
                resolved = eff.fixup(pw, ph)?;
            }
        }
    }

    ctx.settings = eff;
    let area = PixelArea::of(resolved.outer_size.0, resolved.outer_size.1);
    ctx.resolved = Some(resolved);

    let source = match frame.as_ycc() {
        Some(ycc) => {
            let matrix = ycc.matrix().unwrap_or(YccMatrix::Bt601);
            let mut planar = ycc.planes()?;
            planar.chroma_position = ycc.chroma_position();
            PipelineSource::Planar { planar, matrix }
        }
        None => PipelineSource::Interleaved(frame.pixel_source()?),
    };

    let head = builder::build(ctx, source, encoder)?;
    Ok((head, area))
}
