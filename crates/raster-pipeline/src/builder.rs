//! Pipeline assembly.
//!
//! Given the resolved settings and the frame's root source, the builder
//! appends transforms in the canonical order, skipping every step the
//! settings make unnecessary:
//!
//! 1. native decoder scaling and cropping (negotiated by the processor)
//! 2. animation frame buffering (composed by the processor)
//! 3. color profile read
//! 4. orientation
//! 5. crop (snapped to the subsampling grid for planar sources)
//! 6. format normalization to Grey8 / Bgr24 / Bgra32 / Pbgra32
//! 7. hybrid box pre-scale
//! 8. conversion to the working format (linear float or UQ15)
//! 9. high-quality resample (per plane for planar sources)
//! 10. color-space transform
//! 11. sharpen
//! 12. matte
//! 13. pad
//! 14. planar merge
//! 15. conversion to the external format
//! 16. indexed conversion for palette encoders
//!
//! The pad step is byte-oriented, so its transform physically attaches
//! after the external conversion; its canonical slot is a no-op there.

use crate::codec::Encoder;
use crate::context::{PipelineContext, PipelineSource};
use crate::profile::ColorTransformSource;
use crate::settings::{BlendingMode, WorkingDepth};
use raster_core::{
    ChromaSubsampling, Error, FormatId, Orientation, PixelArea, PixelSource, PlanarSource, Result,
};
use raster_ops::boxscale::BoxScaleSource;
use raster_ops::convert::ConversionSource;
use raster_ops::crop::CropSource;
use raster_ops::matte::MatteSource;
use raster_ops::orient::OrientSource;
use raster_ops::pad::PadSource;
use raster_ops::palette::{Palette, PaletteSource};
use raster_ops::planar::{chroma_resample_offsets, PlanarMergeSource};
use raster_ops::quantize::IndexedSource;
use raster_ops::resample::ScalerSource;
use raster_ops::sharpen::SharpenSource;
use raster_ops::swizzle::SwizzleSource;
use tracing::debug;

/// Appends a transform and registers its profiler with the context.
macro_rules! push {
    ($ctx:expr, $prev:ident, $make:expr) => {{
        let source = $make;
        $ctx.register_profiler(&source);
        $prev = Box::new(source);
    }};
}

fn convert_to(
    ctx: &mut PipelineContext,
    prev: Box<dyn PixelSource>,
    to: FormatId,
) -> Result<Box<dyn PixelSource>> {
    if prev.format().id == to {
        return Ok(prev);
    }
    let mut prev = prev;
    push!(ctx, prev, ConversionSource::new(prev, to)?);
    Ok(prev)
}

/// Whether linear-light math applies to this pipeline.
fn wants_linear(ctx: &PipelineContext, source_format: FormatId) -> bool {
    use raster_core::{PixelFormat, ValueEncoding};
    ctx.settings.blend == BlendingMode::Linear
        && PixelFormat::from_id(source_format).encoding == ValueEncoding::Companded
}

/// The float/UQ15 working format for a normalized 8-bit format.
fn working_format(normalized: FormatId, linear: bool, fixed: bool) -> Option<FormatId> {
    use FormatId as F;
    Some(match (normalized, linear, fixed) {
        (F::Grey8, true, true) => F::Grey16UQ15Linear,
        (F::Grey8, true, false) => F::Grey32FloatLinear,
        (F::Grey8, false, _) => F::Grey32Float,
        (F::Y8, true, true) => F::Y16UQ15Linear,
        (F::Y8, true, false) => F::Y32FloatLinear,
        (F::Y8 | F::Y8Video, false, _) | (F::Y8Video, true, _) => F::Y32Float,
        (F::Cb8 | F::Cb8Video, ..) => F::Cb32Float,
        (F::Cr8 | F::Cr8Video, ..) => F::Cr32Float,
        (F::Bgr24, true, true) => F::Bgr48UQ15Linear,
        (F::Bgr24, true, false) => F::Bgr96FloatLinear,
        (F::Bgr24, false, _) => F::Bgr96Float,
        (F::Bgra32, true, true) => F::Pbgra64UQ15Linear,
        (F::Bgra32, true, false) => F::Pbgra128FloatLinear,
        (F::Bgra32, false, _) => F::Pbgra128Float,
        _ => return None,
    })
}

/// The 8-bit external format a working format narrows back to.
fn external_format(working: FormatId) -> FormatId {
    use FormatId as F;
    match working {
        F::Grey16UQ15Linear | F::Grey32FloatLinear | F::Grey32Float | F::Grey8 => F::Grey8,
        F::Y16UQ15Linear | F::Y32FloatLinear | F::Y32Float | F::Y8 | F::Y8Video => F::Y8,
        F::Bgr48UQ15Linear
        | F::Bgr96FloatLinear
        | F::Bgr96Float
        | F::Bgrx128Float
        | F::Bgrx128FloatLinear
        | F::Bgr24 => F::Bgr24,
        F::Pbgra64UQ15Linear
        | F::Pbgra128Float
        | F::Pbgra128FloatLinear
        | F::Bgra32
        | F::Pbgra32 => F::Bgra32,
        other => other,
    }
}

/// Builds the full transform chain over a frame source.
///
/// `ctx.resolved` must be populated by `fixup` before calling. Returns
/// the chain head the encoder pulls from.
pub fn build(
    ctx: &mut PipelineContext,
    source: PipelineSource,
    encoder: &dyn Encoder,
) -> Result<Box<dyn PixelSource>> {
    let head = match source {
        PipelineSource::Interleaved(src) => build_interleaved(ctx, src)?,
        PipelineSource::Planar { planar, matrix } => build_planar(ctx, planar, matrix)?,
    };
    negotiate_external(ctx, head, encoder)
}

fn build_interleaved(
    ctx: &mut PipelineContext,
    mut prev: Box<dyn PixelSource>,
) -> Result<Box<dyn PixelSource>> {
    let resolved = ctx
        .resolved
        .clone()
        .ok_or_else(|| Error::invalid_parameter("settings were not resolved".to_string()))?;

    // Orientation, then crop in presentation coordinates.
    if ctx.orientation != Orientation::Normal {
        push!(ctx, prev, OrientSource::new(prev, ctx.orientation)?);
    }
    if resolved.crop != PixelArea::of(prev.width(), prev.height()) {
        push!(ctx, prev, CropSource::new(prev, resolved.crop)?);
    }

    // Normalize the external format.
    prev = normalize(ctx, prev)?;
    if prev.format().id == FormatId::Cmyk32 {
        return Err(Error::unsupported(
            "CMYK input requires a color transform provider".to_string(),
        ));
    }

    if resolved.hybrid_ratio > 1 {
        push!(ctx, prev, BoxScaleSource::new(prev, resolved.hybrid_ratio)?);
    }

    let (inner_w, inner_h) = resolved.inner_size;
    let needs_scale = (prev.width(), prev.height()) != (inner_w, inner_h);
    let needs_color = !ctx.source_profile.is_srgb();
    let sharpen = ctx.settings.sharpen.is_enabled();
    let matte = ctx.settings.matte.filter(|_| prev.format().has_alpha());
    let needs_working = needs_scale || needs_color || sharpen || matte.is_some();

    if needs_working {
        let normalized = prev.format().id;
        // Profile math runs in linear light regardless of blend mode;
        // sharpening and profile math run on float lanes.
        let linear = wants_linear(ctx, normalized) || needs_color;
        let fixed = ctx.settings.depth == WorkingDepth::Fixed && !sharpen && !needs_color;

        if normalized == FormatId::Pbgra32 {
            // Straighten the alpha so the gamma-aware widening applies.
            prev = convert_to(ctx, prev, FormatId::Bgra32)?;
        }
        let target = working_format(prev.format().id, linear, fixed).ok_or_else(|| {
            Error::unsupported_format(prev.format().id.name(), "working conversion")
        })?;
        prev = convert_to(ctx, prev, target)?;

        if needs_scale {
            push!(
                ctx,
                prev,
                ScalerSource::new(prev, inner_w, inner_h, ctx.settings.interpolation)?
            );
        }
        if needs_color {
            let profile = ctx.source_profile.clone();
            push!(ctx, prev, ColorTransformSource::new(prev, &profile)?);
        }
        if sharpen {
            push!(ctx, prev, SharpenSource::new(prev, ctx.settings.sharpen)?);
        }
        if let Some(color) = matte {
            push!(ctx, prev, MatteSource::new(prev, color)?);
        }
    }

    Ok(prev)
}

fn build_planar(
    ctx: &mut PipelineContext,
    planar: PlanarSource,
    matrix: raster_ops::YccMatrix,
) -> Result<Box<dyn PixelSource>> {
    let resolved = ctx
        .resolved
        .clone()
        .ok_or_else(|| Error::invalid_parameter("settings were not resolved".to_string()))?;
    let PlanarSource {
        mut y,
        mut cb,
        mut cr,
        subsampling,
        chroma_position,
        mut crop_offset,
    } = planar;
    let (rx, ry) = subsampling.ratios();

    // Orientation applies per plane.
    if ctx.orientation != Orientation::Normal {
        let o = ctx.orientation;
        push_plane(ctx, &mut y, |p| OrientSource::new(p, o))?;
        push_plane(ctx, &mut cb, |p| OrientSource::new(p, o))?;
        push_plane(ctx, &mut cr, |p| OrientSource::new(p, o))?;
    }

    // Crop: luma exact, chroma snapped to the subsampling grid with the
    // origin slack recorded as a sub-pixel offset.
    if resolved.crop != PixelArea::of(y.width(), y.height()) {
        let crop = resolved.crop;
        let snapped = crop.snap_to_grid(rx, ry);
        let chroma_crop = PixelArea::new(
            snapped.x / rx,
            snapped.y / ry,
            snapped.width / rx,
            snapped.height / ry,
        );
        crop_offset.0 += (crop.x - snapped.x) as f32;
        crop_offset.1 += (crop.y - snapped.y) as f32;

        push_plane(ctx, &mut y, |p| CropSource::new(p, crop))?;
        push_plane(ctx, &mut cb, |p| CropSource::new(p, chroma_crop))?;
        push_plane(ctx, &mut cr, |p| CropSource::new(p, chroma_crop))?;
    }

    if resolved.hybrid_ratio > 1 {
        let ratio = resolved.hybrid_ratio;
        push_plane(ctx, &mut y, |p| BoxScaleSource::new(p, ratio))?;
        push_plane(ctx, &mut cb, |p| BoxScaleSource::new(p, ratio))?;
        push_plane(ctx, &mut cr, |p| BoxScaleSource::new(p, ratio))?;
        crop_offset.0 /= ratio as f32;
        crop_offset.1 /= ratio as f32;
    }

    let (inner_w, inner_h) = resolved.inner_size;
    let needs_scale = (y.width(), y.height()) != (inner_w, inner_h)
        || subsampling != ChromaSubsampling::Subsample444
        || crop_offset != (0.0, 0.0);
    let sharpen = ctx.settings.sharpen.is_enabled();

    if needs_scale || sharpen {
        // Working conversion per plane, then per-plane resample. Chroma
        // upsampling folds into the chroma resample via its offsets.
        let linear = wants_linear(ctx, y.format().id);
        let fixed = ctx.settings.depth == WorkingDepth::Fixed && !sharpen;

        let y_target = working_format(y.format().id, linear, fixed)
            .ok_or_else(|| Error::unsupported_format(y.format().id.name(), "working conversion"))?;
        let cb_target = working_format(cb.format().id, false, false)
            .ok_or_else(|| Error::unsupported_format(cb.format().id.name(), "working conversion"))?;
        let cr_target = working_format(cr.format().id, false, false)
            .ok_or_else(|| Error::unsupported_format(cr.format().id.name(), "working conversion"))?;

        let mut tmp = y;
        tmp = convert_to(ctx, tmp, y_target)?;
        if needs_scale {
            push!(
                ctx,
                tmp,
                ScalerSource::new(tmp, inner_w, inner_h, ctx.settings.interpolation)?
            );
        }
        if sharpen {
            push!(ctx, tmp, SharpenSource::new(tmp, ctx.settings.sharpen)?);
        }
        // Back to 8 bits so the merge sees uniform planes.
        tmp = convert_to(ctx, tmp, FormatId::Y8)?;
        y = tmp;

        let (ox, oy) = chroma_resample_offsets(chroma_position, subsampling, crop_offset);
        let mut tmp = cb;
        tmp = convert_to(ctx, tmp, cb_target)?;
        push!(
            ctx,
            tmp,
            ScalerSource::with_offsets(tmp, inner_w, inner_h, ctx.settings.interpolation, ox, oy)?
        );
        tmp = convert_to(ctx, tmp, FormatId::Cb8)?;
        cb = tmp;

        let mut tmp = cr;
        tmp = convert_to(ctx, tmp, cr_target)?;
        push!(
            ctx,
            tmp,
            ScalerSource::with_offsets(tmp, inner_w, inner_h, ctx.settings.interpolation, ox, oy)?
        );
        tmp = convert_to(ctx, tmp, FormatId::Cr8)?;
        cr = tmp;
    }

    let merged_planes = PlanarSource::new(y, cb, cr, chroma_position)?;
    let mut prev: Box<dyn PixelSource> = {
        let merge = PlanarMergeSource::new(merged_planes, matrix)?;
        ctx.register_profiler(&merge);
        Box::new(merge)
    };

    // A lingering profile applies after the merge on float lanes.
    if !ctx.source_profile.is_srgb() {
        prev = convert_to(ctx, prev, FormatId::Bgr24)?;
        prev = convert_to(ctx, prev, FormatId::Bgr96FloatLinear)?;
        let profile = ctx.source_profile.clone();
        push!(ctx, prev, ColorTransformSource::new(prev, &profile)?);
    }

    Ok(prev)
}

fn push_plane<S, F>(
    ctx: &mut PipelineContext,
    plane: &mut Box<dyn PixelSource>,
    make: F,
) -> Result<()>
where
    S: PixelSource + 'static,
    F: FnOnce(Box<dyn PixelSource>) -> Result<S>,
{
    let taken = std::mem::replace(plane, Box::new(raster_core::EmptySource::new(
        FormatId::Grey8,
        1,
        1,
    )));
    let source = make(taken)?;
    ctx.register_profiler(&source);
    *plane = Box::new(source);
    Ok(())
}

fn normalize(
    ctx: &mut PipelineContext,
    prev: Box<dyn PixelSource>,
) -> Result<Box<dyn PixelSource>> {
    use FormatId as F;
    let mut prev = prev;
    match prev.format().id {
        F::Rgb24 => push!(ctx, prev, SwizzleSource::new(prev, F::Bgr24)?),
        F::Rgba32 => push!(ctx, prev, SwizzleSource::new(prev, F::Bgra32)?),
        F::Bgrx32 => push!(ctx, prev, SwizzleSource::new(prev, F::Bgr24)?),
        F::Indexed8 => {
            let entries = ctx.info.palette.clone().ok_or_else(|| {
                Error::corrupt_stream("indexed frame carries no palette".to_string())
            })?;
            let palette = Palette::new(entries)?;
            push!(ctx, prev, PaletteSource::new(prev, palette)?);
        }
        F::Cmyk32 if ctx.info.inverted_cmyk => {
            push!(ctx, prev, ConversionSource::inverted(prev)?);
        }
        _ => {}
    }
    Ok(prev)
}

fn negotiate_external(
    ctx: &mut PipelineContext,
    prev: Box<dyn PixelSource>,
    encoder: &dyn Encoder,
) -> Result<Box<dyn PixelSource>> {
    let resolved = ctx
        .resolved
        .clone()
        .ok_or_else(|| Error::invalid_parameter("settings were not resolved".to_string()))?;

    // Convert to the 8-bit external format, dropping the alpha channel
    // when an opaque matte flattened it and the image is not animated.
    let flatten =
        ctx.settings.flattens_alpha() && ctx.animation.is_none() && ctx.metadata.animation.is_none();
    let external = external_format(prev.format().id);
    let mut prev = convert_to(ctx, prev, external)?;
    if prev.format().id == FormatId::Bgra32 && flatten {
        push!(ctx, prev, SwizzleSource::new(prev, FormatId::Bgr24)?);
    }

    // Pad to the outer canvas.
    if resolved.outer_size != (prev.width(), prev.height()) {
        let matte = ctx.settings.matte.unwrap_or(raster_ops::MatteColor::BLACK);
        let fill: Vec<u8> = match prev.format().id {
            FormatId::Grey8 | FormatId::Y8 => vec![matte.b],
            FormatId::Bgr24 => matte.bgr().to_vec(),
            _ => matte.bgra().to_vec(),
        };
        push!(
            ctx,
            prev,
            PadSource::new(
                prev,
                PixelArea::of(resolved.outer_size.0, resolved.outer_size.1),
                resolved.inner_rect,
                &fill,
            )?
        );
    }

    // Encoder format negotiation, possibly through the quantizer.
    if !encoder.supports_pixel_format(prev.format().id) {
        let closest = encoder.closest_pixel_format(prev.format().id);
        debug!(from = %prev.format().id, to = %closest, "encoder forced format conversion");
        if closest == FormatId::Indexed8 {
            if matches!(prev.format().id, FormatId::Grey8 | FormatId::Y8) {
                push!(ctx, prev, SwizzleSource::new(prev, FormatId::Bgra32)?);
            }
            let quantized = IndexedSource::new(prev, ctx.settings.dither)?;
            ctx.register_profiler(&quantized);
            ctx.metadata.palette = Some(quantized.palette().entries().to_vec());
            prev = Box::new(quantized);
        } else if raster_ops::swizzle::can_swizzle(prev.format().id, closest) {
            push!(ctx, prev, SwizzleSource::new(prev, closest)?);
        } else {
            prev = convert_to(ctx, prev, closest)?;
        }
    }
    Ok(prev)
}
