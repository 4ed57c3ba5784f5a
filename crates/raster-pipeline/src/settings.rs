//! Processing settings and their resolution against a source frame.
//!
//! [`ProcessImageSettings`] is what callers hand in: target dimensions,
//! crop, scaling mode, interpolation, gamma handling, sharpening, matte.
//! [`ProcessImageSettings::fixup`] resolves them against the decoded
//! frame's (oriented) dimensions into a [`ResolvedSettings`]: the source
//! crop, inner and outer sizes, the inner rectangle placement, and the
//! hybrid pre-scale ratio.

use raster_core::{Error, PixelArea, Result};
use raster_ops::quantize::DitherMode;
use raster_ops::{Interpolation, MatteColor, SharpenSettings};

/// How the source maps onto the target dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CropScaleMode {
    /// Scale to fit within the target box, preserving aspect.
    #[default]
    Contain,
    /// Scale to cover the target box, cropping the overflow.
    Cover,
    /// Scale to the exact target, ignoring aspect.
    Stretch,
    /// Crop the source to the target aspect, then fill the target.
    Crop,
    /// Like `Contain`, then pad to the target canvas with the matte.
    Pad,
}

/// When the hybrid box pre-scaler may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HybridMode {
    /// Never pre-scale.
    Off,
    /// Resample the full input.
    #[default]
    FavorQuality,
    /// Box pre-scale at power-of-two ratios, resample the remainder.
    FavorSpeed,
    /// Like `FavorSpeed`; reserved for the fastest settings.
    Turbo,
}

impl HybridMode {
    /// Whether this mode allows the box pre-scaler.
    #[inline]
    pub fn allows_prescale(&self) -> bool {
        matches!(self, Self::FavorSpeed | Self::Turbo)
    }
}

/// Gamma handling for blending and resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendingMode {
    /// Convert companded sources to linear light for pixel math.
    #[default]
    Linear,
    /// Blend on companded values.
    Companded,
}

/// Numeric working representation for the high-quality phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WorkingDepth {
    /// 32-bit float lanes.
    #[default]
    Float,
    /// UQ15 fixed-point lanes.
    Fixed,
}

/// What to do with a frame's Exif orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OrientationMode {
    /// Realize the orientation so output pixels are upright.
    #[default]
    Normalize,
    /// Keep storage order; pass the tag through.
    Preserve,
}

/// What to do with embedded color profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorProfileMode {
    /// Convert pixels to sRGB and drop the profile.
    #[default]
    ConvertToSrgb,
    /// Keep source pixels and embed the profile when the encoder can.
    Preserve,
}

/// Caller-facing processing settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessImageSettings {
    /// Target width; 0 derives it from the height and source aspect.
    pub width: u32,
    /// Target height; 0 derives it from the width and source aspect.
    pub height: u32,
    /// Source crop in presentation coordinates; `None` uses the full frame.
    pub crop: Option<PixelArea>,
    /// Scaling mode.
    pub mode: CropScaleMode,
    /// Resampling kernel.
    pub interpolation: Interpolation,
    /// Hybrid pre-scale policy.
    pub hybrid: HybridMode,
    /// Gamma handling.
    pub blend: BlendingMode,
    /// Working numeric representation.
    pub depth: WorkingDepth,
    /// Unsharp-mask settings; disabled amounts are skipped.
    pub sharpen: SharpenSettings,
    /// Matte color for alpha flattening and padding.
    pub matte: Option<MatteColor>,
    /// Dither policy for indexed output.
    pub dither: DitherMode,
    /// Exif orientation handling.
    pub orientation_mode: OrientationMode,
    /// Color profile handling.
    pub profile_mode: ColorProfileMode,
    /// Frames to emit from an animation; `None` emits all.
    pub frame_range: Option<std::ops::Range<u32>>,
}

impl Default for ProcessImageSettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            crop: None,
            mode: CropScaleMode::default(),
            interpolation: Interpolation::default(),
            hybrid: HybridMode::default(),
            blend: BlendingMode::default(),
            depth: WorkingDepth::default(),
            sharpen: SharpenSettings::default(),
            matte: None,
            dither: DitherMode::default(),
            orientation_mode: OrientationMode::default(),
            profile_mode: ColorProfileMode::default(),
            frame_range: None,
        }
    }
}

/// Settings resolved against a concrete source frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    /// Source window in presentation coordinates.
    pub crop: PixelArea,
    /// Scaled content dimensions.
    pub inner_size: (u32, u32),
    /// Final canvas dimensions.
    pub outer_size: (u32, u32),
    /// Placement of the content on the canvas.
    pub inner_rect: PixelArea,
    /// Power-of-two box pre-scale ratio; 1 disables the pre-scaler.
    pub hybrid_ratio: u32,
}

#[inline]
fn scaled_dim(size: u32, num: f64, den: f64) -> u32 {
    ((f64::from(size) * num / den).round() as u32).max(1)
}

impl ProcessImageSettings {
    /// Resolves the settings against the (already oriented) source
    /// dimensions.
    pub fn fixup(&self, source_w: u32, source_h: u32) -> Result<ResolvedSettings> {
        if source_w == 0 || source_h == 0 {
            return Err(Error::invalid_parameter(format!(
                "source is empty: {source_w}x{source_h}"
            )));
        }
        let mut crop = self.crop.unwrap_or(PixelArea::of(source_w, source_h));
        crop.check_bounds(source_w, source_h)?;

        // Auto dimensions derive from the crop aspect.
        let (cw, ch) = (crop.width, crop.height);
        let (tw, th) = match (self.width, self.height) {
            (0, 0) => (cw, ch),
            (0, h) => (scaled_dim(h, f64::from(cw), f64::from(ch)), h),
            (w, 0) => (w, scaled_dim(w, f64::from(ch), f64::from(cw))),
            (w, h) => (w, h),
        };

        let (inner, outer, inner_rect) = match self.mode {
            CropScaleMode::Stretch => ((tw, th), (tw, th), PixelArea::of(tw, th)),
            CropScaleMode::Contain | CropScaleMode::Pad => {
                let scale =
                    (f64::from(tw) / f64::from(cw)).min(f64::from(th) / f64::from(ch));
                let iw = scaled_dim(cw, scale, 1.0).min(tw);
                let ih = scaled_dim(ch, scale, 1.0).min(th);
                if self.mode == CropScaleMode::Pad {
                    let rect = PixelArea::new((tw - iw) / 2, (th - ih) / 2, iw, ih);
                    ((iw, ih), (tw, th), rect)
                } else {
                    ((iw, ih), (iw, ih), PixelArea::of(iw, ih))
                }
            }
            CropScaleMode::Cover | CropScaleMode::Crop => {
                let scale =
                    (f64::from(tw) / f64::from(cw)).max(f64::from(th) / f64::from(ch));
                // Shrink the crop to the target aspect, centered.
                let need_w = scaled_dim(tw, 1.0, scale).min(cw);
                let need_h = scaled_dim(th, 1.0, scale).min(ch);
                crop = PixelArea::new(
                    crop.x + (cw - need_w) / 2,
                    crop.y + (ch - need_h) / 2,
                    need_w,
                    need_h,
                );
                ((tw, th), (tw, th), PixelArea::of(tw, th))
            }
        };

        let hybrid_ratio = if self.hybrid.allows_prescale() && !self.interpolation.is_point_sampler()
        {
            let rx = crop.width / inner.0.max(1);
            let ry = crop.height / inner.1.max(1);
            let r = rx.min(ry);
            if r >= 2 {
                // Largest power of two not exceeding the ratio.
                1u32 << (31 - r.leading_zeros())
            } else {
                1
            }
        } else {
            1
        };

        Ok(ResolvedSettings {
            crop,
            inner_size: inner,
            outer_size: outer,
            inner_rect,
            hybrid_ratio,
        })
    }

    /// Whether the output keeps an alpha channel after this pipeline.
    pub fn flattens_alpha(&self) -> bool {
        self.matte.map(|m| m.is_opaque()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(w: u32, h: u32, mode: CropScaleMode) -> ProcessImageSettings {
        ProcessImageSettings {
            width: w,
            height: h,
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_contain_letterboxes() {
        let r = settings(640, 640, CropScaleMode::Contain)
            .fixup(1920, 1080)
            .unwrap();
        assert_eq!(r.inner_size, (640, 360));
        assert_eq!(r.outer_size, (640, 360));
        assert_eq!(r.hybrid_ratio, 1);
    }

    #[test]
    fn test_pad_centers_content() {
        let r = settings(640, 640, CropScaleMode::Pad)
            .fixup(1920, 1080)
            .unwrap();
        assert_eq!(r.inner_size, (640, 360));
        assert_eq!(r.outer_size, (640, 640));
        assert_eq!(r.inner_rect, PixelArea::new(0, 140, 640, 360));
    }

    #[test]
    fn test_cover_crops_source() {
        let r = settings(640, 640, CropScaleMode::Cover)
            .fixup(1920, 1080)
            .unwrap();
        assert_eq!(r.inner_size, (640, 640));
        assert_eq!(r.crop.width, 1080);
        assert_eq!(r.crop.height, 1080);
        assert_eq!(r.crop.x, 420);
    }

    #[test]
    fn test_stretch_ignores_aspect() {
        let r = settings(100, 200, CropScaleMode::Stretch)
            .fixup(1920, 1080)
            .unwrap();
        assert_eq!(r.inner_size, (100, 200));
    }

    #[test]
    fn test_auto_dimension_from_aspect() {
        let r = settings(960, 0, CropScaleMode::Contain)
            .fixup(1920, 1080)
            .unwrap();
        assert_eq!(r.inner_size, (960, 540));
    }

    #[test]
    fn test_hybrid_ratio_power_of_two() {
        let mut s = settings(100, 100, CropScaleMode::Contain);
        s.hybrid = HybridMode::FavorSpeed;
        let r = s.fixup(1000, 1000).unwrap();
        // 10:1 reduction floors to 8.
        assert_eq!(r.hybrid_ratio, 8);
    }

    #[test]
    fn test_hybrid_disabled_for_point_sampler() {
        let mut s = settings(100, 100, CropScaleMode::Contain);
        s.hybrid = HybridMode::Turbo;
        s.interpolation = Interpolation::NearestNeighbor;
        let r = s.fixup(1000, 1000).unwrap();
        assert_eq!(r.hybrid_ratio, 1);
    }

    #[test]
    fn test_hybrid_off_by_default() {
        let r = settings(100, 100, CropScaleMode::Contain)
            .fixup(1000, 1000)
            .unwrap();
        assert_eq!(r.hybrid_ratio, 1);
    }

    #[test]
    fn test_crop_respected() {
        let mut s = settings(50, 50, CropScaleMode::Stretch);
        s.crop = Some(PixelArea::new(10, 10, 100, 100));
        let r = s.fixup(200, 200).unwrap();
        assert_eq!(r.crop, PixelArea::new(10, 10, 100, 100));
    }

    #[test]
    fn test_invalid_crop_rejected() {
        let mut s = settings(50, 50, CropScaleMode::Contain);
        s.crop = Some(PixelArea::new(150, 150, 100, 100));
        assert!(s.fixup(200, 200).is_err());
    }
}
