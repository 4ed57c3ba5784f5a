//! Color profiles, the process-wide profile cache, and the color-space
//! transform.
//!
//! ICC parsing and full ICC transform math live outside this workspace;
//! the pipeline models a parsed profile as a lookup/matrix provider
//! mapping linear device values to linear sRGB. The [`cache`] is keyed by
//! the raw profile bytes so repeated frames and pipelines share one
//! parse; entries are immutable once inserted.

use raster_core::buffer::{self, BufferLease};
use raster_core::format::PixelNumeric;
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, Error, PixelArea, PixelFormat, PixelSource, Result, ValueEncoding,
};
use raster_ops::gamma::InterpolatingLut;
use raster_ops::mat3::Mat3;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex, OnceLock};

/// A parsed color profile, reduced to what the pipeline consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorProfile {
    /// The sRGB working space; no transform needed.
    Srgb,
    /// Matrix profile: linear device RGB to linear sRGB.
    Matrix {
        /// The 3x3 linear-light conversion.
        to_srgb_linear: Mat3,
    },
    /// Table profile: per-channel lookup, linear to linear.
    Table {
        /// Samples of the conversion curve over [0, 1].
        to_srgb_linear: Vec<f32>,
    },
}

impl ColorProfile {
    /// Whether pixels in this profile need a conversion step.
    #[inline]
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Srgb)
    }
}

static CACHE: OnceLock<Mutex<HashMap<Vec<u8>, Arc<ColorProfile>>>> = OnceLock::new();

/// Looks up a profile by its raw bytes, parsing at most once per
/// process.
///
/// `parse` runs only on a cache miss; a `None` parse result caches as
/// sRGB (the safe fallback for unreadable profiles).
pub fn cached(bytes: &[u8], parse: impl FnOnce(&[u8]) -> Option<ColorProfile>) -> Arc<ColorProfile> {
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = match cache.lock() {
        Ok(map) => map,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(found) = map.get(bytes) {
        return Arc::clone(found);
    }
    let parsed = Arc::new(parse(bytes).unwrap_or(ColorProfile::Srgb));
    map.insert(bytes.to_vec(), Arc::clone(&parsed));
    parsed
}

enum ProfileOp {
    Matrix(Mat3),
    Lut(InterpolatingLut),
}

/// A chained transform converting linear float pixels between profiles.
pub struct ColorTransformSource {
    prev: Box<dyn PixelSource>,
    op: ProfileOp,
    line: BufferLease,
    profiler: Rc<SourceProfiler>,
}

impl ColorTransformSource {
    /// Wraps `prev` with the conversion `profile` describes.
    ///
    /// Requires a linear float working format; returns an error for an
    /// sRGB profile (the builder should skip the step instead).
    pub fn new(prev: Box<dyn PixelSource>, profile: &ColorProfile) -> Result<Self> {
        let format = prev.format();
        if format.numeric != PixelNumeric::Float || format.encoding != ValueEncoding::Linear {
            return Err(Error::unsupported_format(format.id.name(), "color transform"));
        }
        let op = match profile {
            ColorProfile::Srgb => {
                return Err(Error::invalid_parameter(
                    "sRGB to sRGB needs no color transform".to_string(),
                ))
            }
            ColorProfile::Matrix { to_srgb_linear } => ProfileOp::Matrix(*to_srgb_linear),
            ColorProfile::Table { to_srgb_linear } => {
                let lut = InterpolatingLut::from_table(to_srgb_linear.clone()).ok_or_else(|| {
                    Error::invalid_parameter("table profile needs at least 2 samples".to_string())
                })?;
                ProfileOp::Lut(lut)
            }
        };
        let line = buffer::rent(format.line_bytes(prev.width()))?;
        let profiler = SourceProfiler::new("color transform");
        Ok(Self {
            prev,
            op,
            line,
            profiler,
        })
    }
}

impl PixelSource for ColorTransformSource {
    fn format(&self) -> &'static PixelFormat {
        self.prev.format()
    }

    fn width(&self) -> u32 {
        self.prev.width()
    }

    fn height(&self) -> u32 {
        self.prev.height()
    }

    fn profiler(&self) -> Option<Rc<SourceProfiler>> {
        Some(Rc::clone(&self.profiler))
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        self.profiler.enter();
        let line_bytes = validate_copy(
            self.format(),
            self.width(),
            self.height(),
            area,
            stride,
            buf.len(),
        )?;
        let channels = self.format().channels as usize;
        for (row, y) in (area.y..area.bottom()).enumerate() {
            self.profiler.pause();
            self.prev.copy_pixels(
                PixelArea::new(area.x, y, area.width, 1),
                line_bytes,
                &mut self.line[..line_bytes],
            )?;
            self.profiler.resume();
            let out = &mut buf[row * stride..row * stride + line_bytes];
            for (s, d) in self.line[..line_bytes]
                .chunks_exact(channels * 4)
                .zip(out.chunks_exact_mut(channels * 4))
            {
                let mut px = [0f32; 4];
                for (c, v) in px.iter_mut().take(channels).enumerate() {
                    *v = f32::from_ne_bytes([
                        s[c * 4],
                        s[c * 4 + 1],
                        s[c * 4 + 2],
                        s[c * 4 + 3],
                    ]);
                }
                // Color lanes are BGR; the matrix convention is RGB.
                let rgb = match &self.op {
                    ProfileOp::Matrix(m) => {
                        let out = m.mul_vec([px[2], px[1], px[0]]);
                        [out[2], out[1], out[0]]
                    }
                    ProfileOp::Lut(lut) => {
                        [lut.sample(px[0]), lut.sample(px[1]), lut.sample(px[2])]
                    }
                };
                for (c, v) in rgb.iter().enumerate() {
                    d[c * 4..c * 4 + 4].copy_from_slice(&v.to_ne_bytes());
                }
                for c in 3..channels {
                    d[c * 4..c * 4 + 4].copy_from_slice(&px[c].to_ne_bytes());
                }
            }
        }
        self.profiler.leave();
        Ok(())
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
        Some(self)
    }
}

impl ChainedSource for ColorTransformSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.prev.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.prev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_core::{FormatId, FrameBufferSource};

    #[test]
    fn test_cache_parses_once() {
        let bytes = b"test-profile-cache-parses-once";
        let mut calls = 0;
        let a = cached(bytes, |_| {
            calls += 1;
            Some(ColorProfile::Srgb)
        });
        let b = cached(bytes, |_| {
            calls += 1;
            Some(ColorProfile::Srgb)
        });
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_unparseable_profile_falls_back_to_srgb() {
        let p = cached(b"test-profile-unparseable", |_| None);
        assert!(p.is_srgb());
    }

    #[test]
    fn test_matrix_transform_applies() {
        // A pure channel swap matrix: R and B trade places.
        let swap = Mat3::from_rows([[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]);
        let mut fb = FrameBufferSource::new(FormatId::Bgr96FloatLinear, 1, 1).unwrap();
        let line = fb.line_mut(0);
        line[0..4].copy_from_slice(&0.25f32.to_ne_bytes());
        line[4..8].copy_from_slice(&0.5f32.to_ne_bytes());
        line[8..12].copy_from_slice(&0.75f32.to_ne_bytes());

        let profile = ColorProfile::Matrix { to_srgb_linear: swap };
        let mut xform = ColorTransformSource::new(Box::new(fb), &profile).unwrap();
        let mut out = [0u8; 12];
        xform.copy_pixels(PixelArea::of(1, 1), 12, &mut out).unwrap();
        let b = f32::from_ne_bytes([out[0], out[1], out[2], out[3]]);
        let r = f32::from_ne_bytes([out[8], out[9], out[10], out[11]]);
        // B and R swapped; B lane now holds the old R value.
        assert!((b - 0.75).abs() < 1e-6);
        assert!((r - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_companded_input() {
        let fb = FrameBufferSource::new(FormatId::Bgr96Float, 1, 1).unwrap();
        let profile = ColorProfile::Matrix {
            to_srgb_linear: Mat3::IDENTITY,
        };
        assert!(ColorTransformSource::new(Box::new(fb), &profile).is_err());
    }

    #[test]
    fn test_rejects_srgb_noop() {
        let fb = FrameBufferSource::new(FormatId::Bgr96FloatLinear, 1, 1).unwrap();
        assert!(ColorTransformSource::new(Box::new(fb), &ColorProfile::Srgb).is_err());
    }
}
