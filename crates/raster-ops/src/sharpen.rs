//! Unsharp-mask sharpening.
//!
//! Classic photographic sharpening: subtract a gaussian-blurred copy of
//! the luma from the original, and add the amplified difference back to
//! the color channels wherever it exceeds the threshold.
//!
//! Only the luma is blurred; on planar sources the builder applies this
//! transform to the luma plane alone, and on interleaved sources the luma
//! is derived per pixel with the Rec. 601 coefficients.

use raster_core::buffer;
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, Error, PixelArea, PixelFormat, PixelNumeric, PixelSource, Result,
};
use std::rc::Rc;

/// Unsharp-mask parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SharpenSettings {
    /// Gaussian sigma of the blur pass, in pixels.
    pub radius: f64,
    /// Strength of the added difference; 1.0 adds the full delta.
    pub amount: f64,
    /// Minimum 8-bit luma difference that triggers sharpening.
    pub threshold: u8,
}

impl SharpenSettings {
    /// Whether these settings change any pixels.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.amount > 0.0 && self.radius > 0.0
    }
}

impl Default for SharpenSettings {
    fn default() -> Self {
        Self {
            radius: 1.0,
            amount: 0.0,
            threshold: 0,
        }
    }
}

/// Normalized 1-D gaussian weights for a given sigma.
fn gaussian_weights(sigma: f64) -> Vec<f32> {
    let half = (sigma * 3.0).ceil().max(1.0) as i64;
    let mut weights = Vec::with_capacity((half * 2 + 1) as usize);
    let denom = 2.0 * sigma * sigma;
    for i in -half..=half {
        weights.push((-(i * i) as f64 / denom).exp());
    }
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (*w / sum) as f32).collect()
}

// BGR order, Rec. 601.
const LUMA_B: f32 = 0.114;
const LUMA_G: f32 = 0.587;
const LUMA_R: f32 = 0.299;

#[inline]
fn luma_of(px: &[f32]) -> f32 {
    if px.len() == 1 {
        px[0]
    } else {
        px[0] * LUMA_B + px[1] * LUMA_G + px[2] * LUMA_R
    }
}

/// A chained transform applying an unsharp mask to float pixels.
pub struct SharpenSource {
    prev: Box<dyn PixelSource>,
    format: &'static PixelFormat,
    settings: SharpenSettings,
    weights: Vec<f32>,
    // Ring of (source floats, horizontally blurred luma) per input row.
    src_ring: Vec<Vec<f32>>,
    luma_ring: Vec<Vec<f32>>,
    ring_ys: Vec<i64>,
    profiler: Rc<SourceProfiler>,
}

impl SharpenSource {
    /// Wraps `prev` with an unsharp mask. Requires a float format.
    pub fn new(prev: Box<dyn PixelSource>, settings: SharpenSettings) -> Result<Self> {
        let format = prev.format();
        if format.numeric != PixelNumeric::Float {
            return Err(Error::unsupported_format(format.id.name(), "sharpen"));
        }
        if !settings.is_enabled() {
            return Err(Error::invalid_parameter(
                "sharpen settings are a no-op".to_string(),
            ));
        }
        let weights = gaussian_weights(settings.radius);
        let window = weights.len();
        let channels = format.channels as usize;
        let line = prev.width() as usize;
        let profiler = SourceProfiler::new(format!("sharpen r={}", settings.radius));
        Ok(Self {
            prev,
            format,
            settings,
            weights,
            src_ring: vec![vec![0.0; line * channels]; window],
            luma_ring: vec![vec![0.0; line]; window],
            ring_ys: vec![-1; window],
            profiler,
        })
    }

    fn fill_ring(&mut self, y: u32) -> Result<usize> {
        let slot = y as usize % self.src_ring.len();
        if self.ring_ys[slot] == i64::from(y) {
            return Ok(slot);
        }
        let channels = self.format.channels as usize;
        let width = self.prev.width() as usize;
        let src_bytes = self.format.line_bytes(self.prev.width());
        let mut raw = buffer::rent(src_bytes)?;
        self.profiler.pause();
        self.prev
            .copy_pixels(PixelArea::new(0, y, self.prev.width(), 1), src_bytes, &mut raw)?;
        self.profiler.resume();

        let src = &mut self.src_ring[slot];
        for (b, d) in raw.chunks_exact(4).zip(src.iter_mut()) {
            *d = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
        }

        // Horizontal gaussian over the luma of this row.
        let half = (self.weights.len() / 2) as i64;
        let luma: Vec<f32> = src.chunks_exact(channels).map(luma_of).collect();
        let blurred = &mut self.luma_ring[slot];
        for (x, out) in blurred.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (k, w) in self.weights.iter().enumerate() {
                let sx = (x as i64 + k as i64 - half).clamp(0, width as i64 - 1) as usize;
                acc += luma[sx] * w;
            }
            *out = acc;
        }
        self.ring_ys[slot] = i64::from(y);
        Ok(slot)
    }
}

impl PixelSource for SharpenSource {
    fn format(&self) -> &'static PixelFormat {
        self.format
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
            self.format,
            self.width(),
            self.height(),
            area,
            stride,
            buf.len(),
        )?;
        let channels = self.format.channels as usize;
        let height = self.height();
        let half = (self.weights.len() / 2) as i64;
        let threshold = f32::from(self.settings.threshold) / 255.0;
        let amount = self.settings.amount as f32;
        let color_lanes = channels.min(3);

        for (row, y) in (area.y..area.bottom()).enumerate() {
            // Blurred luma: vertical gaussian over H-blurred rows.
            let mut slots = Vec::with_capacity(self.weights.len());
            for k in 0..self.weights.len() {
                let sy = (i64::from(y) + k as i64 - half).clamp(0, i64::from(height) - 1);
                slots.push(self.fill_ring(sy as u32)?);
            }
            let center = self.fill_ring(y)?;

            let out = &mut buf[row * stride..row * stride + line_bytes];
            for (xi, px) in out.chunks_exact_mut(channels * 4).enumerate() {
                let x = area.x as usize + xi;
                let mut blur = 0.0f32;
                for (k, w) in self.weights.iter().enumerate() {
                    blur += self.luma_ring[slots[k]][x] * w;
                }
                let src_px = &self.src_ring[center][x * channels..(x + 1) * channels];
                let delta = luma_of(src_px) - blur;
                for c in 0..channels {
                    let v = if c < color_lanes && delta.abs() >= threshold {
                        src_px[c] + amount * delta
                    } else {
                        src_px[c]
                    };
                    px[c * 4..c * 4 + 4].copy_from_slice(&v.to_ne_bytes());
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

impl ChainedSource for SharpenSource {
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

    fn write_f32_px(fb: &mut FrameBufferSource, x: u32, y: u32, v: f32) {
        let line = fb.line_mut(y);
        line[x as usize * 4..x as usize * 4 + 4].copy_from_slice(&v.to_ne_bytes());
    }

    fn read_f32_px(buf: &[u8], i: usize) -> f32 {
        f32::from_ne_bytes([buf[i * 4], buf[i * 4 + 1], buf[i * 4 + 2], buf[i * 4 + 3]])
    }

    #[test]
    fn test_gaussian_weights_normalized() {
        for sigma in [0.5, 1.0, 2.5] {
            let w = gaussian_weights(sigma);
            let sum: f32 = w.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert_eq!(w.len() % 2, 1);
        }
    }

    #[test]
    fn test_flat_field_untouched() {
        let mut fb = FrameBufferSource::new(FormatId::Grey32Float, 8, 8).unwrap();
        for y in 0..8 {
            for x in 0..8 {
                write_f32_px(&mut fb, x, y, 0.5);
            }
        }
        let settings = SharpenSettings {
            radius: 1.0,
            amount: 1.0,
            threshold: 0,
        };
        let mut sharp = SharpenSource::new(Box::new(fb), settings).unwrap();
        let mut out = vec![0u8; 8 * 4];
        sharp
            .copy_pixels(PixelArea::new(0, 4, 8, 1), 32, &mut out)
            .unwrap();
        for i in 0..8 {
            assert!((read_f32_px(&out, i) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_edge_gets_amplified() {
        // A step edge: sharpening must overshoot on both sides.
        let mut fb = FrameBufferSource::new(FormatId::Grey32Float, 8, 1).unwrap();
        for x in 0..8 {
            write_f32_px(&mut fb, x, 0, if x < 4 { 0.25 } else { 0.75 });
        }
        let settings = SharpenSettings {
            radius: 1.0,
            amount: 1.0,
            threshold: 0,
        };
        let mut sharp = SharpenSource::new(Box::new(fb), settings).unwrap();
        let mut out = vec![0u8; 8 * 4];
        sharp.copy_pixels(PixelArea::of(8, 1), 32, &mut out).unwrap();
        assert!(read_f32_px(&out, 3) < 0.25);
        assert!(read_f32_px(&out, 4) > 0.75);
    }

    #[test]
    fn test_threshold_suppresses_small_deltas() {
        let mut fb = FrameBufferSource::new(FormatId::Grey32Float, 8, 1).unwrap();
        for x in 0..8 {
            // A one-step ripple, far below a 64/255 threshold.
            write_f32_px(&mut fb, x, 0, 0.5 + if x % 2 == 0 { 0.002 } else { -0.002 });
        }
        let settings = SharpenSettings {
            radius: 1.0,
            amount: 2.0,
            threshold: 64,
        };
        let mut sharp = SharpenSource::new(Box::new(fb), settings).unwrap();
        let mut out = vec![0u8; 8 * 4];
        sharp.copy_pixels(PixelArea::of(8, 1), 32, &mut out).unwrap();
        for x in 0..8usize {
            let expected = 0.5 + if x % 2 == 0 { 0.002 } else { -0.002 };
            assert!((read_f32_px(&out, x) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_u8_input() {
        let fb = FrameBufferSource::new(FormatId::Bgr24, 4, 4).unwrap();
        let settings = SharpenSettings {
            radius: 1.0,
            amount: 1.0,
            threshold: 0,
        };
        assert!(SharpenSource::new(Box::new(fb), settings).is_err());
    }
}
