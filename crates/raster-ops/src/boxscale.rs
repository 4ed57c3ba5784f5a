//! Integer box-average pre-scaling for large reductions.
//!
//! When the requested reduction is 2x or more, resampling the full-size
//! input with a long kernel is wasteful and numerically noisy. The hybrid
//! strategy first box-averages at an integer power-of-two ratio, then
//! hands the small remainder to the high-quality resampler.
//!
//! The box pre-scaler only accepts 8-bit channel input and must not be
//! used with point-sampling interpolation (the average would defeat it).

use raster_core::buffer::{self, BufferLease};
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, Error, PixelArea, PixelFormat, PixelNumeric, PixelSource, Result,
};
use std::rc::Rc;

/// A chained transform averaging `ratio` x `ratio` blocks of 8-bit pixels.
///
/// Output dimensions are `ceil(input / ratio)`; edge blocks average only
/// the pixels they cover.
pub struct BoxScaleSource {
    prev: Box<dyn PixelSource>,
    format: &'static PixelFormat,
    ratio: u32,
    out_w: u32,
    out_h: u32,
    line: BufferLease,
    profiler: Rc<SourceProfiler>,
}

impl BoxScaleSource {
    /// Wraps `prev` with a `ratio`:1 box average. `ratio` must be a power
    /// of two greater than 1.
    pub fn new(prev: Box<dyn PixelSource>, ratio: u32) -> Result<Self> {
        if !ratio.is_power_of_two() || ratio < 2 {
            return Err(Error::invalid_parameter(format!(
                "box scale ratio {ratio} is not a power of two >= 2"
            )));
        }
        let format = prev.format();
        if format.numeric != PixelNumeric::UnsignedInt {
            return Err(Error::unsupported_format(format.id.name(), "box scale"));
        }
        let out_w = (prev.width() + ratio - 1) / ratio;
        let out_h = (prev.height() + ratio - 1) / ratio;
        let line = buffer::rent(format.line_bytes(prev.width()))?;
        let profiler = SourceProfiler::new(format!("boxscale 1/{ratio}"));
        Ok(Self {
            prev,
            format,
            ratio,
            out_w,
            out_h,
            line,
            profiler,
        })
    }

    /// The reduction ratio.
    #[inline]
    pub fn ratio(&self) -> u32 {
        self.ratio
    }
}

impl PixelSource for BoxScaleSource {
    fn format(&self) -> &'static PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.out_w
    }

    fn height(&self) -> u32 {
        self.out_h
    }

    fn profiler(&self) -> Option<Rc<SourceProfiler>> {
        Some(Rc::clone(&self.profiler))
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        self.profiler.enter();
        let line_bytes = validate_copy(
            self.format,
            self.out_w,
            self.out_h,
            area,
            stride,
            buf.len(),
        )?;
        let channels = self.format.channels as usize;
        let ratio = self.ratio;
        let in_w = self.prev.width();
        let in_h = self.prev.height();

        let mut sums = vec![0u32; area.width as usize * channels];
        for (row, oy) in (area.y..area.bottom()).enumerate() {
            sums.fill(0);
            let y0 = oy * ratio;
            let y1 = (y0 + ratio).min(in_h);
            let x0 = area.x * ratio;
            let x1 = (area.right() * ratio).min(in_w);
            let block_w = x1 - x0;
            let src_bytes = self.format.line_bytes(block_w);

            for y in y0..y1 {
                self.profiler.pause();
                self.prev.copy_pixels(
                    PixelArea::new(x0, y, block_w, 1),
                    src_bytes,
                    &mut self.line[..src_bytes],
                )?;
                self.profiler.resume();
                for (ix, px) in self.line[..src_bytes].chunks_exact(channels).enumerate() {
                    let ox = ix as u32 / ratio;
                    let base = ox as usize * channels;
                    for (c, v) in px.iter().enumerate() {
                        sums[base + c] += u32::from(*v);
                    }
                }
            }

            let rows = y1 - y0;
            let out = &mut buf[row * stride..row * stride + line_bytes];
            for (ox, px) in out.chunks_exact_mut(channels).enumerate() {
                let gx = area.x + ox as u32;
                let cols = ((gx + 1) * ratio).min(in_w) - gx * ratio;
                let count = rows * cols;
                let base = ox * channels;
                for (c, v) in px.iter_mut().enumerate() {
                    *v = ((sums[base + c] + count / 2) / count) as u8;
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

impl ChainedSource for BoxScaleSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.prev.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.prev
    }
}
