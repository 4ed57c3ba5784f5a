//! Pad transform.
//!
//! Extends the canvas around the upstream content: rows and columns
//! outside the inner rectangle fill with a solid color, rows inside pull
//! the corresponding upstream line. Supports 1-, 3-, and 4-byte pixels.

use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, Error, PixelArea, PixelFormat, PixelNumeric, PixelSource, Result,
};
use smallvec::SmallVec;
use std::rc::Rc;

/// A chained transform placing its upstream inside a filled outer canvas.
pub struct PadSource {
    prev: Box<dyn PixelSource>,
    outer: PixelArea,
    inner: PixelArea,
    fill: SmallVec<[u8; 4]>,
    profiler: Rc<SourceProfiler>,
}

impl PadSource {
    /// Wraps `prev` in an `outer`-sized canvas with the content at
    /// `inner`, filling the border with `fill` (one packed pixel).
    pub fn new(
        prev: Box<dyn PixelSource>,
        outer: PixelArea,
        inner: PixelArea,
        fill: &[u8],
    ) -> Result<Self> {
        let format = prev.format();
        if format.numeric != PixelNumeric::UnsignedInt {
            return Err(Error::unsupported_format(format.id.name(), "pad"));
        }
        if inner.width != prev.width() || inner.height != prev.height() {
            return Err(Error::invalid_parameter(format!(
                "inner rect {inner} does not match content {}x{}",
                prev.width(),
                prev.height()
            )));
        }
        inner.check_bounds(outer.width, outer.height)?;
        if fill.len() != format.bytes_per_pixel() {
            return Err(Error::invalid_parameter(format!(
                "fill pixel is {} bytes, format {} needs {}",
                fill.len(),
                format.id,
                format.bytes_per_pixel()
            )));
        }
        let profiler = SourceProfiler::new(format!("pad {}x{}", outer.width, outer.height));
        Ok(Self {
            prev,
            outer,
            inner,
            fill: SmallVec::from_slice(fill),
            profiler,
        })
    }

    fn fill_span(&self, out: &mut [u8]) {
        let bpp = self.fill.len();
        for px in out.chunks_exact_mut(bpp) {
            px.copy_from_slice(&self.fill);
        }
    }
}

impl PixelSource for PadSource {
    fn format(&self) -> &'static PixelFormat {
        self.prev.format()
    }

    fn width(&self) -> u32 {
        self.outer.width
    }

    fn height(&self) -> u32 {
        self.outer.height
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
        let bpp = self.format().bytes_per_pixel();

        for (row, y) in (area.y..area.bottom()).enumerate() {
            let out = &mut buf[row * stride..row * stride + line_bytes];
            let inside_y = y >= self.inner.y && y < self.inner.bottom();
            if !inside_y {
                self.fill_span(out);
                continue;
            }
            // Clip the requested span against the inner rectangle.
            let content_x0 = area.x.max(self.inner.x);
            let content_x1 = area.right().min(self.inner.right());
            if content_x0 >= content_x1 {
                self.fill_span(out);
                continue;
            }
            let left = (content_x0 - area.x) as usize * bpp;
            let right = (content_x1 - area.x) as usize * bpp;
            self.fill_span(&mut out[..left]);
            self.fill_span(&mut out[right..]);

            let src_area = PixelArea::new(
                content_x0 - self.inner.x,
                y - self.inner.y,
                content_x1 - content_x0,
                1,
            );
            self.profiler.pause();
            self.prev
                .copy_pixels(src_area, right - left, &mut out[left..right])?;
            self.profiler.resume();
        }
        self.profiler.leave();
        Ok(())
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
        Some(self)
    }
}

impl ChainedSource for PadSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.prev.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.prev
    }
}
