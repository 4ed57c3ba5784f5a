//! Orientation transform.
//!
//! Realizes one of the eight Exif orientation states by combining
//! per-line pixel reversal, vertical flip, and transpose. The flip-only
//! states stream line by line; the four transposing states materialize
//! the upstream into a full intermediate buffer on first pull, since
//! their output rows read upstream columns.

use raster_core::buffer::{self, BufferLease};
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, Error, FrameBufferSource, Orientation, PixelArea, PixelFormat, PixelNumeric,
    PixelSource, Result,
};
use std::rc::Rc;

/// Reverses the pixel order of a packed line in place.
pub fn reverse_line(line: &mut [u8], bpp: usize) {
    let count = line.len() / bpp;
    for i in 0..count / 2 {
        let j = count - 1 - i;
        for b in 0..bpp {
            line.swap(i * bpp + b, j * bpp + b);
        }
    }
}

/// A chained transform realizing an Exif orientation.
pub struct OrientSource {
    prev: Box<dyn PixelSource>,
    orientation: Orientation,
    width: u32,
    height: u32,
    line: BufferLease,
    transposed: Option<FrameBufferSource>,
    profiler: Rc<SourceProfiler>,
}

impl OrientSource {
    /// Wraps `prev`, presenting it in the corrected orientation.
    ///
    /// 8-bit formats only; orientation runs before the working-format
    /// conversion in the pipeline.
    pub fn new(prev: Box<dyn PixelSource>, orientation: Orientation) -> Result<Self> {
        let format = prev.format();
        if format.numeric != PixelNumeric::UnsignedInt {
            return Err(Error::unsupported_format(format.id.name(), "orient"));
        }
        let (width, height) = orientation.oriented_dims(prev.width(), prev.height());
        let line = buffer::rent(format.line_bytes(prev.width().max(prev.height())))?;
        let profiler = SourceProfiler::new(format!("orient {orientation}"));
        Ok(Self {
            prev,
            orientation,
            width,
            height,
            line,
            transposed: None,
            profiler,
        })
    }

    /// The realized orientation.
    #[inline]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Pulls the whole upstream into the intermediate buffer.
    fn materialize(&mut self) -> Result<()> {
        if self.transposed.is_some() {
            return Ok(());
        }
        let mut frame = FrameBufferSource::new(
            self.prev.format().id,
            self.prev.width(),
            self.prev.height(),
        )?;
        self.profiler.pause();
        frame.write_from(self.prev.as_mut(), 0, 0)?;
        self.profiler.resume();
        self.transposed = Some(frame);
        Ok(())
    }
}

impl PixelSource for OrientSource {
    fn format(&self) -> &'static PixelFormat {
        self.prev.format()
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn profiler(&self) -> Option<Rc<SourceProfiler>> {
        Some(Rc::clone(&self.profiler))
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        self.profiler.enter();
        let line_bytes = validate_copy(
            self.format(),
            self.width,
            self.height,
            area,
            stride,
            buf.len(),
        )?;
        let bpp = self.format().bytes_per_pixel();
        let (sw, sh) = (self.prev.width(), self.prev.height());

        if self.orientation.is_transposed() {
            self.materialize()?;
            let Some(frame) = self.transposed.as_ref() else {
                return Err(Error::unsupported("orientation buffer missing".to_string()));
            };
            for (row, py) in (area.y..area.bottom()).enumerate() {
                let out = &mut buf[row * stride..row * stride + line_bytes];
                for (col, px) in (area.x..area.right()).enumerate() {
                    let s = self
                        .orientation
                        .de_orient(PixelArea::new(px, py, 1, 1), sw, sh);
                    let src = frame.line(s.y);
                    let at = s.x as usize * bpp;
                    out[col * bpp..(col + 1) * bpp].copy_from_slice(&src[at..at + bpp]);
                }
            }
            self.profiler.leave();
            return Ok(());
        }

        // Flip-only states stream one upstream line per output line.
        for (row, py) in (area.y..area.bottom()).enumerate() {
            let src = self
                .orientation
                .de_orient(PixelArea::new(area.x, py, area.width, 1), sw, sh);
            let src_bytes = self.format().line_bytes(area.width);
            self.profiler.pause();
            self.prev
                .copy_pixels(src, src_bytes, &mut self.line[..src_bytes])?;
            self.profiler.resume();
            if self.orientation.flips_x() {
                reverse_line(&mut self.line[..src_bytes], bpp);
            }
            buf[row * stride..row * stride + line_bytes]
                .copy_from_slice(&self.line[..src_bytes]);
        }
        self.profiler.leave();
        Ok(())
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
        Some(self)
    }
}

impl ChainedSource for OrientSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.prev.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.prev
    }
}
