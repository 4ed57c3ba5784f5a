//! Channel-order and channel-count swizzles.
//!
//! Row-level byte shuffles: B↔R swap, 4-to-3 packing, 3-to-4 expansion,
//! and alpha extraction. These never touch sample values, only lane
//! positions, so they are gamma- and range-agnostic.

use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::buffer::{self, BufferLease};
use raster_core::{
    ChainedSource, Error, FormatId, PixelArea, PixelFormat, PixelSource, Result,
};
use std::rc::Rc;

/// Swaps bytes 0 and 2 of each 3-byte pixel (BGR↔RGB).
pub fn swap_rb_3(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(3)) {
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
    }
}

/// Swaps bytes 0 and 2 of each 4-byte pixel (BGRA↔RGBA).
pub fn swap_rb_4(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
        d[3] = s[3];
    }
}

/// Packs 4-byte pixels into tight 3-byte pixels, dropping the last lane.
pub fn pack_4_to_3(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(3)) {
        d.copy_from_slice(&s[..3]);
    }
}

/// Expands 3-byte pixels to 4-byte pixels with an opaque fourth lane.
pub fn expand_3_to_4(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(4)) {
        d[..3].copy_from_slice(s);
        d[3] = 0xFF;
    }
}

/// Extracts the alpha lane of 4-byte pixels into a 1-byte-per-pixel line.
pub fn extract_alpha(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.iter_mut()) {
        *d = s[3];
    }
}

/// Expands grey bytes to opaque 4-byte pixels with R = G = B.
pub fn grey_to_4(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.iter().zip(dst.chunks_exact_mut(4)) {
        d[0] = *s;
        d[1] = *s;
        d[2] = *s;
        d[3] = 0xFF;
    }
}

enum SwizzleOp {
    SwapRb3,
    SwapRb4,
    Pack4To3,
    Expand3To4,
    GreyTo4,
}

impl SwizzleOp {
    fn run(&self, src: &[u8], dst: &mut [u8]) {
        match self {
            Self::SwapRb3 => swap_rb_3(src, dst),
            Self::SwapRb4 => swap_rb_4(src, dst),
            Self::Pack4To3 => pack_4_to_3(src, dst),
            Self::Expand3To4 => expand_3_to_4(src, dst),
            Self::GreyTo4 => grey_to_4(src, dst),
        }
    }
}

fn plan(from: FormatId, to: FormatId) -> Option<SwizzleOp> {
    use FormatId as F;
    let op = match (from, to) {
        (F::Rgb24, F::Bgr24) | (F::Bgr24, F::Rgb24) => SwizzleOp::SwapRb3,
        (F::Rgba32, F::Bgra32) | (F::Bgra32, F::Rgba32) => SwizzleOp::SwapRb4,
        (F::Bgrx32, F::Bgr24) | (F::Bgra32, F::Bgr24) | (F::Pbgra32, F::Bgr24) => {
            SwizzleOp::Pack4To3
        }
        (F::Bgr24, F::Bgrx32) | (F::Bgr24, F::Bgra32) => SwizzleOp::Expand3To4,
        (F::Grey8, F::Bgra32) | (F::Y8, F::Bgra32) => SwizzleOp::GreyTo4,
        _ => return None,
    };
    Some(op)
}

/// Whether a lane shuffle exists between two formats.
pub fn can_swizzle(from: FormatId, to: FormatId) -> bool {
    plan(from, to).is_some()
}

/// A chained transform rearranging channel lanes between 8-bit formats.
pub struct SwizzleSource {
    prev: Box<dyn PixelSource>,
    format: &'static PixelFormat,
    op: SwizzleOp,
    line: BufferLease,
    profiler: Rc<SourceProfiler>,
}

impl SwizzleSource {
    /// Wraps `prev` with a lane shuffle producing `to`.
    pub fn new(prev: Box<dyn PixelSource>, to: FormatId) -> Result<Self> {
        let format = PixelFormat::from_id(to);
        let op = plan(prev.format().id, to)
            .ok_or_else(|| Error::unsupported_format(prev.format().id.name(), "swizzle"))?;
        let line = buffer::rent(prev.format().line_bytes(prev.width()))?;
        let profiler =
            SourceProfiler::new(format!("swizzle {}->{}", prev.format().id, to.name()));
        Ok(Self {
            prev,
            format,
            op,
            line,
            profiler,
        })
    }
}

impl PixelSource for SwizzleSource {
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
        let src_bytes = self.prev.format().line_bytes(area.width);
        for (row, y) in (area.y..area.bottom()).enumerate() {
            self.profiler.pause();
            self.prev.copy_pixels(
                PixelArea::new(area.x, y, area.width, 1),
                src_bytes,
                &mut self.line[..src_bytes],
            )?;
            self.profiler.resume();
            self.op
                .run(&self.line[..src_bytes], &mut buf[row * stride..row * stride + line_bytes]);
        }
        self.profiler.leave();
        Ok(())
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
        Some(self)
    }
}

impl ChainedSource for SwizzleSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.prev.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.prev
    }
}
