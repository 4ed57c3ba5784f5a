//! An owned full-canvas pixel source.
//!
//! [`FrameBufferSource`] backs the few places the pipeline genuinely
//! needs a whole frame in memory: the animation screen buffer, overlay
//! backgrounds, and the intermediate of transposing orientations. Backing
//! storage is rented from the buffer pool and returned on drop.

use crate::buffer::{self, BufferLease};
use crate::error::Result;
use crate::format::{FormatId, PixelFormat};
use crate::rect::PixelArea;
use crate::source::{validate_copy, PixelSource};

/// A mutable, fully materialized raster that also serves lines as a
/// [`PixelSource`].
pub struct FrameBufferSource {
    format: &'static PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    buf: BufferLease,
}

impl FrameBufferSource {
    /// Allocates a zeroed frame of the given shape from the buffer pool.
    pub fn new(format_id: FormatId, width: u32, height: u32) -> Result<Self> {
        let format = PixelFormat::from_id(format_id);
        let stride = format.line_bytes(width);
        let mut buf = buffer::rent_aligned(stride * height as usize)?;
        buf.clear();
        Ok(Self {
            format,
            width,
            height,
            stride,
            buf,
        })
    }

    /// Row stride in bytes.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// One pixel row, immutable.
    #[inline]
    pub fn line(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.buf[start..start + self.stride]
    }

    /// One pixel row, mutable.
    #[inline]
    pub fn line_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.buf[start..start + self.stride]
    }

    /// The whole backing raster, mutable.
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Fills an area with a repeating pixel value.
    ///
    /// `pixel` must be exactly `bytes_per_pixel` long.
    pub fn fill_area(&mut self, area: PixelArea, pixel: &[u8]) -> Result<()> {
        area.check_bounds(self.width, self.height)?;
        let bpp = self.format.bytes_per_pixel();
        debug_assert_eq!(pixel.len(), bpp);
        for y in area.y..area.bottom() {
            let row = self.line_mut(y);
            let start = area.x as usize * bpp;
            let end = area.right() as usize * bpp;
            for px in row[start..end].chunks_exact_mut(bpp) {
                px.copy_from_slice(pixel);
            }
        }
        Ok(())
    }

    /// Copies rows from another source into this frame at an offset.
    pub fn write_from(
        &mut self,
        source: &mut dyn PixelSource,
        at_x: u32,
        at_y: u32,
    ) -> Result<()> {
        let area = PixelArea::new(at_x, at_y, source.width(), source.height());
        area.check_bounds(self.width, self.height)?;
        let stride = self.stride;
        let start = at_y as usize * stride + at_x as usize * self.format.bytes_per_pixel();
        source.copy_pixels(
            PixelArea::of(source.width(), source.height()),
            stride,
            &mut self.buf[start..],
        )
    }
}

impl PixelSource for FrameBufferSource {
    fn format(&self) -> &'static PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        let line_bytes =
            validate_copy(self.format, self.width, self.height, area, stride, buf.len())?;
        let x_offset = area.x as usize * self.format.bytes_per_pixel();
        for (row, y) in (area.y..area.bottom()).enumerate() {
            let src_start = y as usize * self.stride + x_offset;
            buf[row * stride..row * stride + line_bytes]
                .copy_from_slice(&self.buf[src_start..src_start + line_bytes]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let mut fb = FrameBufferSource::new(FormatId::Bgra32, 3, 2).unwrap();
        let mut out = [0xEEu8; 24];
        fb.copy_pixels(PixelArea::of(3, 2), 12, &mut out).unwrap();
        assert_eq!(out, [0u8; 24]);
    }

    #[test]
    fn test_fill_area_and_read_back() {
        let mut fb = FrameBufferSource::new(FormatId::Bgr24, 4, 4).unwrap();
        fb.fill_area(PixelArea::new(1, 1, 2, 2), &[1, 2, 3]).unwrap();

        let mut out = [0u8; 12];
        fb.copy_pixels(PixelArea::new(1, 1, 2, 2), 6, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 1, 2, 3, 1, 2, 3, 1, 2, 3]);

        // Outside the filled area stays zero.
        let mut corner = [9u8; 3];
        fb.copy_pixels(PixelArea::new(0, 0, 1, 1), 3, &mut corner).unwrap();
        assert_eq!(corner, [0, 0, 0]);
    }

    #[test]
    fn test_write_from_offset() {
        let mut inner = FrameBufferSource::new(FormatId::Grey8, 2, 2).unwrap();
        inner.fill_area(PixelArea::of(2, 2), &[7]).unwrap();

        let mut fb = FrameBufferSource::new(FormatId::Grey8, 4, 4).unwrap();
        fb.write_from(&mut inner, 1, 2).unwrap();

        assert_eq!(fb.line(2), &[0, 7, 7, 0]);
        assert_eq!(fb.line(3), &[0, 7, 7, 0]);
        assert_eq!(fb.line(0), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_write_from_rejects_overflow() {
        let mut inner = FrameBufferSource::new(FormatId::Grey8, 3, 3).unwrap();
        let mut fb = FrameBufferSource::new(FormatId::Grey8, 4, 4).unwrap();
        assert!(fb.write_from(&mut inner, 2, 2).is_err());
    }
}
