//! Crop transform.
//!
//! Remaps output coordinates to an offset window of the upstream source.
//! Pure coordinate translation: no pixel data is touched, so crop is a
//! passthrough in the re-init sense.

use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{ChainedSource, PixelArea, PixelFormat, PixelSource, Result};
use std::rc::Rc;

/// A chained transform exposing a rectangular window of its upstream.
pub struct CropSource {
    prev: Box<dyn PixelSource>,
    window: PixelArea,
    profiler: Rc<SourceProfiler>,
}

impl CropSource {
    /// Wraps `prev`, exposing only `window`.
    pub fn new(prev: Box<dyn PixelSource>, window: PixelArea) -> Result<Self> {
        window.check_bounds(prev.width(), prev.height())?;
        let profiler = SourceProfiler::new(format!("crop {window}"));
        Ok(Self {
            prev,
            window,
            profiler,
        })
    }

    /// The window into the upstream source.
    #[inline]
    pub fn window(&self) -> PixelArea {
        self.window
    }
}

impl PixelSource for CropSource {
    fn format(&self) -> &'static PixelFormat {
        self.prev.format()
    }

    fn width(&self) -> u32 {
        self.window.width
    }

    fn height(&self) -> u32 {
        self.window.height
    }

    fn profiler(&self) -> Option<Rc<SourceProfiler>> {
        Some(Rc::clone(&self.profiler))
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        self.profiler.enter();
        validate_copy(
            self.format(),
            self.width(),
            self.height(),
            area,
            stride,
            buf.len(),
        )?;
        let shifted = area.offset(self.window.x, self.window.y);
        self.profiler.pause();
        let result = self.prev.copy_pixels(shifted, stride, buf);
        self.profiler.resume();
        self.profiler.leave();
        result
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
        Some(self)
    }
}

impl ChainedSource for CropSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.prev.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.prev
    }

    fn is_passthrough(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_core::{FormatId, FrameBufferSource};

    fn gradient_source() -> FrameBufferSource {
        let mut fb = FrameBufferSource::new(FormatId::Grey8, 4, 4).unwrap();
        for y in 0..4u32 {
            for x in 0..4u32 {
                fb.line_mut(y)[x as usize] = (y * 4 + x) as u8;
            }
        }
        fb
    }

    #[test]
    fn test_crop_window() {
        let src = gradient_source();
        let mut crop =
            CropSource::new(Box::new(src), PixelArea::new(1, 1, 2, 2)).unwrap();
        assert_eq!((crop.width(), crop.height()), (2, 2));

        let mut out = [0u8; 4];
        crop.copy_pixels(PixelArea::of(2, 2), 2, &mut out).unwrap();
        assert_eq!(out, [5, 6, 9, 10]);
    }

    #[test]
    fn test_crop_of_crop_composes() {
        let src = gradient_source();
        let inner = CropSource::new(Box::new(src), PixelArea::new(1, 0, 3, 4)).unwrap();
        let mut outer =
            CropSource::new(Box::new(inner), PixelArea::new(1, 2, 1, 1)).unwrap();
        let mut out = [0u8; 1];
        outer.copy_pixels(PixelArea::of(1, 1), 1, &mut out).unwrap();
        assert_eq!(out, [10]);
    }

    #[test]
    fn test_crop_rejects_oversize_window() {
        let src = gradient_source();
        assert!(CropSource::new(Box::new(src), PixelArea::new(2, 2, 3, 3)).is_err());
    }

    #[test]
    fn test_reinit_equals_fresh_construction() {
        // Re-seating a new upstream under a passthrough crop produces the
        // same pixels as building the crop over that upstream directly.
        let window = PixelArea::new(1, 1, 2, 2);
        let mut reinited =
            CropSource::new(Box::new(gradient_source()), window).unwrap();
        raster_core::ChainedSource::reinit(&mut reinited, Box::new(gradient_source())).unwrap();

        let mut fresh = CropSource::new(Box::new(gradient_source()), window).unwrap();
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        reinited.copy_pixels(PixelArea::of(2, 2), 2, &mut a).unwrap();
        fresh.copy_pixels(PixelArea::of(2, 2), 2, &mut b).unwrap();
        assert_eq!(a, b);
    }
}
