//! The pull-model pixel source contract.
//!
//! A [`PixelSource`] produces pixel lines on demand: the consumer names
//! the rectangle it wants and the destination buffer, and the producer
//! writes exactly `line_bytes` per row. Transforms are
//! [`ChainedSource`]s wrapping a single upstream source; a pipeline is a
//! linear chain of them with the decoder frame at the root and the
//! encoder pulling from the head.
//!
//! Because every transform requests only the rows it needs, memory stays
//! bounded by a handful of lines regardless of image size. The only
//! transforms that buffer whole frames are the ones that algorithmically
//! must (transpose, palette construction, animation screens).
//!
//! # Contract
//!
//! For `copy_pixels(area, stride, buf)`:
//! - `area` lies within `[0, width) x [0, height)`
//! - `stride >= format.line_bytes(area.width)`
//! - `(area.height - 1) * stride + line_bytes <= buf.len()`
//!
//! Violations return an argument error; the source remains usable.
//! Errors from an upstream propagate unchanged.

use crate::error::{Error, Result};
use crate::format::{FormatId, PixelFormat};
use crate::profiler::SourceProfiler;
use crate::rect::PixelArea;

/// A pull-model producer of pixel lines.
///
/// Implementations are logically immutable once constructed: `copy_pixels`
/// takes `&mut self` only to allow internal scratch state (line caches,
/// rented buffers), never to change format or dimensions.
pub trait PixelSource {
    /// Pixel format of the produced lines.
    fn format(&self) -> &'static PixelFormat;

    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// Timing hook for this source, when profiling is enabled.
    ///
    /// The handle is shared: the source keeps one for timing and the
    /// pipeline context may keep another for reporting.
    fn profiler(&self) -> Option<std::rc::Rc<SourceProfiler>> {
        None
    }

    /// Copies the pixels of `area` into `buf`, one row per `stride` bytes.
    ///
    /// Writes exactly `format().line_bytes(area.width)` bytes per row and
    /// leaves any remaining stride bytes untouched.
    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()>;

    /// Downcast hook for chain surgery; transforms override this.
    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
        None
    }
}

/// A transform holding exactly one upstream source.
///
/// The wrapper exclusively owns its upstream and drops it with itself.
pub trait ChainedSource: PixelSource {
    /// The upstream this transform pulls from.
    fn upstream(&self) -> &dyn PixelSource;

    /// Mutable handle to the owned upstream, for [`reinit`](Self::reinit).
    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource>;

    /// Whether a later re-init may substitute this transform's upstream.
    fn is_passthrough(&self) -> bool {
        false
    }

    /// Replaces the upstream producer, preserving this transform's state.
    ///
    /// Succeeds when `new` matches the current upstream's format and
    /// dimensions; otherwise the replacement propagates down a chain of
    /// passthrough transforms until a compatible seat is found.
    fn reinit(&mut self, new: Box<dyn PixelSource>) -> Result<()> {
        let up = self.upstream_box();
        if up.format().id == new.format().id
            && up.width() == new.width()
            && up.height() == new.height()
        {
            *up = new;
            return Ok(());
        }
        match up.as_chained_mut() {
            Some(chained) if chained.is_passthrough() => chained.reinit(new),
            _ => Err(Error::unsupported(format!(
                "replacement source {}x{} {} does not match the chain",
                new.width(),
                new.height(),
                new.format()
            ))),
        }
    }
}

/// Validates a `copy_pixels` request and returns the per-row byte count.
pub fn validate_copy(
    format: &PixelFormat,
    width: u32,
    height: u32,
    area: PixelArea,
    stride: usize,
    buf_len: usize,
) -> Result<usize> {
    area.check_bounds(width, height)?;
    let line_bytes = format.line_bytes(area.width);
    if stride < line_bytes {
        return Err(Error::invalid_stride(stride, line_bytes));
    }
    let required = (area.height as usize - 1) * stride + line_bytes;
    if buf_len < required {
        return Err(Error::buffer_too_small(required, buf_len));
    }
    Ok(line_bytes)
}

/// Chroma subsampling modes of a planar Y'CbCr image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChromaSubsampling {
    /// No subsampling.
    #[default]
    Subsample444,
    /// Half vertical chroma resolution.
    Subsample440,
    /// Half horizontal chroma resolution.
    Subsample422,
    /// Half resolution on both axes.
    Subsample420,
}

impl ChromaSubsampling {
    /// `(x, y)` reduction ratios of the chroma planes.
    #[inline]
    pub const fn ratios(&self) -> (u32, u32) {
        match self {
            Self::Subsample444 => (1, 1),
            Self::Subsample440 => (1, 2),
            Self::Subsample422 => (2, 1),
            Self::Subsample420 => (2, 2),
        }
    }

    /// Chroma plane dimensions for a luma plane of `width` x `height`.
    #[inline]
    pub const fn chroma_dims(&self, width: u32, height: u32) -> (u32, u32) {
        let (rx, ry) = self.ratios();
        ((width + rx - 1) / rx, (height + ry - 1) / ry)
    }

    /// Derives the mode from luma and chroma plane dimensions.
    pub fn from_dims(luma: (u32, u32), chroma: (u32, u32)) -> Option<Self> {
        [
            Self::Subsample444,
            Self::Subsample440,
            Self::Subsample422,
            Self::Subsample420,
        ]
        .into_iter()
        .find(|s| s.chroma_dims(luma.0, luma.1) == chroma)
    }
}

/// Siting of subsampled chroma samples relative to the luma grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChromaPosition {
    /// Centered between the covered luma samples (JPEG, MPEG-1).
    #[default]
    Center,
    /// Horizontally co-sited with the left luma column (MPEG-2).
    Left,
    /// Co-sited with the top-left luma sample.
    TopLeft,
    /// Vertically co-sited with the top luma row.
    Top,
    /// Co-sited left, bottom row.
    BottomLeft,
    /// Vertically co-sited with the bottom luma row.
    Bottom,
}

impl ChromaPosition {
    /// Half-pixel displacement of the chroma grid against the luma grid.
    ///
    /// A value of 0.5 means the chroma sample sits half a luma pixel
    /// toward the origin relative to the center of its coverage area.
    #[inline]
    pub const fn offsets(&self) -> (f32, f32) {
        match self {
            Self::Center => (0.0, 0.0),
            Self::Left => (0.5, 0.0),
            Self::TopLeft => (0.5, 0.5),
            Self::Top => (0.0, 0.5),
            Self::BottomLeft => (0.5, -0.5),
            Self::Bottom => (0.0, -0.5),
        }
    }
}

/// A planar Y'CbCr source: three independently pulled planes.
///
/// The luma plane defines the nominal dimensions; chroma plane dimensions
/// derive from the subsampling mode. The bundle is consumed through its
/// planes (each a [`PixelSource`]); per-plane transforms wrap the plane
/// sources individually.
pub struct PlanarSource {
    /// Luma plane.
    pub y: Box<dyn PixelSource>,
    /// Blue-difference chroma plane.
    pub cb: Box<dyn PixelSource>,
    /// Red-difference chroma plane.
    pub cr: Box<dyn PixelSource>,
    /// Subsampling mode relating chroma dims to luma dims.
    pub subsampling: ChromaSubsampling,
    /// Chroma siting.
    pub chroma_position: ChromaPosition,
    /// Half-pixel compensation from an odd-origin crop, per axis.
    pub crop_offset: (f32, f32),
}

impl PlanarSource {
    /// Bundles three planes, validating the chroma dimensions.
    pub fn new(
        y: Box<dyn PixelSource>,
        cb: Box<dyn PixelSource>,
        cr: Box<dyn PixelSource>,
        chroma_position: ChromaPosition,
    ) -> Result<Self> {
        if cb.width() != cr.width() || cb.height() != cr.height() {
            return Err(Error::invalid_parameter(format!(
                "chroma planes disagree: {}x{} vs {}x{}",
                cb.width(),
                cb.height(),
                cr.width(),
                cr.height()
            )));
        }
        let subsampling = ChromaSubsampling::from_dims(
            (y.width(), y.height()),
            (cb.width(), cb.height()),
        )
        .ok_or_else(|| {
            Error::invalid_parameter(format!(
                "no subsampling mode maps luma {}x{} to chroma {}x{}",
                y.width(),
                y.height(),
                cb.width(),
                cb.height()
            ))
        })?;
        Ok(Self {
            y,
            cb,
            cr,
            subsampling,
            chroma_position,
            crop_offset: (0.0, 0.0),
        })
    }

    /// Width of the luma plane.
    #[inline]
    pub fn width(&self) -> u32 {
        self.y.width()
    }

    /// Height of the luma plane.
    #[inline]
    pub fn height(&self) -> u32 {
        self.y.height()
    }

    /// Format of the luma plane.
    #[inline]
    pub fn format(&self) -> &'static PixelFormat {
        self.y.format()
    }

    /// Whether the chroma planes use video-range scaling.
    pub fn is_video_range(&self) -> bool {
        self.cb.format().is_video_range()
    }
}

/// A source producing a constant raster of zero bytes.
///
/// Useful as a placeholder upstream and in tests.
pub struct EmptySource {
    format: &'static PixelFormat,
    width: u32,
    height: u32,
}

impl EmptySource {
    /// Creates a zero-filled source of the given shape.
    pub fn new(format_id: FormatId, width: u32, height: u32) -> Self {
        Self {
            format: PixelFormat::from_id(format_id),
            width,
            height,
        }
    }
}

impl PixelSource for EmptySource {
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
        for row in 0..area.height as usize {
            buf[row * stride..row * stride + line_bytes].fill(0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_copy_exact_fit() {
        let fmt = PixelFormat::from_id(FormatId::Bgr24);
        let area = PixelArea::new(0, 0, 10, 4);
        // 10 px * 3 B = 30 B rows; 3 full strides plus one line.
        assert_eq!(validate_copy(fmt, 10, 4, area, 32, 3 * 32 + 30).unwrap(), 30);
        assert!(validate_copy(fmt, 10, 4, area, 32, 3 * 32 + 29).is_err());
        assert!(validate_copy(fmt, 10, 4, area, 29, 1024).is_err());
        assert!(validate_copy(fmt, 9, 4, area, 32, 1024).is_err());
    }

    #[test]
    fn test_empty_source_fills_zero() {
        let mut src = EmptySource::new(FormatId::Grey8, 4, 2);
        let mut buf = [0xFFu8; 8];
        src.copy_pixels(PixelArea::of(4, 2), 4, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn test_chroma_dims() {
        assert_eq!(ChromaSubsampling::Subsample420.chroma_dims(7, 5), (4, 3));
        assert_eq!(ChromaSubsampling::Subsample422.chroma_dims(7, 5), (4, 5));
        assert_eq!(ChromaSubsampling::Subsample440.chroma_dims(7, 5), (7, 3));
        assert_eq!(ChromaSubsampling::Subsample444.chroma_dims(7, 5), (7, 5));
    }

    #[test]
    fn test_subsampling_from_dims() {
        assert_eq!(
            ChromaSubsampling::from_dims((8, 8), (4, 4)),
            Some(ChromaSubsampling::Subsample420)
        );
        assert_eq!(
            ChromaSubsampling::from_dims((8, 8), (8, 8)),
            Some(ChromaSubsampling::Subsample444)
        );
        assert_eq!(ChromaSubsampling::from_dims((8, 8), (3, 4)), None);
    }

    #[test]
    fn test_planar_bundle_validation() {
        let y = Box::new(EmptySource::new(FormatId::Y8, 8, 8));
        let cb = Box::new(EmptySource::new(FormatId::Cb8, 4, 4));
        let cr = Box::new(EmptySource::new(FormatId::Cr8, 4, 4));
        let planar = PlanarSource::new(y, cb, cr, ChromaPosition::Center).unwrap();
        assert_eq!(planar.subsampling, ChromaSubsampling::Subsample420);

        let y = Box::new(EmptySource::new(FormatId::Y8, 8, 8));
        let cb = Box::new(EmptySource::new(FormatId::Cb8, 4, 4));
        let cr = Box::new(EmptySource::new(FormatId::Cr8, 4, 2));
        assert!(PlanarSource::new(y, cb, cr, ChromaPosition::Center).is_err());
    }

    struct Passthrough {
        prev: Box<dyn PixelSource>,
    }

    impl PixelSource for Passthrough {
        fn format(&self) -> &'static PixelFormat {
            self.prev.format()
        }
        fn width(&self) -> u32 {
            self.prev.width()
        }
        fn height(&self) -> u32 {
            self.prev.height()
        }
        fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
            self.prev.copy_pixels(area, stride, buf)
        }
        fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
            Some(self)
        }
    }

    impl ChainedSource for Passthrough {
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

    #[test]
    fn test_reinit_replaces_compatible_upstream() {
        let mut chain = Passthrough {
            prev: Box::new(EmptySource::new(FormatId::Grey8, 4, 4)),
        };
        let new = Box::new(EmptySource::new(FormatId::Grey8, 4, 4));
        assert!(chain.reinit(new).is_ok());
    }

    #[test]
    fn test_reinit_rejects_mismatch() {
        let mut chain = Passthrough {
            prev: Box::new(EmptySource::new(FormatId::Grey8, 4, 4)),
        };
        let new = Box::new(EmptySource::new(FormatId::Bgr24, 4, 4));
        assert!(chain.reinit(new).is_err());
    }

    #[test]
    fn test_reinit_through_chain() {
        // outer wraps inner (passthrough) wraps a Grey8 4x4 leaf; a new
        // Grey8 4x4 leaf finds a compatible seat in the chain.
        let inner = Passthrough {
            prev: Box::new(EmptySource::new(FormatId::Grey8, 4, 4)),
        };
        let mut outer = Passthrough {
            prev: Box::new(inner),
        };
        let new = Box::new(EmptySource::new(FormatId::Grey8, 4, 4));
        assert!(outer.reinit(new).is_ok());
    }
}
