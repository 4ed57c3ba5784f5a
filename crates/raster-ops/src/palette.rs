//! Palette types and the indexed-to-direct transform.
//!
//! Indexed sources carry up to 256 ARGB palette entries alongside 8-bit
//! index data. [`PaletteSource`] expands indices to direct pixels,
//! picking the narrowest format the palette contents allow: `Grey8` for
//! an opaque greyscale palette, `Bgr24` for opaque color, `Bgra32`
//! otherwise.

use raster_core::buffer::{self, BufferLease};
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, Error, FormatId, PixelArea, PixelFormat, PixelSource, Result,
};
use std::rc::Rc;

/// An ARGB palette of up to 256 entries (`0xAARRGGBB`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<u32>,
}

impl Palette {
    /// Wraps palette entries. At most 256 are allowed.
    pub fn new(entries: Vec<u32>) -> Result<Self> {
        if entries.is_empty() || entries.len() > 256 {
            return Err(Error::invalid_parameter(format!(
                "palette must hold 1..=256 entries, got {}",
                entries.len()
            )));
        }
        Ok(Self { entries })
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the palette has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw ARGB entries.
    #[inline]
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// BGRA bytes of entry `i`.
    #[inline]
    pub fn bgra(&self, i: usize) -> [u8; 4] {
        let e = self.entries[i];
        [
            (e & 0xFF) as u8,
            (e >> 8 & 0xFF) as u8,
            (e >> 16 & 0xFF) as u8,
            (e >> 24 & 0xFF) as u8,
        ]
    }

    /// Whether any entry is not fully opaque.
    pub fn has_alpha(&self) -> bool {
        self.entries.iter().any(|e| e >> 24 != 0xFF)
    }

    /// Whether every entry is an opaque grey (R == G == B).
    pub fn is_greyscale(&self) -> bool {
        self.entries.iter().all(|e| {
            let r = e >> 16 & 0xFF;
            let g = e >> 8 & 0xFF;
            let b = e & 0xFF;
            e >> 24 == 0xFF && r == g && g == b
        })
    }

    /// The direct format matching the palette contents.
    pub fn direct_format(&self) -> FormatId {
        if self.is_greyscale() {
            FormatId::Grey8
        } else if self.has_alpha() {
            FormatId::Bgra32
        } else {
            FormatId::Bgr24
        }
    }
}

/// A chained transform expanding `Indexed8` pixels through a palette.
pub struct PaletteSource {
    prev: Box<dyn PixelSource>,
    palette: Palette,
    format: &'static PixelFormat,
    line: BufferLease,
    profiler: Rc<SourceProfiler>,
}

impl PaletteSource {
    /// Wraps an indexed source with its palette.
    pub fn new(prev: Box<dyn PixelSource>, palette: Palette) -> Result<Self> {
        if prev.format().id != FormatId::Indexed8 {
            return Err(Error::unsupported_format(prev.format().id.name(), "palette"));
        }
        let format = PixelFormat::from_id(palette.direct_format());
        let line = buffer::rent(prev.format().line_bytes(prev.width()))?;
        let profiler = SourceProfiler::new(format!("palette->{}", format.id));
        Ok(Self {
            prev,
            palette,
            format,
            line,
            profiler,
        })
    }

    /// The palette in use.
    #[inline]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}

impl PixelSource for PaletteSource {
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
        let src_bytes = area.width as usize;
        let limit = self.palette.len() as u32;
        for (row, y) in (area.y..area.bottom()).enumerate() {
            self.profiler.pause();
            self.prev.copy_pixels(
                PixelArea::new(area.x, y, area.width, 1),
                src_bytes,
                &mut self.line[..src_bytes],
            )?;
            self.profiler.resume();
            let out = &mut buf[row * stride..row * stride + line_bytes];
            for (i, idx) in self.line[..src_bytes].iter().enumerate() {
                if u32::from(*idx) >= limit {
                    return Err(Error::corrupt_stream(format!(
                        "palette index {idx} out of range"
                    )));
                }
                let px = self.palette.bgra(*idx as usize);
                match self.format.id {
                    FormatId::Grey8 => out[i] = px[0],
                    FormatId::Bgr24 => out[i * 3..i * 3 + 3].copy_from_slice(&px[..3]),
                    _ => out[i * 4..i * 4 + 4].copy_from_slice(&px),
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

impl ChainedSource for PaletteSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.prev.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.prev
    }
}
