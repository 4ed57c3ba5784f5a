//! Matte transform: flattens alpha onto a solid background color.
//!
//! When the working format is premultiplied linear, blending happens in
//! linear light (the photometrically correct way); on the 8-bit straight
//! path it happens on companded values. The output keeps the input
//! format; when the matte is opaque the builder drops the alpha channel
//! with a conversion step afterwards.

use crate::gamma;
use raster_core::buffer::{self, BufferLease};
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, Error, FormatId, PixelArea, PixelFormat, PixelSource, Result, UQ15_ONE,
};
use std::rc::Rc;

/// A background color for matting and padding, stored as 8-bit BGRA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatteColor {
    /// Blue component.
    pub b: u8,
    /// Green component.
    pub g: u8,
    /// Red component.
    pub r: u8,
    /// Alpha component.
    pub a: u8,
}

impl MatteColor {
    /// Opaque black.
    pub const BLACK: Self = Self::opaque(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::opaque(255, 255, 255);
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self { b: 0, g: 0, r: 0, a: 0 };

    /// An opaque color from BGR components.
    pub const fn opaque(b: u8, g: u8, r: u8) -> Self {
        Self { b, g, r, a: 255 }
    }

    /// Whether the color is fully opaque.
    #[inline]
    pub const fn is_opaque(&self) -> bool {
        self.a == 255
    }

    /// Packed BGRA bytes.
    #[inline]
    pub const fn bgra(&self) -> [u8; 4] {
        [self.b, self.g, self.r, self.a]
    }

    /// Packed BGR bytes.
    #[inline]
    pub const fn bgr(&self) -> [u8; 3] {
        [self.b, self.g, self.r]
    }

    /// Premultiplied linear-light BGRA lanes.
    fn linear_premultiplied(&self) -> [f32; 4] {
        let t = gamma::srgb_to_linear_f32();
        let a = f32::from(self.a) / 255.0;
        [
            t[self.b as usize] * a,
            t[self.g as usize] * a,
            t[self.r as usize] * a,
            a,
        ]
    }

    /// Premultiplied companded BGRA lanes.
    fn companded_premultiplied(&self) -> [f32; 4] {
        let a = f32::from(self.a) / 255.0;
        [
            f32::from(self.b) / 255.0 * a,
            f32::from(self.g) / 255.0 * a,
            f32::from(self.r) / 255.0 * a,
            a,
        ]
    }
}

enum MatteOp {
    /// Premultiplied float: `out = src + matte_pm * (1 - src.a)`.
    FloatPm { matte: [f32; 4] },
    /// Premultiplied UQ15 linear.
    Q15Pm { matte: [u16; 4] },
    /// Straight 8-bit companded.
    U8Straight { matte: [u8; 4] },
}

/// A chained transform compositing its upstream over a solid color.
pub struct MatteSource {
    prev: Box<dyn PixelSource>,
    op: MatteOp,
    line: BufferLease,
    profiler: Rc<SourceProfiler>,
}

impl MatteSource {
    /// Wraps `prev` with a matte of `color`.
    ///
    /// Accepts the premultiplied float and UQ15 working formats and
    /// straight 8-bit BGRA.
    pub fn new(prev: Box<dyn PixelSource>, color: MatteColor) -> Result<Self> {
        let op = match prev.format().id {
            FormatId::Pbgra128FloatLinear => MatteOp::FloatPm {
                matte: color.linear_premultiplied(),
            },
            FormatId::Pbgra128Float => MatteOp::FloatPm {
                matte: color.companded_premultiplied(),
            },
            FormatId::Pbgra64UQ15Linear => {
                let lin = color.linear_premultiplied();
                let mut matte = [0u16; 4];
                for (m, l) in matte.iter_mut().zip(lin.iter()) {
                    *m = (l * f32::from(UQ15_ONE) + 0.5) as u16;
                }
                MatteOp::Q15Pm { matte }
            }
            FormatId::Bgra32 => MatteOp::U8Straight { matte: color.bgra() },
            other => return Err(Error::unsupported_format(other.name(), "matte")),
        };
        let line = buffer::rent(prev.format().line_bytes(prev.width()))?;
        let profiler = SourceProfiler::new("matte");
        Ok(Self {
            prev,
            op,
            line,
            profiler,
        })
    }
}

fn matte_f32(matte: &[f32; 4], src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(16).zip(dst.chunks_exact_mut(16)) {
        let a = f32::from_ne_bytes([s[12], s[13], s[14], s[15]]);
        let rem = 1.0 - a;
        for c in 0..4 {
            let v = f32::from_ne_bytes([s[c * 4], s[c * 4 + 1], s[c * 4 + 2], s[c * 4 + 3]]);
            let out = v + matte[c] * rem;
            d[c * 4..c * 4 + 4].copy_from_slice(&out.to_ne_bytes());
        }
    }
}

fn matte_q15(matte: &[u16; 4], src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(8).zip(dst.chunks_exact_mut(8)) {
        let a = u32::from(u16::from_ne_bytes([s[6], s[7]]));
        let rem = u32::from(UQ15_ONE) - a.min(u32::from(UQ15_ONE));
        for c in 0..4 {
            let v = u32::from(u16::from_ne_bytes([s[c * 2], s[c * 2 + 1]]));
            let out = (v + crate::convert::unfix15(u32::from(matte[c]) * rem))
                .min(u32::from(UQ15_ONE)) as u16;
            d[c * 2..c * 2 + 2].copy_from_slice(&out.to_ne_bytes());
        }
    }
}

fn matte_u8(matte: &[u8; 4], src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = u32::from(s[3]);
        let rem = 255 - a;
        for c in 0..3 {
            d[c] = ((u32::from(s[c]) * a + u32::from(matte[c]) * rem + 127) / 255) as u8;
        }
        d[3] = (a + u32::from(matte[3]) * rem / 255).min(255) as u8;
    }
}

impl PixelSource for MatteSource {
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
        for (row, y) in (area.y..area.bottom()).enumerate() {
            self.profiler.pause();
            self.prev.copy_pixels(
                PixelArea::new(area.x, y, area.width, 1),
                line_bytes,
                &mut self.line[..line_bytes],
            )?;
            self.profiler.resume();
            let out = &mut buf[row * stride..row * stride + line_bytes];
            match &self.op {
                MatteOp::FloatPm { matte } => matte_f32(matte, &self.line[..line_bytes], out),
                MatteOp::Q15Pm { matte } => matte_q15(matte, &self.line[..line_bytes], out),
                MatteOp::U8Straight { matte } => matte_u8(matte, &self.line[..line_bytes], out),
            }
        }
        self.profiler.leave();
        Ok(())
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
        Some(self)
    }
}

impl ChainedSource for MatteSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.prev.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.prev
    }
}
