//! Numeric conversion kernels and the format conversion transform.
//!
//! These are the line-level procedures that move pixels between the three
//! numeric representations: 8-bit unsigned, UQ15 fixed point, and 32-bit
//! float. Each kernel has the signature `(src, dst)` over byte slices and
//! produces results identical to a straightforward scalar reference.
//!
//! # Variants
//!
//! Widening and narrowing come in three shapes:
//!
//! - **plain** - every channel converted with the same value table
//! - **3A** - 3 color + 1 alpha quads: widening premultiplies the alpha
//!   into the colors in-lane; narrowing divides it back out
//! - **3X** - 3 color channels padded to (or packed from) a 4-lane quad
//!
//! # Value tables
//!
//! Widening uses 256-entry tables of `(i - offset) / scale` for the four
//! sample ranges: full (0, 255), signed chroma (128, 255), video luma
//! (16, 219), and video chroma (128, 224). Gamma-aware widening swaps in
//! the companded-to-linear tables from [`crate::gamma`] — same shape,
//! different contents.

use crate::gamma::{self, InterpolatingLut};
use raster_core::buffer::{self, BufferLease};
use raster_core::format::{ColorRepr, ValueRange};
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, Error, FormatId, PixelArea, PixelFormat, PixelSource, Result, UQ15_HALF,
    UQ15_ONE,
};
use std::rc::Rc;
use std::sync::OnceLock;

/// Sample range of an 8-bit channel, selecting the widening table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRange {
    /// Offset 0, scale 255.
    Full,
    /// Offset 128, scale 255 (full-range chroma).
    SignedFull,
    /// Offset 16, scale 219 (video luma).
    VideoLuma,
    /// Offset 128, scale 224 (video chroma).
    VideoChroma,
}

impl SampleRange {
    /// `(offset, scale)` of this range.
    #[inline]
    pub const fn params(&self) -> (f32, f32) {
        match self {
            Self::Full => (0.0, 255.0),
            Self::SignedFull => (128.0, 255.0),
            Self::VideoLuma => (16.0, 219.0),
            Self::VideoChroma => (128.0, 224.0),
        }
    }

    /// Derives the range from a pixel format's color and range fields.
    pub fn for_format(fmt: &PixelFormat) -> Self {
        match (fmt.color, fmt.range) {
            (ColorRepr::Cb | ColorRepr::Cr, ValueRange::Video) => Self::VideoChroma,
            (ColorRepr::Cb | ColorRepr::Cr, ValueRange::Full) => Self::SignedFull,
            (ColorRepr::Y, ValueRange::Video) => Self::VideoLuma,
            _ => Self::Full,
        }
    }

    /// The 256-entry widening table `(i - offset) / scale`.
    pub fn table(&self) -> &'static [f32; 256] {
        static FULL: OnceLock<[f32; 256]> = OnceLock::new();
        static SIGNED: OnceLock<[f32; 256]> = OnceLock::new();
        static VLUMA: OnceLock<[f32; 256]> = OnceLock::new();
        static VCHROMA: OnceLock<[f32; 256]> = OnceLock::new();
        let cell = match self {
            Self::Full => &FULL,
            Self::SignedFull => &SIGNED,
            Self::VideoLuma => &VLUMA,
            Self::VideoChroma => &VCHROMA,
        };
        let (offset, scale) = self.params();
        cell.get_or_init(|| {
            let mut t = [0f32; 256];
            for (i, v) in t.iter_mut().enumerate() {
                *v = (i as f32 - offset) / scale;
            }
            t
        })
    }
}

/// Identity ramp table for byte-to-UQ15 widening.
pub fn uq15_ramp() -> &'static [u16; 256] {
    static TABLE: OnceLock<[u16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [0u16; 256];
        for (i, v) in t.iter_mut().enumerate() {
            *v = ((i as u32 * UQ15_ONE as u32 + 127) / 255) as u16;
        }
        t
    })
}

/// Rounds a Q15 intermediate back to the integer part.
#[inline]
pub const fn unfix15(v: u32) -> u32 {
    (v + UQ15_HALF as u32) >> 15
}

#[inline]
fn read_f32(b: &[u8]) -> f32 {
    f32::from_ne_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
fn write_f32(b: &mut [u8], v: f32) {
    b.copy_from_slice(&v.to_ne_bytes());
}

#[inline]
fn read_u16(b: &[u8]) -> u16 {
    u16::from_ne_bytes([b[0], b[1]])
}

#[inline]
fn write_u16(b: &mut [u8], v: u16) {
    b.copy_from_slice(&v.to_ne_bytes());
}

#[inline]
fn narrow_sample(v: f32, offset: f32, scale: f32) -> u8 {
    (v * scale + offset + 0.5).clamp(0.0, 255.0) as u8
}

/// Widens bytes to floats through a value table, one lane per byte.
pub fn widen_f32(table: &[f32; 256], src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.iter().zip(dst.chunks_exact_mut(4)) {
        write_f32(d, table[*s as usize]);
    }
}

/// Widens straight BGRA quads to premultiplied float quads.
///
/// Colors read through `table` (value or gamma table); alpha always uses
/// the full-range ramp and passes through after scaling the colors.
pub fn widen_f32_3a(table: &[f32; 256], src: &[u8], dst: &mut [u8]) {
    let alpha_table = SampleRange::Full.table();
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(16)) {
        let a = alpha_table[s[3] as usize];
        write_f32(&mut d[0..4], table[s[0] as usize] * a);
        write_f32(&mut d[4..8], table[s[1] as usize] * a);
        write_f32(&mut d[8..12], table[s[2] as usize] * a);
        write_f32(&mut d[12..16], a);
    }
}

/// Widens 3-byte pixels to 4-lane float quads, padding the last lane.
pub fn widen_f32_3x(table: &[f32; 256], src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(16)) {
        write_f32(&mut d[0..4], table[s[0] as usize]);
        write_f32(&mut d[4..8], table[s[1] as usize]);
        write_f32(&mut d[8..12], table[s[2] as usize]);
        write_f32(&mut d[12..16], 0.0);
    }
}

/// Narrows float lanes to bytes with clamping and round-to-nearest.
///
/// `encode` applies a companding LUT to each value before scaling.
pub fn narrow_f32(
    offset: f32,
    scale: f32,
    encode: Option<&InterpolatingLut>,
    src: &[u8],
    dst: &mut [u8],
) {
    for (s, d) in src.chunks_exact(4).zip(dst.iter_mut()) {
        let mut v = read_f32(s);
        if let Some(lut) = encode {
            v = lut.sample(v);
        }
        *d = narrow_sample(v, offset, scale);
    }
}

/// Narrows premultiplied float quads to straight BGRA bytes.
///
/// Divides by the stored alpha, optionally re-compands, clamps, and
/// scales. Quads whose alpha is below half an 8-bit step emit zeroes.
pub fn narrow_f32_3a(encode: Option<&InterpolatingLut>, src: &[u8], dst: &mut [u8]) {
    const ALPHA_MIN: f32 = 0.5 / 255.0;
    for (s, d) in src.chunks_exact(16).zip(dst.chunks_exact_mut(4)) {
        let a = read_f32(&s[12..16]);
        if a < ALPHA_MIN {
            d.fill(0);
            continue;
        }
        let inv = 1.0 / a;
        for c in 0..3 {
            let mut v = read_f32(&s[c * 4..c * 4 + 4]) * inv;
            if let Some(lut) = encode {
                v = lut.sample(v);
            }
            d[c] = narrow_sample(v, 0.0, 255.0);
        }
        d[3] = narrow_sample(a, 0.0, 255.0);
    }
}

/// Packs 4-lane float quads into tight 3-byte pixels.
pub fn narrow_f32_3x(encode: Option<&InterpolatingLut>, src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(16).zip(dst.chunks_exact_mut(3)) {
        for c in 0..3 {
            let mut v = read_f32(&s[c * 4..c * 4 + 4]);
            if let Some(lut) = encode {
                v = lut.sample(v);
            }
            d[c] = narrow_sample(v, 0.0, 255.0);
        }
    }
}

/// Widens bytes to UQ15 through a table.
pub fn widen_q15(table: &[u16; 256], src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.iter().zip(dst.chunks_exact_mut(2)) {
        write_u16(d, table[*s as usize]);
    }
}

/// Widens straight BGRA quads to premultiplied UQ15 quads.
pub fn widen_q15_3a(table: &[u16; 256], src: &[u8], dst: &mut [u8]) {
    let ramp = uq15_ramp();
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(8)) {
        let a = ramp[s[3] as usize] as u32;
        for c in 0..3 {
            let v = table[s[c] as usize] as u32;
            write_u16(&mut d[c * 2..c * 2 + 2], unfix15(v * a) as u16);
        }
        write_u16(&mut d[6..8], a as u16);
    }
}

/// Narrows UQ15 lanes to bytes by rescaling.
pub fn narrow_q15(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(2).zip(dst.iter_mut()) {
        let q = read_u16(s).min(UQ15_ONE) as u32;
        *d = unfix15(q * 255) as u8;
    }
}

/// Narrows linear UQ15 lanes to companded bytes through the exact table.
pub fn narrow_q15_gamma(src: &[u8], dst: &mut [u8]) {
    let table = gamma::uq15_linear_to_srgb();
    for (s, d) in src.chunks_exact(2).zip(dst.iter_mut()) {
        *d = table[read_u16(s).min(UQ15_ONE) as usize];
    }
}

/// Narrows premultiplied UQ15 quads to straight BGRA bytes.
pub fn narrow_q15_3a(gamma_encode: bool, src: &[u8], dst: &mut [u8]) {
    let table = gamma::uq15_linear_to_srgb();
    for (s, d) in src.chunks_exact(8).zip(dst.chunks_exact_mut(4)) {
        let a = read_u16(&s[6..8]).min(UQ15_ONE) as u32;
        if a == 0 {
            d.fill(0);
            continue;
        }
        for c in 0..3 {
            let v = read_u16(&s[c * 2..c * 2 + 2]) as u32;
            let straight = (((v << 15) + a / 2) / a).min(UQ15_ONE as u32);
            d[c] = if gamma_encode {
                table[straight as usize]
            } else {
                unfix15(straight * 255) as u8
            };
        }
        d[3] = unfix15(a * 255) as u8;
    }
}

/// Premultiplies straight 8-bit BGRA in place of `dst`.
pub fn premultiply_u8(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = s[3] as u32;
        d[0] = ((s[0] as u32 * a + 127) / 255) as u8;
        d[1] = ((s[1] as u32 * a + 127) / 255) as u8;
        d[2] = ((s[2] as u32 * a + 127) / 255) as u8;
        d[3] = s[3];
    }
}

/// Un-premultiplies 8-bit BGRA. Zero-alpha pixels stay zero.
pub fn unpremultiply_u8(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = s[3] as u32;
        if a == 0 {
            d.fill(0);
            continue;
        }
        d[0] = ((s[0] as u32 * 255 + a / 2) / a).min(255) as u8;
        d[1] = ((s[1] as u32 * 255 + a / 2) / a).min(255) as u8;
        d[2] = ((s[2] as u32 * 255 + a / 2) / a).min(255) as u8;
        d[3] = s[3];
    }
}

/// Inverts every byte of the line. Used for decoders that report
/// inverted CMYK.
pub fn invert_bytes(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.iter().zip(dst.iter_mut()) {
        *d = !*s;
    }
}

/// One line-level conversion step.
enum ConvertOp {
    Copy,
    WidenF32 { table: &'static [f32; 256] },
    WidenF32A3 { table: &'static [f32; 256] },
    WidenF32X3 { table: &'static [f32; 256] },
    NarrowF32 { offset: f32, scale: f32, encode: Option<InterpolatingLut> },
    NarrowF32A3 { encode: Option<InterpolatingLut> },
    NarrowF32X3 { encode: Option<InterpolatingLut> },
    FloatLut { lut: InterpolatingLut },
    FloatLutA3 { lut: InterpolatingLut },
    WidenQ15 { table: &'static [u16; 256] },
    WidenQ15A3 { table: &'static [u16; 256] },
    NarrowQ15,
    NarrowQ15Gamma,
    NarrowQ15A3 { gamma_encode: bool },
    PremultiplyU8,
    UnpremultiplyU8,
    Invert,
}

impl ConvertOp {
    fn run(&self, src: &[u8], dst: &mut [u8]) {
        match self {
            Self::Copy => dst.copy_from_slice(src),
            Self::WidenF32 { table } => widen_f32(table, src, dst),
            Self::WidenF32A3 { table } => widen_f32_3a(table, src, dst),
            Self::WidenF32X3 { table } => widen_f32_3x(table, src, dst),
            Self::NarrowF32 { offset, scale, encode } => {
                narrow_f32(*offset, *scale, encode.as_ref(), src, dst)
            }
            Self::NarrowF32A3 { encode } => narrow_f32_3a(encode.as_ref(), src, dst),
            Self::NarrowF32X3 { encode } => narrow_f32_3x(encode.as_ref(), src, dst),
            Self::FloatLut { lut } => {
                for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                    write_f32(d, lut.sample(read_f32(s)));
                }
            }
            Self::FloatLutA3 { lut } => {
                for (s, d) in src.chunks_exact(16).zip(dst.chunks_exact_mut(16)) {
                    let mut quad = [0f32; 4];
                    for (c, q) in quad.iter_mut().enumerate() {
                        *q = read_f32(&s[c * 4..c * 4 + 4]);
                    }
                    let mut out = [0f32; 4];
                    lut.convert_float_3a(&quad, &mut out);
                    for (c, v) in out.iter().enumerate() {
                        write_f32(&mut d[c * 4..c * 4 + 4], *v);
                    }
                }
            }
            Self::WidenQ15 { table } => widen_q15(table, src, dst),
            Self::WidenQ15A3 { table } => widen_q15_3a(table, src, dst),
            Self::NarrowQ15 => narrow_q15(src, dst),
            Self::NarrowQ15Gamma => narrow_q15_gamma(src, dst),
            Self::NarrowQ15A3 { gamma_encode } => narrow_q15_3a(*gamma_encode, src, dst),
            Self::PremultiplyU8 => premultiply_u8(src, dst),
            Self::UnpremultiplyU8 => unpremultiply_u8(src, dst),
            Self::Invert => invert_bytes(src, dst),
        }
    }
}

fn gamma_f32_table() -> &'static [f32; 256] {
    gamma::srgb_to_linear_f32()
}

/// Plans the line op for a `(from, to)` format pair, or `None` when the
/// pair has no direct conversion.
fn plan(from: &'static PixelFormat, to: &'static PixelFormat) -> Option<ConvertOp> {
    use FormatId as F;
    let op = match (from.id, to.id) {
        (a, b) if a == b => ConvertOp::Copy,
        (F::Grey8, F::Y8) | (F::Y8, F::Grey8) => ConvertOp::Copy,

        // 8-bit widening to float
        (F::Grey8, F::Grey32Float)
        | (F::Y8, F::Y32Float)
        | (F::Bgr24, F::Bgr96Float) => ConvertOp::WidenF32 {
            table: SampleRange::Full.table(),
        },
        (F::Y8Video, F::Y32Float) => ConvertOp::WidenF32 {
            table: SampleRange::VideoLuma.table(),
        },
        (F::Cb8, F::Cb32Float) | (F::Cr8, F::Cr32Float) => ConvertOp::WidenF32 {
            table: SampleRange::SignedFull.table(),
        },
        (F::Cb8Video, F::Cb32Float) | (F::Cr8Video, F::Cr32Float) => ConvertOp::WidenF32 {
            table: SampleRange::VideoChroma.table(),
        },
        (F::Grey8, F::Grey32FloatLinear)
        | (F::Y8, F::Y32FloatLinear)
        | (F::Bgr24, F::Bgr96FloatLinear) => ConvertOp::WidenF32 {
            table: gamma_f32_table(),
        },
        (F::Pbgra32, F::Pbgra128Float) => ConvertOp::WidenF32 {
            table: SampleRange::Full.table(),
        },
        (F::Bgra32, F::Pbgra128Float) => ConvertOp::WidenF32A3 {
            table: SampleRange::Full.table(),
        },
        (F::Bgra32, F::Pbgra128FloatLinear) => ConvertOp::WidenF32A3 {
            table: gamma_f32_table(),
        },
        (F::Bgr24, F::Bgrx128Float) => ConvertOp::WidenF32X3 {
            table: SampleRange::Full.table(),
        },
        (F::Bgr24, F::Bgrx128FloatLinear) => ConvertOp::WidenF32X3 {
            table: gamma_f32_table(),
        },

        // Float narrowing to 8-bit
        (F::Grey32Float, F::Grey8) | (F::Y32Float, F::Y8) | (F::Bgr96Float, F::Bgr24) => {
            ConvertOp::NarrowF32 { offset: 0.0, scale: 255.0, encode: None }
        }
        (F::Cb32Float, F::Cb8) | (F::Cr32Float, F::Cr8) => {
            ConvertOp::NarrowF32 { offset: 128.0, scale: 255.0, encode: None }
        }
        (F::Grey32FloatLinear, F::Grey8)
        | (F::Y32FloatLinear, F::Y8)
        | (F::Bgr96FloatLinear, F::Bgr24) => ConvertOp::NarrowF32 {
            offset: 0.0,
            scale: 255.0,
            encode: Some(InterpolatingLut::from_linear()),
        },
        (F::Pbgra128Float, F::Bgra32) => ConvertOp::NarrowF32A3 { encode: None },
        (F::Pbgra128FloatLinear, F::Bgra32) => ConvertOp::NarrowF32A3 {
            encode: Some(InterpolatingLut::from_linear()),
        },
        (F::Bgrx128Float, F::Bgr24) => ConvertOp::NarrowF32X3 { encode: None },
        (F::Bgrx128FloatLinear, F::Bgr24) => ConvertOp::NarrowF32X3 {
            encode: Some(InterpolatingLut::from_linear()),
        },

        // Float gamma shifts
        (F::Grey32Float, F::Grey32FloatLinear)
        | (F::Y32Float, F::Y32FloatLinear)
        | (F::Bgr96Float, F::Bgr96FloatLinear)
        | (F::Bgrx128Float, F::Bgrx128FloatLinear) => ConvertOp::FloatLut {
            lut: InterpolatingLut::to_linear(),
        },
        (F::Grey32FloatLinear, F::Grey32Float)
        | (F::Y32FloatLinear, F::Y32Float)
        | (F::Bgr96FloatLinear, F::Bgr96Float)
        | (F::Bgrx128FloatLinear, F::Bgrx128Float) => ConvertOp::FloatLut {
            lut: InterpolatingLut::from_linear(),
        },
        (F::Pbgra128Float, F::Pbgra128FloatLinear) => ConvertOp::FloatLutA3 {
            lut: InterpolatingLut::to_linear(),
        },
        (F::Pbgra128FloatLinear, F::Pbgra128Float) => ConvertOp::FloatLutA3 {
            lut: InterpolatingLut::from_linear(),
        },

        // 8-bit widening to UQ15 (linear working formats)
        (F::Grey8, F::Grey16UQ15Linear)
        | (F::Y8, F::Y16UQ15Linear)
        | (F::Bgr24, F::Bgr48UQ15Linear) => ConvertOp::WidenQ15 {
            table: gamma::srgb_to_linear_uq15(),
        },
        (F::Bgra32, F::Pbgra64UQ15Linear) => ConvertOp::WidenQ15A3 {
            table: gamma::srgb_to_linear_uq15(),
        },

        // UQ15 narrowing to 8-bit
        (F::Grey16UQ15Linear, F::Grey8)
        | (F::Y16UQ15Linear, F::Y8)
        | (F::Bgr48UQ15Linear, F::Bgr24) => ConvertOp::NarrowQ15Gamma,
        (F::Pbgra64UQ15Linear, F::Bgra32) => ConvertOp::NarrowQ15A3 { gamma_encode: true },

        // 8-bit alpha discipline
        (F::Bgra32, F::Pbgra32) => ConvertOp::PremultiplyU8,
        (F::Pbgra32, F::Bgra32) => ConvertOp::UnpremultiplyU8,

        _ => return None,
    };
    Some(op)
}

/// A chained transform converting lines between two registry formats.
///
/// Swizzle-only conversions (channel order, 4-to-3 packing) live in
/// [`crate::swizzle::SwizzleSource`]; this transform covers the numeric
/// and gamma-bearing conversions.
pub struct ConversionSource {
    prev: Box<dyn PixelSource>,
    format: &'static PixelFormat,
    op: ConvertOp,
    line: BufferLease,
    profiler: Rc<SourceProfiler>,
}

impl ConversionSource {
    /// Wraps `prev` with a conversion to `to`.
    ///
    /// Fails with an unsupported-format error when no kernel exists for
    /// the pair.
    pub fn new(prev: Box<dyn PixelSource>, to: FormatId) -> Result<Self> {
        let format = PixelFormat::from_id(to);
        let op = plan(prev.format(), format).ok_or_else(|| {
            Error::unsupported_format(prev.format().id.name(), "conversion")
        })?;
        let line = buffer::rent(prev.format().line_bytes(prev.width()))?;
        let profiler = SourceProfiler::new(format!(
            "convert {}->{}",
            prev.format().id,
            to.name()
        ));
        Ok(Self {
            prev,
            format,
            op,
            line,
            profiler,
        })
    }

    /// Wraps `prev` with a channel-inversion kernel, keeping the format.
    ///
    /// Used for decoders known to emit inverted CMYK.
    pub fn inverted(prev: Box<dyn PixelSource>) -> Result<Self> {
        let format = prev.format();
        let line = buffer::rent(format.line_bytes(prev.width()))?;
        let profiler = SourceProfiler::new(format!("invert {}", format.id));
        Ok(Self {
            prev,
            format,
            op: ConvertOp::Invert,
            line,
            profiler,
        })
    }
}

impl PixelSource for ConversionSource {
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

impl ChainedSource for ConversionSource {
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

    fn f32s(bytes: &[u8]) -> Vec<f32> {
        bytes.chunks_exact(4).map(read_f32).collect()
    }

    #[test]
    fn test_widen_narrow_f32_identity() {
        let src: Vec<u8> = (0..=255).collect();
        let mut wide = vec![0u8; 256 * 4];
        widen_f32(SampleRange::Full.table(), &src, &mut wide);
        let mut back = vec![0u8; 256];
        narrow_f32(0.0, 255.0, None, &wide, &mut back);
        assert_eq!(src, back);
    }

    #[test]
    fn test_widen_narrow_q15_identity() {
        let src: Vec<u8> = (0..=255).collect();
        let mut wide = vec![0u8; 256 * 2];
        widen_q15(uq15_ramp(), &src, &mut wide);
        let mut back = vec![0u8; 256];
        narrow_q15(&wide, &mut back);
        assert_eq!(src, back);
    }

    #[test]
    fn test_widen_narrow_q15_gamma_identity() {
        let src: Vec<u8> = (0..=255).collect();
        let mut wide = vec![0u8; 256 * 2];
        widen_q15(gamma::srgb_to_linear_uq15(), &src, &mut wide);
        let mut back = vec![0u8; 256];
        narrow_q15_gamma(&wide, &mut back);
        assert_eq!(src, back);
    }

    #[test]
    fn test_widen_3a_premultiplies() {
        let src = [200u8, 100, 50, 128];
        let mut wide = [0u8; 16];
        widen_f32_3a(SampleRange::Full.table(), &src, &mut wide);
        let v = f32s(&wide);
        let a = 128.0 / 255.0;
        assert!((v[0] - 200.0 / 255.0 * a).abs() < 1e-6);
        assert!((v[3] - a).abs() < 1e-6);
    }

    #[test]
    fn test_premultiply_roundtrip_within_one() {
        // Valid premultiplied pixels (color <= alpha) survive the trip
        // through straight representation within one 8-bit step.
        for a in 1..=255u8 {
            for c in [0u8, 1, 50, 128, 200, 255] {
                let c = c.min(a);
                let pre = [c, c, c, a];
                let mut straight = [0u8; 4];
                unpremultiply_u8(&pre, &mut straight);
                let mut back = [0u8; 4];
                premultiply_u8(&straight, &mut back);
                for (x, y) in pre.iter().zip(back.iter()) {
                    assert!(
                        (*x as i32 - *y as i32).abs() <= 1,
                        "a={} c={} {:?} vs {:?}",
                        a,
                        c,
                        pre,
                        back
                    );
                }
            }
        }
    }

    #[test]
    fn test_narrow_3a_zero_alpha_emits_zero_quad() {
        let mut wide = [0u8; 16];
        write_f32(&mut wide[0..4], 0.3);
        write_f32(&mut wide[4..8], 0.3);
        write_f32(&mut wide[8..12], 0.3);
        write_f32(&mut wide[12..16], 0.001);
        let mut out = [9u8; 4];
        narrow_f32_3a(None, &wide, &mut out);
        assert_eq!(out, [0, 0, 0, 0]);
    }

    #[test]
    fn test_float_3a_widen_narrow_roundtrip() {
        // Premultiply and divide back out stays within one 8-bit step
        // for alpha >= 1/255.
        for a in [1u8, 5, 64, 128, 254, 255] {
            let src = [10u8, 128, 250, a];
            let mut wide = [0u8; 16];
            widen_f32_3a(SampleRange::Full.table(), &src, &mut wide);
            let mut back = [0u8; 4];
            narrow_f32_3a(None, &wide, &mut back);
            for (s, b) in src.iter().zip(back.iter()) {
                assert!((*s as i32 - *b as i32).abs() <= 1, "a={} {:?} {:?}", a, src, back);
            }
        }
    }

    #[test]
    fn test_video_luma_table() {
        let t = SampleRange::VideoLuma.table();
        assert!((t[16] - 0.0).abs() < 1e-6);
        assert!((t[235] - 1.0).abs() < 1e-6);
        // Superblack and superwhite extend past [0, 1].
        assert!(t[0] < 0.0);
        assert!(t[255] > 1.0);
    }

    #[test]
    fn test_video_chroma_table() {
        let t = SampleRange::VideoChroma.table();
        assert!((t[128] - 0.0).abs() < 1e-6);
        assert!((t[240] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_invert() {
        let src = [0u8, 255, 0x0F];
        let mut dst = [0u8; 3];
        invert_bytes(&src, &mut dst);
        assert_eq!(dst, [255, 0, 0xF0]);
    }

    #[test]
    fn test_conversion_source_widen_line() {
        use raster_core::source::EmptySource;
        let prev = Box::new(EmptySource::new(FormatId::Bgr24, 4, 2));
        let mut conv = ConversionSource::new(prev, FormatId::Bgr96Float).unwrap();
        assert_eq!(conv.format().id, FormatId::Bgr96Float);
        let mut out = vec![0xFFu8; 4 * 12 * 2];
        conv.copy_pixels(PixelArea::of(4, 2), 48, &mut out).unwrap();
        assert!(f32s(&out).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_conversion_source_rejects_unknown_pair() {
        use raster_core::source::EmptySource;
        let prev = Box::new(EmptySource::new(FormatId::Cmyk32, 4, 2));
        assert!(ConversionSource::new(prev, FormatId::Bgr96Float).is_err());
    }

    #[test]
    fn test_video_widen_pure_red_setup() {
        // Y=76, full range maps near 0.298; the planar merge test relies
        // on these tables.
        let t = SampleRange::Full.table();
        assert!((t[76] - 76.0 / 255.0).abs() < 1e-6);
    }
}
