//! Pixel format descriptors and the interned format registry.
//!
//! Every buffer moving through the pipeline is described by a
//! [`PixelFormat`]: channel count, bits per pixel, numeric representation,
//! alpha discipline, color layout, transfer encoding, and value range.
//! Formats are value types interned by [`FormatId`]; transforms compare
//! ids, never field-by-field.
//!
//! # Representations
//!
//! Three numeric representations exist side by side:
//!
//! - [`PixelNumeric::UnsignedInt`] - 8 bits per channel, the external
//!   interchange representation
//! - [`PixelNumeric::FixedQ15`] - unsigned fixed point with 15 fractional
//!   bits per channel ([`UQ15_ONE`] = 1.0), the integer working
//!   representation
//! - [`PixelNumeric::Float`] - 32-bit float per channel, the default
//!   working representation
//!
//! # Usage
//!
//! ```rust
//! use raster_core::format::{FormatId, PixelFormat};
//!
//! let fmt = PixelFormat::from_id(FormatId::Bgra32);
//! assert_eq!(fmt.channels, 4);
//! assert_eq!(fmt.bytes_per_pixel(), 4);
//! assert_eq!(fmt.line_bytes(10), 40);
//! ```

/// One full-scale unit in unsigned Q15 fixed point.
///
/// `UQ15_ONE == 32768` represents 1.0. Q15 arithmetic uses `i32`/`u32`
/// accumulators and rounds by adding [`UQ15_HALF`] before shifting.
pub const UQ15_ONE: u16 = 1 << 15;

/// One half in unsigned Q15 fixed point, the rounding addend.
pub const UQ15_HALF: u16 = UQ15_ONE / 2;

/// Numeric representation of one channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelNumeric {
    /// 8-bit unsigned integer per channel.
    UnsignedInt,
    /// 16-bit unsigned fixed point, 15 fractional bits.
    FixedQ15,
    /// 32-bit IEEE float per channel.
    Float,
}

/// Alpha channel discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaRepr {
    /// No alpha channel (or an ignored padding lane).
    None,
    /// Straight (non-premultiplied) alpha.
    Straight,
    /// Color channels pre-scaled by alpha.
    Premultiplied,
}

/// Color layout of the channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRepr {
    /// Blue, green, red interleaved (optionally with alpha/padding).
    Bgr,
    /// Single achromatic channel.
    Grey,
    /// Luma plane of a Y'CbCr image.
    Y,
    /// Blue-difference chroma plane.
    Cb,
    /// Red-difference chroma plane.
    Cr,
    /// Cyan, magenta, yellow, key.
    Cmyk,
    /// Palette indices; colors live in a companion palette.
    Indexed,
}

/// Transfer encoding of the channel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueEncoding {
    /// Gamma-encoded (e.g. sRGB).
    Companded,
    /// Linear light.
    Linear,
    /// Carries no encoding information (indices, padding).
    Unspecified,
}

/// Nominal value range of the samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueRange {
    /// Full range: luma and chroma span the whole sample width.
    Full,
    /// Video (studio) range: luma 16..=235, chroma 16..=240.
    Video,
}

/// Stable identifier for every format in the registry.
///
/// The discriminant indexes the interned descriptor table; new ids append
/// at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FormatId {
    /// 8-bit greyscale, companded.
    Grey8,
    /// 8-bit full-range luma.
    Y8,
    /// 8-bit video-range luma.
    Y8Video,
    /// 8-bit full-range Cb plane.
    Cb8,
    /// 8-bit full-range Cr plane.
    Cr8,
    /// 8-bit video-range Cb plane.
    Cb8Video,
    /// 8-bit video-range Cr plane.
    Cr8Video,
    /// 24-bit interleaved blue, green, red.
    Bgr24,
    /// 32-bit BGRA with straight alpha.
    Bgra32,
    /// 32-bit BGRA with premultiplied alpha.
    Pbgra32,
    /// 32-bit BGR with an ignored padding byte.
    Bgrx32,
    /// 24-bit interleaved red, green, blue.
    Rgb24,
    /// 32-bit RGBA with straight alpha.
    Rgba32,
    /// 32-bit CMYK.
    Cmyk32,
    /// 8-bit palette indices.
    Indexed8,
    /// 32-bit float greyscale, companded.
    Grey32Float,
    /// 32-bit float greyscale, linear light.
    Grey32FloatLinear,
    /// 16-bit UQ15 greyscale, linear light.
    Grey16UQ15Linear,
    /// 32-bit float luma, companded.
    Y32Float,
    /// 32-bit float luma, linear light.
    Y32FloatLinear,
    /// 16-bit UQ15 luma, linear light.
    Y16UQ15Linear,
    /// 32-bit float Cb plane.
    Cb32Float,
    /// 32-bit float Cr plane.
    Cr32Float,
    /// 96-bit float BGR, companded.
    Bgr96Float,
    /// 96-bit float BGR, linear light.
    Bgr96FloatLinear,
    /// 128-bit float BGR with a padding lane, companded.
    Bgrx128Float,
    /// 128-bit float BGR with a padding lane, linear light.
    Bgrx128FloatLinear,
    /// 128-bit float premultiplied BGRA, companded.
    Pbgra128Float,
    /// 128-bit float premultiplied BGRA, linear light.
    Pbgra128FloatLinear,
    /// 48-bit UQ15 BGR, linear light.
    Bgr48UQ15Linear,
    /// 64-bit UQ15 premultiplied BGRA, linear light.
    Pbgra64UQ15Linear,
}

/// Number of formats in the registry.
pub const FORMAT_COUNT: usize = 31;

/// Interned descriptor for one pixel format.
///
/// Instances live in a const registry table; obtain them through
/// [`PixelFormat::from_id`] and compare by [`FormatId`].
///
/// # Invariant
///
/// `channels * bits_per_channel == bits_per_pixel`, except for
/// [`FormatId::Indexed8`] (8 bits per pixel, palette lookup).
#[derive(Debug, PartialEq, Eq)]
pub struct PixelFormat {
    /// Stable registry identifier.
    pub id: FormatId,
    /// Channel count: 1, 3, or 4.
    pub channels: u8,
    /// Total bits per pixel.
    pub bits_per_pixel: u16,
    /// Numeric representation per channel.
    pub numeric: PixelNumeric,
    /// Alpha discipline.
    pub alpha: AlphaRepr,
    /// Color layout.
    pub color: ColorRepr,
    /// Transfer encoding.
    pub encoding: ValueEncoding,
    /// Nominal sample range.
    pub range: ValueRange,
}

macro_rules! fmt {
    ($id:ident, $ch:expr, $bpp:expr, $num:ident, $alpha:ident, $color:ident, $enc:ident, $range:ident) => {
        PixelFormat {
            id: FormatId::$id,
            channels: $ch,
            bits_per_pixel: $bpp,
            numeric: PixelNumeric::$num,
            alpha: AlphaRepr::$alpha,
            color: ColorRepr::$color,
            encoding: ValueEncoding::$enc,
            range: ValueRange::$range,
        }
    };
}

/// The interned registry, indexed by `FormatId as usize`.
static REGISTRY: [PixelFormat; FORMAT_COUNT] = [
    fmt!(Grey8, 1, 8, UnsignedInt, None, Grey, Companded, Full),
    fmt!(Y8, 1, 8, UnsignedInt, None, Y, Companded, Full),
    fmt!(Y8Video, 1, 8, UnsignedInt, None, Y, Companded, Video),
    fmt!(Cb8, 1, 8, UnsignedInt, None, Cb, Unspecified, Full),
    fmt!(Cr8, 1, 8, UnsignedInt, None, Cr, Unspecified, Full),
    fmt!(Cb8Video, 1, 8, UnsignedInt, None, Cb, Unspecified, Video),
    fmt!(Cr8Video, 1, 8, UnsignedInt, None, Cr, Unspecified, Video),
    fmt!(Bgr24, 3, 24, UnsignedInt, None, Bgr, Companded, Full),
    fmt!(Bgra32, 4, 32, UnsignedInt, Straight, Bgr, Companded, Full),
    fmt!(Pbgra32, 4, 32, UnsignedInt, Premultiplied, Bgr, Companded, Full),
    fmt!(Bgrx32, 4, 32, UnsignedInt, None, Bgr, Companded, Full),
    fmt!(Rgb24, 3, 24, UnsignedInt, None, Bgr, Companded, Full),
    fmt!(Rgba32, 4, 32, UnsignedInt, Straight, Bgr, Companded, Full),
    fmt!(Cmyk32, 4, 32, UnsignedInt, None, Cmyk, Unspecified, Full),
    fmt!(Indexed8, 1, 8, UnsignedInt, None, Indexed, Unspecified, Full),
    fmt!(Grey32Float, 1, 32, Float, None, Grey, Companded, Full),
    fmt!(Grey32FloatLinear, 1, 32, Float, None, Grey, Linear, Full),
    fmt!(Grey16UQ15Linear, 1, 16, FixedQ15, None, Grey, Linear, Full),
    fmt!(Y32Float, 1, 32, Float, None, Y, Companded, Full),
    fmt!(Y32FloatLinear, 1, 32, Float, None, Y, Linear, Full),
    fmt!(Y16UQ15Linear, 1, 16, FixedQ15, None, Y, Linear, Full),
    fmt!(Cb32Float, 1, 32, Float, None, Cb, Unspecified, Full),
    fmt!(Cr32Float, 1, 32, Float, None, Cr, Unspecified, Full),
    fmt!(Bgr96Float, 3, 96, Float, None, Bgr, Companded, Full),
    fmt!(Bgr96FloatLinear, 3, 96, Float, None, Bgr, Linear, Full),
    fmt!(Bgrx128Float, 4, 128, Float, None, Bgr, Companded, Full),
    fmt!(Bgrx128FloatLinear, 4, 128, Float, None, Bgr, Linear, Full),
    fmt!(Pbgra128Float, 4, 128, Float, Premultiplied, Bgr, Companded, Full),
    fmt!(Pbgra128FloatLinear, 4, 128, Float, Premultiplied, Bgr, Linear, Full),
    fmt!(Bgr48UQ15Linear, 3, 48, FixedQ15, None, Bgr, Linear, Full),
    fmt!(Pbgra64UQ15Linear, 4, 64, FixedQ15, Premultiplied, Bgr, Linear, Full),
];

impl FormatId {
    /// Short stable name, suitable for error messages and logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Grey8 => "Grey8",
            Self::Y8 => "Y8",
            Self::Y8Video => "Y8Video",
            Self::Cb8 => "Cb8",
            Self::Cr8 => "Cr8",
            Self::Cb8Video => "Cb8Video",
            Self::Cr8Video => "Cr8Video",
            Self::Bgr24 => "Bgr24",
            Self::Bgra32 => "Bgra32",
            Self::Pbgra32 => "Pbgra32",
            Self::Bgrx32 => "Bgrx32",
            Self::Rgb24 => "Rgb24",
            Self::Rgba32 => "Rgba32",
            Self::Cmyk32 => "Cmyk32",
            Self::Indexed8 => "Indexed8",
            Self::Grey32Float => "Grey32Float",
            Self::Grey32FloatLinear => "Grey32FloatLinear",
            Self::Grey16UQ15Linear => "Grey16UQ15Linear",
            Self::Y32Float => "Y32Float",
            Self::Y32FloatLinear => "Y32FloatLinear",
            Self::Y16UQ15Linear => "Y16UQ15Linear",
            Self::Cb32Float => "Cb32Float",
            Self::Cr32Float => "Cr32Float",
            Self::Bgr96Float => "Bgr96Float",
            Self::Bgr96FloatLinear => "Bgr96FloatLinear",
            Self::Bgrx128Float => "Bgrx128Float",
            Self::Bgrx128FloatLinear => "Bgrx128FloatLinear",
            Self::Pbgra128Float => "Pbgra128Float",
            Self::Pbgra128FloatLinear => "Pbgra128FloatLinear",
            Self::Bgr48UQ15Linear => "Bgr48UQ15Linear",
            Self::Pbgra64UQ15Linear => "Pbgra64UQ15Linear",
        }
    }
}

impl std::fmt::Display for FormatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl PixelFormat {
    /// Looks up the interned descriptor for a registry id.
    #[inline]
    pub fn from_id(id: FormatId) -> &'static PixelFormat {
        &REGISTRY[id as usize]
    }

    /// Bits used by one channel sample.
    #[inline]
    pub const fn bits_per_channel(&self) -> u16 {
        match self.numeric {
            PixelNumeric::UnsignedInt => 8,
            PixelNumeric::FixedQ15 => 16,
            PixelNumeric::Float => 32,
        }
    }

    /// Bytes per pixel. All registry formats are byte-aligned.
    #[inline]
    pub const fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel / 8) as usize
    }

    /// Bytes per channel sample.
    #[inline]
    pub const fn bytes_per_channel(&self) -> usize {
        (self.bits_per_channel() / 8) as usize
    }

    /// Tightly packed bytes for `width` pixels of this format.
    #[inline]
    pub const fn line_bytes(&self, width: u32) -> usize {
        ((width as usize) * (self.bits_per_pixel as usize) + 7) / 8
    }

    /// Whether the samples are linear light.
    #[inline]
    pub const fn is_linear(&self) -> bool {
        matches!(self.encoding, ValueEncoding::Linear)
    }

    /// Whether the format carries a meaningful alpha channel.
    #[inline]
    pub const fn has_alpha(&self) -> bool {
        !matches!(self.alpha, AlphaRepr::None)
    }

    /// Whether the color channels are pre-scaled by alpha.
    #[inline]
    pub const fn is_premultiplied(&self) -> bool {
        matches!(self.alpha, AlphaRepr::Premultiplied)
    }

    /// Whether this is a single plane of a Y'CbCr image.
    #[inline]
    pub const fn is_planar_component(&self) -> bool {
        matches!(self.color, ColorRepr::Y | ColorRepr::Cb | ColorRepr::Cr)
    }

    /// Whether the samples use the video (studio) range.
    #[inline]
    pub const fn is_video_range(&self) -> bool {
        matches!(self.range, ValueRange::Video)
    }

    /// Number of color channels, excluding alpha and padding lanes.
    #[inline]
    pub const fn color_channels(&self) -> u8 {
        match (self.channels, self.color) {
            (4, ColorRepr::Cmyk) => 4,
            (4, _) => 3,
            (n, _) => n,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_index_matches_id() {
        for (i, fmt) in REGISTRY.iter().enumerate() {
            assert_eq!(fmt.id as usize, i, "registry order broken at {}", fmt.id);
            assert!(std::ptr::eq(PixelFormat::from_id(fmt.id), fmt));
        }
    }

    #[test]
    fn test_channel_width_invariant() {
        for fmt in &REGISTRY {
            if matches!(fmt.color, ColorRepr::Indexed) {
                assert_eq!(fmt.bits_per_pixel, 8);
                continue;
            }
            assert_eq!(
                fmt.channels as u16 * fmt.bits_per_channel(),
                fmt.bits_per_pixel,
                "channel width invariant broken for {}",
                fmt.id
            );
        }
    }

    #[test]
    fn test_line_bytes() {
        assert_eq!(PixelFormat::from_id(FormatId::Grey8).line_bytes(10), 10);
        assert_eq!(PixelFormat::from_id(FormatId::Bgr24).line_bytes(10), 30);
        assert_eq!(PixelFormat::from_id(FormatId::Bgra32).line_bytes(10), 40);
        assert_eq!(PixelFormat::from_id(FormatId::Bgr48UQ15Linear).line_bytes(3), 18);
        assert_eq!(PixelFormat::from_id(FormatId::Bgrx128Float).line_bytes(2), 32);
    }

    #[test]
    fn test_predicates() {
        let pbgra = PixelFormat::from_id(FormatId::Pbgra128FloatLinear);
        assert!(pbgra.is_linear());
        assert!(pbgra.has_alpha());
        assert!(pbgra.is_premultiplied());
        assert!(!pbgra.is_video_range());

        let y = PixelFormat::from_id(FormatId::Y8Video);
        assert!(y.is_planar_component());
        assert!(y.is_video_range());
        assert!(!y.has_alpha());
    }

    #[test]
    fn test_uq15_constants() {
        assert_eq!(UQ15_ONE, 32768);
        assert_eq!(UQ15_HALF, 16384);
    }
}
