//! sRGB transfer functions and gamma lookup tables.
//!
//! The pipeline converts between companded (gamma-encoded) and linear
//! light at the working-format boundary. Three mechanisms exist:
//!
//! - Scalar [`eotf`]/[`oetf`] per IEC 61966-2-1:1999
//! - Exact byte tables for the 8-bit and UQ15 paths
//!   ([`srgb_to_linear_f32`], [`srgb_to_linear_uq15`], [`uq15_linear_to_srgb`])
//! - [`InterpolatingLut`] for the float path and for table-based color
//!   profiles, which linearly interpolates between LUT entries
//!
//! # Range
//!
//! - Input/Output: [0, 1] (float) or full sample range (integer)

use raster_core::UQ15_ONE;
use std::sync::OnceLock;

/// sRGB EOTF: decodes companded values to linear light.
///
/// # Formula
///
/// ```text
/// if V <= 0.04045:
///     L = V / 12.92
/// else:
///     L = ((V + 0.055) / 1.055)^2.4
/// ```
///
/// # Example
///
/// ```rust
/// use raster_ops::gamma::eotf;
///
/// let linear = eotf(0.5);
/// assert!((linear - 0.214).abs() < 0.01);
/// ```
#[inline]
pub fn eotf(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB OETF: encodes linear light to companded values.
///
/// # Formula
///
/// ```text
/// if L <= 0.0031308:
///     V = L * 12.92
/// else:
///     V = 1.055 * L^(1/2.4) - 0.055
/// ```
///
/// # Example
///
/// ```rust
/// use raster_ops::gamma::oetf;
///
/// let encoded = oetf(0.214);
/// assert!((encoded - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn oetf(l: f32) -> f32 {
    if l <= 0.0031308 {
        l * 12.92
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    }
}

/// Companded byte to linear float, exact per-value table.
pub fn srgb_to_linear_f32() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [0f32; 256];
        for (i, v) in t.iter_mut().enumerate() {
            *v = eotf(i as f32 / 255.0);
        }
        t
    })
}

/// Companded byte to linear UQ15, exact per-value table.
pub fn srgb_to_linear_uq15() -> &'static [u16; 256] {
    static TABLE: OnceLock<[u16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [0u16; 256];
        for (i, v) in t.iter_mut().enumerate() {
            *v = (eotf(i as f32 / 255.0) * UQ15_ONE as f32 + 0.5) as u16;
        }
        t
    })
}

/// Linear UQ15 to companded byte, exact table over all 32769 inputs.
pub fn uq15_linear_to_srgb() -> &'static [u8] {
    static TABLE: OnceLock<Vec<u8>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..=UQ15_ONE as u32)
            .map(|q| {
                let l = q as f32 / UQ15_ONE as f32;
                (oetf(l) * 255.0 + 0.5) as u8
            })
            .collect()
    })
}

/// A lookup table evaluated with linear interpolation between entries.
///
/// For an input `x`, the kernel computes `f = clamp(x * lutmax, 0, lutmax)`,
/// `i = trunc(f)`, and returns `lerp(lut[i], lut[i+1], f - i)`. The table
/// stores one entry past `lutmax` so the interpolated read at the top of
/// the range stays in bounds.
pub struct InterpolatingLut {
    table: Vec<f32>,
    lutmax: f32,
}

impl InterpolatingLut {
    /// Builds a table of `lutmax + 1` sample points of `f` over [0, 1].
    pub fn from_fn(lutmax: usize, f: impl Fn(f32) -> f32) -> Self {
        let mut table = Vec::with_capacity(lutmax + 2);
        for i in 0..=lutmax {
            table.push(f(i as f32 / lutmax as f32));
        }
        table.push(table[lutmax]);
        Self {
            table,
            lutmax: lutmax as f32,
        }
    }

    /// Wraps an externally supplied table of samples over [0, 1].
    pub fn from_table(mut table: Vec<f32>) -> Option<Self> {
        if table.len() < 2 {
            return None;
        }
        let lutmax = table.len() - 1;
        table.push(table[lutmax]);
        Some(Self {
            table,
            lutmax: lutmax as f32,
        })
    }

    /// Companded-to-linear table sampled from the sRGB EOTF.
    pub fn to_linear() -> Self {
        Self::from_fn(1024, eotf)
    }

    /// Linear-to-companded table sampled from the sRGB OETF.
    pub fn from_linear() -> Self {
        Self::from_fn(4096, oetf)
    }

    /// Evaluates one sample.
    #[inline]
    pub fn sample(&self, x: f32) -> f32 {
        let f = (x * self.lutmax).clamp(0.0, self.lutmax);
        let i = f as usize;
        let frac = f - i as f32;
        let a = self.table[i];
        let b = self.table[i + 1];
        a + (b - a) * frac
    }

    /// Converts a line of float samples in place of `dst`.
    pub fn convert_float(&self, src: &[f32], dst: &mut [f32]) {
        for (s, d) in src.iter().zip(dst.iter_mut()) {
            *d = self.sample(*s);
        }
    }

    /// Converts a line of premultiplied 4-lane quads.
    ///
    /// Colors are divided by alpha before lookup and re-multiplied after;
    /// the alpha lane passes through untouched. Quads with near-zero
    /// alpha emit zeroes.
    pub fn convert_float_3a(&self, src: &[f32], dst: &mut [f32]) {
        for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
            let a = s[3];
            if a < f32::EPSILON {
                d.fill(0.0);
                continue;
            }
            let inv = 1.0 / a;
            d[0] = self.sample(s[0] * inv) * a;
            d[1] = self.sample(s[1] * inv) * a;
            d[2] = self.sample(s[2] * inv) * a;
            d[3] = a;
        }
    }
}
