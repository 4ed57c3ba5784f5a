//! Separable resampling with precomputed weight tables.
//!
//! For each output axis a [`WeightTable`] maps every output position to a
//! window of input samples and normalized kernel weights. The
//! [`ScalerSource`] transform then resamples line-at-a-time: the
//! horizontal pass reads one pulled input line into a scratch buffer, and
//! the vertical pass keeps a small ring of horizontally-resampled lines,
//! emitting one output line per step.
//!
//! # Filters
//!
//! - [`Interpolation::NearestNeighbor`] - point sampling, no filtering
//! - [`Interpolation::Linear`] - triangle filter
//! - [`Interpolation::CatmullRom`] - Catmull-Rom cubic
//! - [`Interpolation::Lanczos2`] / [`Interpolation::Lanczos3`] - windowed
//!   sinc, best for downscaling
//! - [`Interpolation::Spline36`] - piecewise cubic spline
//!
//! # Weight normalization
//!
//! Every weight row sums to exactly 1.0; the residual of the floating
//! normalization is folded into the largest weight. Q15 tables round each
//! weight and correct the drift so rows sum to exactly `UQ15_ONE`. A
//! constant input is therefore preserved bit-for-bit by any filter.

use crate::error::{OpsError, OpsResult};
use raster_core::buffer;
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, Error, PixelArea, PixelFormat, PixelNumeric, PixelSource, Result, UQ15_ONE,
};
use smallvec::SmallVec;
use std::rc::Rc;
use tracing::debug;

/// Interpolation kernel for resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Interpolation {
    /// Point sampling (no interpolation).
    NearestNeighbor,
    /// Triangle filter.
    Linear,
    /// Catmull-Rom cubic.
    CatmullRom,
    /// Lanczos windowed sinc, 2 lobes.
    Lanczos2,
    /// Lanczos windowed sinc, 3 lobes.
    #[default]
    Lanczos3,
    /// Piecewise cubic spline over 3 lobes.
    Spline36,
}

impl Interpolation {
    /// Support radius of the kernel in input samples at unit scale.
    #[inline]
    pub fn support(&self) -> f64 {
        match self {
            Self::NearestNeighbor => 0.5,
            Self::Linear => 1.0,
            Self::CatmullRom => 2.0,
            Self::Lanczos2 => 2.0,
            Self::Lanczos3 => 3.0,
            Self::Spline36 => 3.0,
        }
    }

    /// Whether this kernel point-samples rather than filters.
    ///
    /// Point samplers disable the hybrid box pre-scaler.
    #[inline]
    pub fn is_point_sampler(&self) -> bool {
        matches!(self, Self::NearestNeighbor)
    }

    /// Evaluates the kernel at distance `x` from the sample center.
    pub fn weight(&self, x: f64) -> f64 {
        let ax = x.abs();
        match self {
            Self::NearestNeighbor => {
                if ax < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Linear => {
                if ax < 1.0 {
                    1.0 - ax
                } else {
                    0.0
                }
            }
            Self::CatmullRom => {
                if ax < 1.0 {
                    (1.5 * ax - 2.5) * ax * ax + 1.0
                } else if ax < 2.0 {
                    ((-0.5 * ax + 2.5) * ax - 4.0) * ax + 2.0
                } else {
                    0.0
                }
            }
            Self::Lanczos2 => lanczos(ax, 2.0),
            Self::Lanczos3 => lanczos(ax, 3.0),
            Self::Spline36 => {
                if ax < 1.0 {
                    ((13.0 / 11.0 * ax - 453.0 / 209.0) * ax - 3.0 / 209.0) * ax + 1.0
                } else if ax < 2.0 {
                    let x = ax - 1.0;
                    ((-6.0 / 11.0 * x + 270.0 / 209.0) * x - 156.0 / 209.0) * x
                } else if ax < 3.0 {
                    let x = ax - 2.0;
                    ((1.0 / 11.0 * x - 45.0 / 209.0) * x + 26.0 / 209.0) * x
                } else {
                    0.0
                }
            }
        }
    }
}

#[inline]
fn lanczos(ax: f64, lobes: f64) -> f64 {
    if ax < 1e-9 {
        1.0
    } else if ax < lobes {
        let pi_x = std::f64::consts::PI * ax;
        let pi_x_l = pi_x / lobes;
        (pi_x.sin() / pi_x) * (pi_x_l.sin() / pi_x_l)
    } else {
        0.0
    }
}

/// Weight window for one output position.
#[derive(Debug, Clone)]
pub struct WeightRow {
    /// First input sample index.
    pub start: u32,
    /// Normalized weights, one per input sample.
    pub weights: SmallVec<[f32; 8]>,
}

/// Precomputed per-axis resampling weights.
#[derive(Debug, Clone)]
pub struct WeightTable {
    rows: Vec<WeightRow>,
    in_size: u32,
}

impl WeightTable {
    /// Builds the weight table for one axis.
    ///
    /// `offset` is a constant sub-pixel displacement added to every input
    /// sample position; chroma siting uses it to align subsampled planes.
    pub fn build(
        kernel: Interpolation,
        in_size: u32,
        out_size: u32,
        offset: f64,
    ) -> OpsResult<Self> {
        if in_size == 0 || out_size == 0 {
            return Err(OpsError::InvalidDimensions(format!(
                "cannot resample {in_size} samples to {out_size}"
            )));
        }
        let scale = in_size as f64 / out_size as f64;
        let fscale = scale.max(1.0);
        let support = kernel.support() * fscale;

        let mut rows = Vec::with_capacity(out_size as usize);
        for i in 0..out_size {
            let center = (i as f64 + 0.5) * scale - 0.5 + offset;
            let first = (center - support).floor() as i64;
            let last = (center + support).ceil() as i64;

            let mut weights: SmallVec<[f64; 8]> = SmallVec::new();
            for j in first..=last {
                weights.push(kernel.weight((j as f64 - center) / fscale));
            }

            // Fold out-of-range samples into the edges.
            let mut start = first;
            while start < 0 && weights.len() > 1 {
                let w = weights.remove(0);
                weights[0] += w;
                start += 1;
            }
            let mut end = start + weights.len() as i64;
            while end > in_size as i64 && weights.len() > 1 {
                let w = weights.pop().unwrap_or(0.0);
                let n = weights.len();
                weights[n - 1] += w;
                end -= 1;
            }
            let start = start.clamp(0, in_size as i64 - 1) as u32;

            // Trim zero-weight edges left over from window rounding.
            while weights.len() > 1 && weights[weights.len() - 1] == 0.0 {
                weights.pop();
            }
            let mut start = start;
            while weights.len() > 1 && weights[0] == 0.0 {
                weights.remove(0);
                start += 1;
            }

            let sum: f64 = weights.iter().sum();
            if sum.abs() < 1e-12 {
                return Err(OpsError::InvalidParameter(
                    "kernel weights sum to zero".into(),
                ));
            }

            let mut row: SmallVec<[f32; 8]> =
                weights.iter().map(|w| (*w / sum) as f32).collect();
            normalize_exact(&mut row);
            rows.push(WeightRow { start, weights: row });
        }
        Ok(Self { rows, in_size })
    }

    /// Number of output positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The weight window for output position `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &WeightRow {
        &self.rows[i]
    }

    /// Largest window length across all rows.
    pub fn max_window(&self) -> usize {
        self.rows.iter().map(|r| r.weights.len()).max().unwrap_or(0)
    }

    /// Input size the table was built for.
    #[inline]
    pub fn in_size(&self) -> u32 {
        self.in_size
    }

    /// Converts to Q15 weights with drift correction.
    pub fn to_q15(&self) -> WeightTableQ15 {
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut weights: SmallVec<[i32; 8]> = r
                    .weights
                    .iter()
                    .map(|w| (f64::from(*w) * f64::from(UQ15_ONE)).round() as i32)
                    .collect();
                let total: i32 = weights.iter().sum();
                let drift = i32::from(UQ15_ONE) - total;
                if drift != 0 {
                    if let Some(idx) = weights
                        .iter()
                        .enumerate()
                        .max_by_key(|(_, w)| w.abs())
                        .map(|(i, _)| i)
                    {
                        weights[idx] += drift;
                    }
                }
                WeightRowQ15 {
                    start: r.start,
                    weights,
                }
            })
            .collect();
        WeightTableQ15 {
            rows,
            in_size: self.in_size,
        }
    }
}

/// Folds the float normalization residual into the largest weight so the
/// left-to-right sum compares equal to 1.0.
fn normalize_exact(weights: &mut [f32]) {
    for _ in 0..4 {
        let sum: f32 = weights.iter().sum();
        if sum == 1.0 {
            return;
        }
        if let Some(idx) = weights
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))
            .map(|(i, _)| i)
        {
            weights[idx] += 1.0 - sum;
        }
    }
}

/// Q15 weight window for one output position.
#[derive(Debug, Clone)]
pub struct WeightRowQ15 {
    /// First input sample index.
    pub start: u32,
    /// Q15 weights summing to exactly `UQ15_ONE`.
    pub weights: SmallVec<[i32; 8]>,
}

/// Q15 rendition of a [`WeightTable`].
#[derive(Debug, Clone)]
pub struct WeightTableQ15 {
    rows: Vec<WeightRowQ15>,
    in_size: u32,
}

impl WeightTableQ15 {
    /// The weight window for output position `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &WeightRowQ15 {
        &self.rows[i]
    }

    /// Number of output positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Largest window length across all rows.
    pub fn max_window(&self) -> usize {
        self.rows.iter().map(|r| r.weights.len()).max().unwrap_or(0)
    }
}

/// Convolves one horizontal line of float samples.
fn convolve_h_f32(table: &WeightTable, channels: usize, src: &[f32], dst: &mut [f32]) {
    for (i, out) in dst.chunks_exact_mut(channels).enumerate() {
        let row = table.row(i);
        out.fill(0.0);
        for (k, w) in row.weights.iter().enumerate() {
            let s = (row.start as usize + k).min(table.in_size as usize - 1) * channels;
            for c in 0..channels {
                out[c] += src[s + c] * w;
            }
        }
    }
}

/// Convolves one horizontal line of Q15 samples.
fn convolve_h_q15(table: &WeightTableQ15, channels: usize, src: &[u16], dst: &mut [u16]) {
    for (i, out) in dst.chunks_exact_mut(channels).enumerate() {
        let row = table.row(i);
        for c in 0..channels {
            let mut acc: i64 = 0;
            for (k, w) in row.weights.iter().enumerate() {
                let s = (row.start as usize + k).min(table.in_size as usize - 1) * channels;
                acc += i64::from(src[s + c]) * i64::from(*w);
            }
            out[c] = unfix15_i64(acc);
        }
    }
}

#[inline]
fn unfix15_i64(acc: i64) -> u16 {
    ((acc + (1 << 14)) >> 15).clamp(0, i64::from(UQ15_ONE)) as u16
}

enum Lanes {
    F32 {
        x: WeightTable,
        y: WeightTable,
        src_line: Vec<f32>,
        ring: Vec<Vec<f32>>,
        ring_ys: Vec<i64>,
    },
    Q15 {
        x: WeightTableQ15,
        y: WeightTableQ15,
        src_line: Vec<u16>,
        ring: Vec<Vec<u16>>,
        ring_ys: Vec<i64>,
    },
}

/// A chained transform resampling its upstream to new dimensions.
///
/// Separable: the horizontal pass runs when an input line enters the ring;
/// the vertical pass combines ring lines per output row. Works on float
/// and UQ15 working formats; 8-bit sources convert before scaling.
pub struct ScalerSource {
    prev: Box<dyn PixelSource>,
    format: &'static PixelFormat,
    out_w: u32,
    out_h: u32,
    lanes: Lanes,
    profiler: Rc<SourceProfiler>,
}

impl ScalerSource {
    /// Creates a resampler producing `out_w` x `out_h` pixels.
    pub fn new(
        prev: Box<dyn PixelSource>,
        out_w: u32,
        out_h: u32,
        kernel: Interpolation,
    ) -> Result<Self> {
        Self::with_offsets(prev, out_w, out_h, kernel, 0.0, 0.0)
    }

    /// Creates a resampler with constant sub-pixel input offsets.
    ///
    /// The offsets shift every input sample position; chroma planes use
    /// them to compensate siting and odd-crop displacement.
    pub fn with_offsets(
        prev: Box<dyn PixelSource>,
        out_w: u32,
        out_h: u32,
        kernel: Interpolation,
        offset_x: f64,
        offset_y: f64,
    ) -> Result<Self> {
        let format = prev.format();
        let channels = format.channels as usize;
        let x = WeightTable::build(kernel, prev.width(), out_w, offset_x)
            .map_err(Error::from)?;
        let y = WeightTable::build(kernel, prev.height(), out_h, offset_y)
            .map_err(Error::from)?;
        let window = y.max_window();
        let line_len = out_w as usize * channels;
        let src_len = prev.width() as usize * channels;

        let lanes = match format.numeric {
            PixelNumeric::Float => Lanes::F32 {
                x,
                y,
                src_line: vec![0.0; src_len],
                ring: vec![vec![0.0; line_len]; window],
                ring_ys: vec![-1; window],
            },
            PixelNumeric::FixedQ15 => Lanes::Q15 {
                x: x.to_q15(),
                y: y.to_q15(),
                src_line: vec![0; src_len],
                ring: vec![vec![0; line_len]; window],
                ring_ys: vec![-1; window],
            },
            PixelNumeric::UnsignedInt => {
                return Err(Error::unsupported_format(format.id.name(), "resample"))
            }
        };

        debug!(
            from_w = prev.width(),
            from_h = prev.height(),
            out_w,
            out_h,
            ?kernel,
            "building resampler"
        );
        let profiler = SourceProfiler::new(format!(
            "scale {}x{}->{}x{}",
            prev.width(),
            prev.height(),
            out_w,
            out_h
        ));
        Ok(Self {
            prev,
            format,
            out_w,
            out_h,
            lanes,
            profiler,
        })
    }

    fn fill_ring_f32(&mut self, in_y: u32) -> Result<usize> {
        let channels = self.format.channels as usize;
        let src_bytes = self.format.line_bytes(self.prev.width());
        let Lanes::F32 {
            x,
            src_line,
            ring,
            ring_ys,
            ..
        } = &mut self.lanes
        else {
            unreachable!()
        };
        let slot = in_y as usize % ring.len();
        if ring_ys[slot] == i64::from(in_y) {
            return Ok(slot);
        }

        let mut raw = buffer::rent(src_bytes)?;
        self.profiler.pause();
        self.prev.copy_pixels(
            PixelArea::new(0, in_y, self.prev.width(), 1),
            src_bytes,
            &mut raw,
        )?;
        self.profiler.resume();
        for (s, d) in raw.chunks_exact(4).zip(src_line.iter_mut()) {
            *d = f32::from_ne_bytes([s[0], s[1], s[2], s[3]]);
        }
        convolve_h_f32(x, channels, src_line, &mut ring[slot]);
        ring_ys[slot] = i64::from(in_y);
        Ok(slot)
    }

    fn fill_ring_q15(&mut self, in_y: u32) -> Result<usize> {
        let channels = self.format.channels as usize;
        let src_bytes = self.format.line_bytes(self.prev.width());
        let Lanes::Q15 {
            x,
            src_line,
            ring,
            ring_ys,
            ..
        } = &mut self.lanes
        else {
            unreachable!()
        };
        let slot = in_y as usize % ring.len();
        if ring_ys[slot] == i64::from(in_y) {
            return Ok(slot);
        }

        let mut raw = buffer::rent(src_bytes)?;
        self.profiler.pause();
        self.prev.copy_pixels(
            PixelArea::new(0, in_y, self.prev.width(), 1),
            src_bytes,
            &mut raw,
        )?;
        self.profiler.resume();
        for (s, d) in raw.chunks_exact(2).zip(src_line.iter_mut()) {
            *d = u16::from_ne_bytes([s[0], s[1]]);
        }
        convolve_h_q15(x, channels, src_line, &mut ring[slot]);
        ring_ys[slot] = i64::from(in_y);
        Ok(slot)
    }

    fn emit_row_f32(&mut self, out_y: u32, out: &mut [u8], x0: u32) -> Result<()> {
        let channels = self.format.channels as usize;
        let (start, count) = {
            let Lanes::F32 { y, .. } = &self.lanes else {
                unreachable!()
            };
            let row = y.row(out_y as usize);
            (row.start, row.weights.len())
        };
        let mut slots = SmallVec::<[usize; 8]>::new();
        for k in 0..count {
            let in_y = (start + k as u32).min(self.prev.height() - 1);
            slots.push(self.fill_ring_f32(in_y)?);
        }
        let Lanes::F32 { y, ring, .. } = &self.lanes else {
            unreachable!()
        };
        let row = y.row(out_y as usize);
        for (xi, px) in out.chunks_exact_mut(channels * 4).enumerate() {
            let x = (x0 as usize + xi) * channels;
            for c in 0..channels {
                let mut acc = 0.0f32;
                for (k, w) in row.weights.iter().enumerate() {
                    acc += ring[slots[k]][x + c] * w;
                }
                px[c * 4..c * 4 + 4].copy_from_slice(&acc.to_ne_bytes());
            }
        }
        Ok(())
    }

    fn emit_row_q15(&mut self, out_y: u32, out: &mut [u8], x0: u32) -> Result<()> {
        let channels = self.format.channels as usize;
        let (start, count) = {
            let Lanes::Q15 { y, .. } = &self.lanes else {
                unreachable!()
            };
            let row = y.row(out_y as usize);
            (row.start, row.weights.len())
        };
        let mut slots = SmallVec::<[usize; 8]>::new();
        for k in 0..count {
            let in_y = (start + k as u32).min(self.prev.height() - 1);
            slots.push(self.fill_ring_q15(in_y)?);
        }
        let Lanes::Q15 { y, ring, .. } = &self.lanes else {
            unreachable!()
        };
        let row = y.row(out_y as usize);
        for (xi, px) in out.chunks_exact_mut(channels * 2).enumerate() {
            let x = (x0 as usize + xi) * channels;
            for c in 0..channels {
                let mut acc: i64 = 0;
                for (k, w) in row.weights.iter().enumerate() {
                    acc += i64::from(ring[slots[k]][x + c]) * i64::from(*w);
                }
                px[c * 2..c * 2 + 2].copy_from_slice(&unfix15_i64(acc).to_ne_bytes());
            }
        }
        Ok(())
    }
}

impl PixelSource for ScalerSource {
    fn format(&self) -> &'static PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.out_w
    }

    fn height(&self) -> u32 {
        self.out_h
    }

    fn profiler(&self) -> Option<Rc<SourceProfiler>> {
        Some(Rc::clone(&self.profiler))
    }

    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buf: &mut [u8]) -> Result<()> {
        self.profiler.enter();
        let line_bytes = validate_copy(
            self.format,
            self.out_w,
            self.out_h,
            area,
            stride,
            buf.len(),
        )?;
        let is_float = matches!(self.lanes, Lanes::F32 { .. });
        for (row, y) in (area.y..area.bottom()).enumerate() {
            let out = &mut buf[row * stride..row * stride + line_bytes];
            if is_float {
                self.emit_row_f32(y, out, area.x)?;
            } else {
                self.emit_row_q15(y, out, area.x)?;
            }
        }
        self.profiler.leave();
        Ok(())
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
        Some(self)
    }
}

impl ChainedSource for ScalerSource {
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
    use raster_core::{FormatId, FrameBufferSource};

    #[test]
    fn test_weight_rows_sum_to_one() {
        for kernel in [
            Interpolation::NearestNeighbor,
            Interpolation::Linear,
            Interpolation::CatmullRom,
            Interpolation::Lanczos2,
            Interpolation::Lanczos3,
            Interpolation::Spline36,
        ] {
            for (in_size, out_size) in [(100, 50), (50, 100), (7, 3), (3, 7), (64, 64)] {
                let t = WeightTable::build(kernel, in_size, out_size, 0.0).unwrap();
                for i in 0..t.len() {
                    let sum: f32 = t.row(i).weights.iter().sum();
                    assert_eq!(sum, 1.0, "{kernel:?} {in_size}->{out_size} row {i}");
                }
            }
        }
    }

    #[test]
    fn test_q15_rows_sum_exactly() {
        let t = WeightTable::build(Interpolation::Lanczos3, 100, 37, 0.0)
            .unwrap()
            .to_q15();
        for i in 0..t.len() {
            let sum: i32 = t.row(i).weights.iter().sum();
            assert_eq!(sum, i32::from(UQ15_ONE), "row {i}");
        }
    }

    #[test]
    fn test_point_sampler_identity_table() {
        let t = WeightTable::build(Interpolation::NearestNeighbor, 10, 10, 0.0).unwrap();
        for i in 0..10 {
            let row = t.row(i);
            assert_eq!(row.weights.len(), 1);
            assert_eq!(row.start, i as u32);
            assert_eq!(row.weights[0], 1.0);
        }
    }

    #[test]
    fn test_windows_stay_in_bounds() {
        let t = WeightTable::build(Interpolation::Lanczos3, 4, 16, 0.0).unwrap();
        for i in 0..t.len() {
            let row = t.row(i);
            assert!(row.start < 4);
            assert!(row.start as usize + row.weights.len() <= 4);
        }
    }

    fn constant_f32_source(w: u32, h: u32, v: f32) -> FrameBufferSource {
        let mut fb = FrameBufferSource::new(FormatId::Grey32Float, w, h).unwrap();
        for y in 0..h {
            for px in fb.line_mut(y).chunks_exact_mut(4) {
                px.copy_from_slice(&v.to_ne_bytes());
            }
        }
        fb
    }

    #[test]
    fn test_constant_preserved_by_lanczos() {
        let src = constant_f32_source(100, 100, 0.5019608);
        let mut scaler = ScalerSource::new(Box::new(src), 50, 50, Interpolation::Lanczos3).unwrap();
        let mut out = vec![0u8; 50 * 50 * 4];
        scaler.copy_pixels(PixelArea::of(50, 50), 200, &mut out).unwrap();
        for px in out.chunks_exact(4) {
            let v = f32::from_ne_bytes([px[0], px[1], px[2], px[3]]);
            assert!((v - 0.5019608).abs() < 1e-6, "{v}");
        }
    }

    #[test]
    fn test_identity_nearest_is_exact() {
        let mut src = FrameBufferSource::new(FormatId::Grey32Float, 4, 4).unwrap();
        for y in 0..4u32 {
            for (x, px) in src.line_mut(y).chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&((y as f32 * 4.0 + x as f32).to_ne_bytes()));
            }
        }
        let mut expected = Vec::new();
        for i in 0..16 {
            expected.extend_from_slice(&(i as f32).to_ne_bytes());
        }
        let mut scaler =
            ScalerSource::new(Box::new(src), 4, 4, Interpolation::NearestNeighbor).unwrap();
        let mut out = vec![0u8; 4 * 4 * 4];
        scaler.copy_pixels(PixelArea::of(4, 4), 16, &mut out).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_q15_constant_preserved() {
        let mut fb = FrameBufferSource::new(FormatId::Grey16UQ15Linear, 20, 20).unwrap();
        let v: u16 = 12345;
        for y in 0..20 {
            for px in fb.line_mut(y).chunks_exact_mut(2) {
                px.copy_from_slice(&v.to_ne_bytes());
            }
        }
        let mut scaler = ScalerSource::new(Box::new(fb), 7, 13, Interpolation::CatmullRom).unwrap();
        let mut out = vec![0u8; 7 * 13 * 2];
        scaler.copy_pixels(PixelArea::of(7, 13), 14, &mut out).unwrap();
        for px in out.chunks_exact(2) {
            assert_eq!(u16::from_ne_bytes([px[0], px[1]]), v);
        }
    }

    #[test]
    fn test_non_monotonic_row_queries() {
        let src = constant_f32_source(16, 16, 0.25);
        let mut scaler = ScalerSource::new(Box::new(src), 8, 8, Interpolation::Linear).unwrap();
        let mut line = vec![0u8; 8 * 4];
        // Bottom first, then top; the ring must refill transparently.
        scaler
            .copy_pixels(PixelArea::new(0, 7, 8, 1), 32, &mut line)
            .unwrap();
        scaler
            .copy_pixels(PixelArea::new(0, 0, 8, 1), 32, &mut line)
            .unwrap();
        let v = f32::from_ne_bytes([line[0], line[1], line[2], line[3]]);
        assert!((v - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_u8_source() {
        let fb = FrameBufferSource::new(FormatId::Bgr24, 4, 4).unwrap();
        assert!(ScalerSource::new(Box::new(fb), 2, 2, Interpolation::Linear).is_err());
    }

    #[test]
    fn test_subpixel_offset_shifts_phase() {
        let a = WeightTable::build(Interpolation::Linear, 8, 16, 0.0).unwrap();
        let b = WeightTable::build(Interpolation::Linear, 8, 16, 0.25).unwrap();
        let differ = (0..16).any(|i| {
            a.row(i).start != b.row(i).start || a.row(i).weights != b.row(i).weights
        });
        assert!(differ);
    }
}
