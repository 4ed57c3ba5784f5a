//! Planar Y'CbCr to interleaved RGB conversion.
//!
//! The merge consumes three equally-sized planes (the builder resamples
//! subsampled chroma up to luma dimensions first, applying the siting
//! offsets) and reconstructs BGR through the inverted Y'CbCr matrix:
//!
//! ```text
//! R = Y + c3 * Cr
//! G = Y + c1 * Cb + c2 * Cr
//! B = Y + c0 * Cb
//! ```
//!
//! with the coefficients read from the inverse of the forward matrix.
//! BT.601 is the default when a frame declares nothing; BT.709 and
//! BT.2020 are available for frames that carry them. Video-range planes
//! fold the 255/219 luma and 255/224 chroma rescale into the widening
//! step (8-bit path: into the per-pixel math).

use crate::mat3::Mat3;
use raster_core::buffer::{self, BufferLease};
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    ChainedSource, ChromaPosition, ChromaSubsampling, Error, FormatId, PixelArea, PixelFormat,
    PixelNumeric, PixelSource, PlanarSource, Result,
};
use std::rc::Rc;

/// Y'CbCr matrix standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum YccMatrix {
    /// ITU-R BT.601 (SD; the default when nothing is declared).
    #[default]
    Bt601,
    /// ITU-R BT.709 (HD).
    Bt709,
    /// ITU-R BT.2020 (UHD).
    Bt2020,
}

impl YccMatrix {
    /// `(Kr, Kb)` luma coefficients.
    #[inline]
    pub const fn luma_coefficients(&self) -> (f32, f32) {
        match self {
            Self::Bt601 => (0.299, 0.114),
            Self::Bt709 => (0.2126, 0.0722),
            Self::Bt2020 => (0.2627, 0.0593),
        }
    }

    /// The forward RGB -> Y'CbCr matrix.
    pub fn forward(&self) -> Mat3 {
        let (kr, kb) = self.luma_coefficients();
        let kg = 1.0 - kr - kb;
        Mat3::from_rows([
            [kr, kg, kb],
            [
                -0.5 * kr / (1.0 - kb),
                -0.5 * kg / (1.0 - kb),
                0.5,
            ],
            [
                0.5,
                -0.5 * kg / (1.0 - kr),
                -0.5 * kb / (1.0 - kr),
            ],
        ])
    }

    /// Reconstruction coefficients `[c0, c1, c2, c3]` from the inverted
    /// forward matrix: Cb->B, Cb->G, Cr->G, Cr->R.
    pub fn reconstruction(&self) -> Result<[f32; 4]> {
        let inv = self
            .forward()
            .inverse()
            .ok_or_else(|| Error::unsupported("singular YCC matrix".to_string()))?;
        Ok([inv.m[2][1], inv.m[1][1], inv.m[1][2], inv.m[0][2]])
    }
}

/// Resample offsets (in chroma samples) aligning a subsampled chroma
/// plane onto the luma grid.
///
/// Combines the siting displacement with the half-pixel compensation of
/// an odd-origin crop.
pub fn chroma_resample_offsets(
    position: ChromaPosition,
    subsampling: ChromaSubsampling,
    crop_offset: (f32, f32),
) -> (f64, f64) {
    let (rx, ry) = subsampling.ratios();
    let (sx, sy) = position.offsets();
    (
        f64::from(sx + crop_offset.0) / f64::from(rx),
        f64::from(sy + crop_offset.1) / f64::from(ry),
    )
}

enum MergeOp {
    /// 8-bit planes to Bgr24.
    U8 {
        y_offset: f32,
        y_scale: f32,
        c_scale: f32,
    },
    /// Float planes (already range-normalized) to Bgrx128Float.
    F32,
}

/// A chained transform merging three planes into interleaved BGR.
pub struct PlanarMergeSource {
    y: Box<dyn PixelSource>,
    cb: Box<dyn PixelSource>,
    cr: Box<dyn PixelSource>,
    format: &'static PixelFormat,
    coeffs: [f32; 4],
    op: MergeOp,
    y_line: BufferLease,
    cb_line: BufferLease,
    cr_line: BufferLease,
    profiler: Rc<SourceProfiler>,
}

impl PlanarMergeSource {
    /// Merges an un-subsampled plane bundle with the given matrix.
    ///
    /// All three planes must already share the luma dimensions.
    pub fn new(planar: PlanarSource, matrix: YccMatrix) -> Result<Self> {
        let PlanarSource { y, cb, cr, .. } = planar;
        if cb.width() != y.width()
            || cb.height() != y.height()
            || cr.width() != y.width()
            || cr.height() != y.height()
        {
            return Err(Error::invalid_parameter(format!(
                "planar merge requires 4:4:4 planes, got luma {}x{} chroma {}x{}",
                y.width(),
                y.height(),
                cb.width(),
                cb.height()
            )));
        }
        let (op, format) = match y.format().numeric {
            PixelNumeric::UnsignedInt => {
                let video = y.format().is_video_range();
                let chroma_video = cb.format().is_video_range();
                (
                    MergeOp::U8 {
                        y_offset: if video { 16.0 } else { 0.0 },
                        y_scale: if video { 255.0 / 219.0 } else { 1.0 },
                        c_scale: if chroma_video { 255.0 / 224.0 } else { 1.0 },
                    },
                    PixelFormat::from_id(FormatId::Bgr24),
                )
            }
            PixelNumeric::Float => (MergeOp::F32, PixelFormat::from_id(FormatId::Bgrx128Float)),
            PixelNumeric::FixedQ15 => {
                return Err(Error::unsupported_format(y.format().id.name(), "planar merge"))
            }
        };
        let coeffs = matrix.reconstruction()?;
        let y_line = buffer::rent(y.format().line_bytes(y.width()))?;
        let cb_line = buffer::rent(cb.format().line_bytes(cb.width()))?;
        let cr_line = buffer::rent(cr.format().line_bytes(cr.width()))?;
        let profiler = SourceProfiler::new("planar merge");
        Ok(Self {
            y,
            cb,
            cr,
            format,
            coeffs,
            op,
            y_line,
            cb_line,
            cr_line,
            profiler,
        })
    }
}

impl PixelSource for PlanarMergeSource {
    fn format(&self) -> &'static PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.y.width()
    }

    fn height(&self) -> u32 {
        self.y.height()
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
        let [c0, c1, c2, c3] = self.coeffs;
        let w = area.width as usize;

        for (row, py) in (area.y..area.bottom()).enumerate() {
            let line_area = PixelArea::new(area.x, py, area.width, 1);
            let yb = self.y.format().line_bytes(area.width);
            let cbb = self.cb.format().line_bytes(area.width);
            self.profiler.pause();
            self.y.copy_pixels(line_area, yb, &mut self.y_line[..yb])?;
            self.cb.copy_pixels(line_area, cbb, &mut self.cb_line[..cbb])?;
            self.cr.copy_pixels(line_area, cbb, &mut self.cr_line[..cbb])?;
            self.profiler.resume();

            let out = &mut buf[row * stride..row * stride + line_bytes];
            match &self.op {
                MergeOp::U8 {
                    y_offset,
                    y_scale,
                    c_scale,
                } => {
                    for i in 0..w {
                        let y = (f32::from(self.y_line[i]) - y_offset) * y_scale;
                        let cb = (f32::from(self.cb_line[i]) - 128.0) * c_scale;
                        let cr = (f32::from(self.cr_line[i]) - 128.0) * c_scale;
                        let b = y + c0 * cb;
                        let g = y + c1 * cb + c2 * cr;
                        let r = y + c3 * cr;
                        out[i * 3] = (b + 0.5).clamp(0.0, 255.0) as u8;
                        out[i * 3 + 1] = (g + 0.5).clamp(0.0, 255.0) as u8;
                        out[i * 3 + 2] = (r + 0.5).clamp(0.0, 255.0) as u8;
                    }
                }
                MergeOp::F32 => {
                    for i in 0..w {
                        let at = i * 4;
                        let y = f32::from_ne_bytes(
                            self.y_line[at..at + 4].try_into().unwrap_or([0; 4]),
                        );
                        let cb = f32::from_ne_bytes(
                            self.cb_line[at..at + 4].try_into().unwrap_or([0; 4]),
                        );
                        let cr = f32::from_ne_bytes(
                            self.cr_line[at..at + 4].try_into().unwrap_or([0; 4]),
                        );
                        let px = [
                            y + c0 * cb,
                            y + c1 * cb + c2 * cr,
                            y + c3 * cr,
                            0.0f32,
                        ];
                        let base = i * 16;
                        for (c, v) in px.iter().enumerate() {
                            out[base + c * 4..base + c * 4 + 4]
                                .copy_from_slice(&v.to_ne_bytes());
                        }
                    }
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

impl ChainedSource for PlanarMergeSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.y.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_core::{ChromaPosition, FrameBufferSource};

    fn plane(id: FormatId, w: u32, h: u32, v: u8) -> Box<dyn PixelSource> {
        let mut fb = FrameBufferSource::new(id, w, h).unwrap();
        fb.fill_area(PixelArea::of(w, h), &[v]).unwrap();
        Box::new(fb)
    }

    fn merge_one(y: u8, cb: u8, cr: u8, matrix: YccMatrix) -> [u8; 3] {
        let planar = PlanarSource::new(
            plane(FormatId::Y8, 1, 1, y),
            plane(FormatId::Cb8, 1, 1, cb),
            plane(FormatId::Cr8, 1, 1, cr),
            ChromaPosition::Center,
        )
        .unwrap();
        let mut merge = PlanarMergeSource::new(planar, matrix).unwrap();
        let mut out = [0u8; 3];
        merge.copy_pixels(PixelArea::of(1, 1), 3, &mut out).unwrap();
        out
    }

    #[test]
    fn test_reconstruction_coefficients_bt601() {
        let [c0, c1, c2, c3] = YccMatrix::Bt601.reconstruction().unwrap();
        assert!((c3 - 1.402).abs() < 1e-3, "Cr->R {c3}");
        assert!((c0 - 1.772).abs() < 1e-3, "Cb->B {c0}");
        assert!((c1 + 0.3441).abs() < 1e-3, "Cb->G {c1}");
        assert!((c2 + 0.7141).abs() < 1e-3, "Cr->G {c2}");
    }

    #[test]
    fn test_pure_red_bt601_full_range() {
        // (Y=76, Cb=85, Cr=255) is saturated red in full-range BT.601.
        let out = merge_one(76, 85, 255, YccMatrix::Bt601);
        assert!(out[0] <= 1, "B {out:?}");
        assert!(out[1] <= 1, "G {out:?}");
        assert!(out[2] >= 254, "R {out:?}");
    }

    #[test]
    fn test_neutral_grey_passthrough() {
        let out = merge_one(128, 128, 128, YccMatrix::Bt601);
        assert_eq!(out, [128, 128, 128]);
    }

    #[test]
    fn test_video_range_scaling() {
        // Video black (16) and white (235) stretch to 0 and 255.
        let mut luma = FrameBufferSource::new(FormatId::Y8Video, 2, 1).unwrap();
        luma.line_mut(0).copy_from_slice(&[16, 235]);
        let planar = PlanarSource::new(
            Box::new(luma),
            plane(FormatId::Cb8Video, 2, 1, 128),
            plane(FormatId::Cr8Video, 2, 1, 128),
            ChromaPosition::Center,
        )
        .unwrap();
        let mut merge = PlanarMergeSource::new(planar, YccMatrix::Bt601).unwrap();
        let mut out = [0u8; 6];
        merge.copy_pixels(PixelArea::of(2, 1), 6, &mut out).unwrap();
        assert_eq!(&out[..3], &[0, 0, 0]);
        assert_eq!(&out[3..], &[255, 255, 255]);
    }

    #[test]
    fn test_rejects_subsampled_planes() {
        let planar = PlanarSource::new(
            plane(FormatId::Y8, 4, 4, 0),
            plane(FormatId::Cb8, 2, 2, 128),
            plane(FormatId::Cr8, 2, 2, 128),
            ChromaPosition::Center,
        )
        .unwrap();
        assert!(PlanarMergeSource::new(planar, YccMatrix::Bt601).is_err());
    }

    #[test]
    fn test_chroma_offsets() {
        let (ox, oy) = chroma_resample_offsets(
            ChromaPosition::Left,
            ChromaSubsampling::Subsample420,
            (0.0, 0.0),
        );
        assert!((ox - 0.25).abs() < 1e-9);
        assert!(oy.abs() < 1e-9);

        let (ox, _) = chroma_resample_offsets(
            ChromaPosition::Center,
            ChromaSubsampling::Subsample444,
            (0.5, 0.0),
        );
        assert!((ox - 0.5).abs() < 1e-9);
    }
}
