//! Frame overlay onto a screen buffer.
//!
//! Animation replay composites each decoded frame onto the full-canvas
//! screen buffer at the frame's offset, either replacing the covered
//! rectangle or alpha-blending over it.

use raster_core::buffer;
use raster_core::{Error, FrameBufferSource, PixelArea, PixelSource, Result};

/// How an overlaid frame combines with the pixels beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayBlend {
    /// Replace the covered rectangle.
    Source,
    /// Porter-Duff over with straight alpha.
    #[default]
    Over,
}

/// Blends one straight-alpha BGRA pixel over another.
#[inline]
pub fn over_u8(fg: [u8; 4], bg: [u8; 4]) -> [u8; 4] {
    let fa = u32::from(fg[3]);
    if fa == 255 {
        return fg;
    }
    if fa == 0 {
        return bg;
    }
    let ba = u32::from(bg[3]);
    let rem = ba * (255 - fa) / 255;
    let out_a = fa + rem;
    if out_a == 0 {
        return [0; 4];
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (u32::from(fg[c]) * fa + u32::from(bg[c]) * rem + out_a / 2) / out_a;
        out[c] = v.min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    out
}

/// Composites `fg` onto `bg` at `(at_x, at_y)`.
///
/// Both sources must share the background's pixel format; `Over` blending
/// additionally requires four-channel pixels.
pub fn overlay(
    bg: &mut FrameBufferSource,
    fg: &mut dyn PixelSource,
    at_x: u32,
    at_y: u32,
    blend: OverlayBlend,
) -> Result<()> {
    if fg.format().id != bg.format().id {
        return Err(Error::unsupported_format(fg.format().id.name(), "overlay"));
    }
    let target = PixelArea::new(at_x, at_y, fg.width(), fg.height());
    target.check_bounds(bg.width(), bg.height())?;

    match blend {
        OverlayBlend::Source => bg.write_from(fg, at_x, at_y),
        OverlayBlend::Over => {
            let bpp = bg.format().bytes_per_pixel();
            if bpp != 4 {
                return Err(Error::unsupported_format(bg.format().id.name(), "overlay blend"));
            }
            let line_bytes = fg.format().line_bytes(fg.width());
            let mut line = buffer::rent(line_bytes)?;
            for y in 0..fg.height() {
                fg.copy_pixels(PixelArea::new(0, y, fg.width(), 1), line_bytes, &mut line)?;
                let dst = bg.line_mut(at_y + y);
                for (fx, fg_px) in line.chunks_exact(4).enumerate() {
                    let at = (at_x as usize + fx) * bpp;
                    let bg_px = [dst[at], dst[at + 1], dst[at + 2], dst[at + 3]];
                    let out = over_u8([fg_px[0], fg_px[1], fg_px[2], fg_px[3]], bg_px);
                    dst[at..at + 4].copy_from_slice(&out);
                }
            }
            Ok(())
        }
    }
}
