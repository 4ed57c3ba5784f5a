//! Animation screen-buffer replay.
//!
//! Containers with more than one frame and disposal semantics composite
//! each frame onto a persistent screen buffer. Between frames the state
//! applies the previous frame's disposal directive: preserve the pixels,
//! clear the frame's rectangle to the background color, or restore the
//! screen to its prior state. When a frame range skips leading frames,
//! the skipped frames still replay onto the screen so later frames
//! composite correctly; their pixels are never emitted.

use crate::codec::{AnimationContainer, AnimationFrame, FrameBlend, FrameDisposal};
use raster_core::{Error, FormatId, FrameBufferSource, PixelArea, PixelSource, Result};
use raster_ops::overlay::{self, OverlayBlend};
use tracing::trace;

fn background_bgra(argb: u32) -> [u8; 4] {
    [
        (argb & 0xFF) as u8,
        (argb >> 8 & 0xFF) as u8,
        (argb >> 16 & 0xFF) as u8,
        (argb >> 24 & 0xFF) as u8,
    ]
}

/// Screen-buffer state shared by an animation's frames.
pub struct AnimationState {
    container: AnimationContainer,
    screen: FrameBufferSource,
    last_disposal: FrameDisposal,
    last_area: PixelArea,
    saved: Option<Vec<u8>>,
}

impl AnimationState {
    /// Creates the screen buffer for a declared animation.
    pub fn new(container: AnimationContainer) -> Result<Self> {
        let screen = FrameBufferSource::new(
            FormatId::Bgra32,
            container.screen_width,
            container.screen_height,
        )?;
        Ok(Self {
            container,
            screen,
            last_disposal: FrameDisposal::None,
            last_area: PixelArea::default(),
            saved: None,
        })
    }

    /// The container-level animation properties.
    #[inline]
    pub fn container(&self) -> &AnimationContainer {
        &self.container
    }

    /// Applies the previous frame's disposal, then composites `frame`.
    pub fn compose_frame(
        &mut self,
        source: &mut dyn PixelSource,
        frame: &AnimationFrame,
    ) -> Result<()> {
        if source.format().id != FormatId::Bgra32 {
            return Err(Error::unsupported_format(
                source.format().id.name(),
                "animation compose",
            ));
        }

        match self.last_disposal {
            FrameDisposal::RestoreBackground => {
                if !self.last_area.is_empty() {
                    let bg = background_bgra(self.container.background_color);
                    self.screen.fill_area(self.last_area, &bg)?;
                }
            }
            FrameDisposal::RestorePrevious => {
                if let Some(saved) = self.saved.take() {
                    self.screen.pixels_mut().copy_from_slice(&saved);
                }
            }
            FrameDisposal::None | FrameDisposal::Preserve => {}
        }

        if frame.disposal == FrameDisposal::RestorePrevious {
            self.saved = Some(self.screen.pixels_mut().to_vec());
        }

        let blend = match frame.blend {
            FrameBlend::Source => OverlayBlend::Source,
            FrameBlend::Over => OverlayBlend::Over,
        };
        trace!(
            left = frame.offset_left,
            top = frame.offset_top,
            disposal = ?frame.disposal,
            "compositing animation frame"
        );
        overlay::overlay(
            &mut self.screen,
            source,
            frame.offset_left,
            frame.offset_top,
            blend,
        )?;

        self.last_disposal = frame.disposal;
        self.last_area = PixelArea::new(
            frame.offset_left,
            frame.offset_top,
            source.width(),
            source.height(),
        );
        Ok(())
    }

    /// A snapshot of the current screen as a standalone source.
    pub fn screen_source(&mut self) -> Result<FrameBufferSource> {
        let mut copy = FrameBufferSource::new(
            FormatId::Bgra32,
            self.container.screen_width,
            self.container.screen_height,
        )?;
        copy.write_from(&mut self.screen, 0, 0)?;
        Ok(copy)
    }

    /// Whether skipping to `first_emitted` requires replaying earlier
    /// frames into the screen buffer.
    pub fn requires_replay(disposals: &[FrameDisposal], first_emitted: u32) -> bool {
        disposals
            .iter()
            .take(first_emitted as usize)
            .any(|d| matches!(d, FrameDisposal::Preserve | FrameDisposal::None))
    }
}
