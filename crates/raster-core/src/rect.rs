//! Pixel rectangles and Exif orientation algebra.
//!
//! # Coordinate System
//!
//! All coordinates use the standard image convention:
//! - Origin (0, 0) is at the **top-left** corner
//! - X increases to the right
//! - Y increases downward
//!
//! # Orientation
//!
//! An image file may store its pixels rotated or mirrored relative to how
//! they should be presented; the Exif orientation tag (values 1..=8) names
//! the correction. [`Orientation`] models the eight states and maps
//! rectangles between *presentation* coordinates (what the viewer sees)
//! and *storage* coordinates (how rows sit in the file).
//!
//! # Usage
//!
//! ```rust
//! use raster_core::{Orientation, PixelArea};
//!
//! let area = PixelArea::new(0, 0, 20, 10);
//! let o = Orientation::Rotate90;
//!
//! // Map a presentation-space rectangle into storage space and back.
//! let storage = o.de_orient(area, 100, 50);
//! assert_eq!(o.re_orient(storage, 100, 50), area);
//! ```

use crate::error::{Error, Result};

/// A pixel rectangle: origin plus dimensions, all non-negative.
///
/// # Example
///
/// ```rust
/// use raster_core::PixelArea;
///
/// let area = PixelArea::new(10, 20, 100, 50);
/// assert_eq!(area.right(), 110);
/// assert_eq!(area.bottom(), 70);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelArea {
    /// X coordinate of the left edge (inclusive).
    pub x: u32,
    /// Y coordinate of the top edge (inclusive).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelArea {
    /// Creates a new area from origin and dimensions.
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The full area of a `width` x `height` source, anchored at the origin.
    #[inline]
    pub const fn of(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// X coordinate one past the right edge.
    #[inline]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Y coordinate one past the bottom edge.
    #[inline]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether the area covers zero pixels.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether `self` lies entirely within a `width` x `height` source.
    #[inline]
    pub const fn fits_in(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// Whether `other` lies entirely within `self`.
    #[inline]
    pub const fn contains(&self, other: &PixelArea) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Intersection of two areas, or `None` when they do not overlap.
    pub fn intersect(&self, other: &PixelArea) -> Option<PixelArea> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right > x && bottom > y {
            Some(PixelArea::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Translates the area by a pixel offset.
    #[inline]
    pub const fn offset(&self, dx: u32, dy: u32) -> PixelArea {
        PixelArea::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Validates that this area fits a `width` x `height` source.
    #[inline]
    pub fn check_bounds(&self, width: u32, height: u32) -> Result<()> {
        if self.is_empty() || !self.fits_in(width, height) {
            return Err(Error::invalid_area(
                self.x,
                self.y,
                self.width,
                self.height,
                width,
                height,
            ));
        }
        Ok(())
    }

    /// Snaps the origin down and the extent up to a subsampling grid.
    ///
    /// Used when cropping planar sources so every plane cuts on a chroma
    /// sample boundary. `(1, 1)` is the identity.
    pub fn snap_to_grid(&self, grid_x: u32, grid_y: u32) -> PixelArea {
        let x = self.x / grid_x * grid_x;
        let y = self.y / grid_y * grid_y;
        let right = (self.right() + grid_x - 1) / grid_x * grid_x;
        let bottom = (self.bottom() + grid_y - 1) / grid_y * grid_y;
        PixelArea::new(x, y, right - x, bottom - y)
    }
}

impl std::fmt::Display for PixelArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// The eight Exif orientation states.
///
/// Discriminants match the Exif tag values 1..=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Orientation {
    /// Stored upright.
    #[default]
    Normal = 1,
    /// Mirrored across the vertical axis.
    MirrorHorizontal = 2,
    /// Rotated 180 degrees.
    Rotate180 = 3,
    /// Mirrored across the horizontal axis.
    MirrorVertical = 4,
    /// Mirrored across the top-left to bottom-right diagonal.
    Transpose = 5,
    /// Requires a 90 degree clockwise rotation for display.
    Rotate90 = 6,
    /// Mirrored across the top-right to bottom-left diagonal.
    Transverse = 7,
    /// Requires a 270 degree clockwise rotation for display.
    Rotate270 = 8,
}

impl Orientation {
    /// All orientations, in Exif tag order.
    pub const ALL: [Orientation; 8] = [
        Self::Normal,
        Self::MirrorHorizontal,
        Self::Rotate180,
        Self::MirrorVertical,
        Self::Transpose,
        Self::Rotate90,
        Self::Transverse,
        Self::Rotate270,
    ];

    /// Parses an Exif orientation tag value. Values outside 1..=8 map to
    /// `None`.
    pub const fn from_exif(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Normal),
            2 => Some(Self::MirrorHorizontal),
            3 => Some(Self::Rotate180),
            4 => Some(Self::MirrorVertical),
            5 => Some(Self::Transpose),
            6 => Some(Self::Rotate90),
            7 => Some(Self::Transverse),
            8 => Some(Self::Rotate270),
            _ => None,
        }
    }

    /// Whether presentation width/height are the storage height/width.
    #[inline]
    pub const fn swaps_dimensions(&self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Whether realizing this orientation reverses pixels within a line.
    #[inline]
    pub const fn flips_x(&self) -> bool {
        matches!(
            self,
            Self::MirrorHorizontal | Self::Rotate180 | Self::Rotate90 | Self::Transverse
        )
    }

    /// Whether realizing this orientation reverses the line order.
    #[inline]
    pub const fn flips_y(&self) -> bool {
        matches!(
            self,
            Self::Rotate180 | Self::MirrorVertical | Self::Transverse | Self::Rotate270
        )
    }

    /// Whether realizing this orientation transposes rows and columns.
    #[inline]
    pub const fn is_transposed(&self) -> bool {
        self.swaps_dimensions()
    }

    /// The orientation that undoes this one.
    #[inline]
    pub const fn invert(&self) -> Self {
        match self {
            Self::Rotate90 => Self::Rotate270,
            Self::Rotate270 => Self::Rotate90,
            other => *other,
        }
    }

    /// Presentation dimensions of a `width` x `height` storage image.
    #[inline]
    pub const fn oriented_dims(&self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Maps a presentation-space area into storage space.
    ///
    /// `width` and `height` are the **storage** dimensions; `area` is
    /// expressed against [`oriented_dims`](Self::oriented_dims).
    pub fn de_orient(&self, area: PixelArea, width: u32, height: u32) -> PixelArea {
        let PixelArea {
            x,
            y,
            width: w,
            height: h,
        } = area;
        match self {
            Self::Normal => area,
            Self::MirrorHorizontal => PixelArea::new(width - x - w, y, w, h),
            Self::Rotate180 => PixelArea::new(width - x - w, height - y - h, w, h),
            Self::MirrorVertical => PixelArea::new(x, height - y - h, w, h),
            Self::Transpose => PixelArea::new(y, x, h, w),
            Self::Rotate90 => PixelArea::new(y, height - x - w, h, w),
            Self::Transverse => PixelArea::new(width - y - h, height - x - w, h, w),
            Self::Rotate270 => PixelArea::new(width - y - h, x, h, w),
        }
    }

    /// Maps a storage-space area into presentation space.
    ///
    /// `width` and `height` are the **storage** dimensions. Inverse of
    /// [`de_orient`](Self::de_orient):
    /// `de_orient(re_orient(a)) == a` for every orientation.
    pub fn re_orient(&self, area: PixelArea, width: u32, height: u32) -> PixelArea {
        let (pw, ph) = self.oriented_dims(width, height);
        self.invert().de_orient(area, pw, ph)
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::MirrorHorizontal => "mirror-h",
            Self::Rotate180 => "rotate-180",
            Self::MirrorVertical => "mirror-v",
            Self::Transpose => "transpose",
            Self::Rotate90 => "rotate-90",
            Self::Transverse => "transverse",
            Self::Rotate270 => "rotate-270",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_edges() {
        let a = PixelArea::new(10, 20, 100, 50);
        assert_eq!(a.right(), 110);
        assert_eq!(a.bottom(), 70);
        assert!(!a.is_empty());
        assert!(a.fits_in(110, 70));
        assert!(!a.fits_in(109, 70));
    }

    #[test]
    fn test_intersect() {
        let a = PixelArea::new(0, 0, 10, 10);
        let b = PixelArea::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Some(PixelArea::new(5, 5, 5, 5)));

        let c = PixelArea::new(20, 20, 5, 5);
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_check_bounds() {
        let a = PixelArea::new(0, 0, 10, 10);
        assert!(a.check_bounds(10, 10).is_ok());
        assert!(a.check_bounds(9, 10).is_err());
        assert!(PixelArea::new(0, 0, 0, 5).check_bounds(10, 10).is_err());
    }

    #[test]
    fn test_snap_to_grid() {
        let a = PixelArea::new(1, 1, 3, 3);
        assert_eq!(a.snap_to_grid(2, 2), PixelArea::new(0, 0, 4, 4));
        assert_eq!(a.snap_to_grid(1, 1), a);

        let b = PixelArea::new(2, 0, 2, 4);
        assert_eq!(b.snap_to_grid(2, 2), b);
    }

    #[test]
    fn test_orientation_exif_values() {
        for o in Orientation::ALL {
            assert_eq!(Orientation::from_exif(o as u16), Some(o));
        }
        assert_eq!(Orientation::from_exif(0), None);
        assert_eq!(Orientation::from_exif(9), None);
    }

    #[test]
    fn test_orientation_roundtrip_all() {
        // de_orient(re_orient(a)) == a on a non-square source, every state.
        let (w, h) = (100u32, 60u32);
        let area = PixelArea::new(3, 7, 20, 10);
        for o in Orientation::ALL {
            let p = o.re_orient(area, w, h);
            let (pw, ph) = o.oriented_dims(w, h);
            assert!(p.fits_in(pw, ph), "{o}: {p} outside {pw}x{ph}");
            assert_eq!(o.de_orient(p, w, h), area, "roundtrip broken for {o}");
        }
    }

    #[test]
    fn test_rotate90_maps_corners() {
        // A 4x2 storage image displayed via Rotate90 is 2x4. The
        // presentation top-left pixel comes from storage (0, 1).
        let o = Orientation::Rotate90;
        let top_left = PixelArea::new(0, 0, 1, 1);
        assert_eq!(o.de_orient(top_left, 4, 2), PixelArea::new(0, 1, 1, 1));

        let bottom_right = PixelArea::new(1, 3, 1, 1);
        assert_eq!(o.de_orient(bottom_right, 4, 2), PixelArea::new(3, 0, 1, 1));
    }

    #[test]
    fn test_dimension_swap() {
        assert_eq!(Orientation::Rotate90.oriented_dims(4, 2), (2, 4));
        assert_eq!(Orientation::Rotate180.oriented_dims(4, 2), (4, 2));
        assert!(Orientation::Transpose.swaps_dimensions());
        assert!(!Orientation::MirrorHorizontal.swaps_dimensions());
    }
}
