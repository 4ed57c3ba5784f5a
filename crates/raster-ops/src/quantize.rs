//! Octree color quantization and indexed output.
//!
//! Builds a palette of at most 256 entries from a direct-color frame and
//! maps pixels to indices. When the frame holds no more distinct colors
//! than the palette size, the palette is exact and mapping is lossless;
//! otherwise an octree merges the least-populated color cubes and
//! Floyd-Steinberg dithering distributes the residual error, unless the
//! dither policy disables it.
//!
//! Quantization is one of the few whole-frame operations in the
//! pipeline: palette construction must see every pixel before the first
//! index can be emitted.

use crate::palette::Palette;
use raster_core::profiler::SourceProfiler;
use raster_core::source::validate_copy;
use raster_core::{
    buffer, ChainedSource, Error, FormatId, PixelArea, PixelFormat, PixelSource, Result,
};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Dithering policy for indexed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DitherMode {
    /// Dither unless the palette is exact.
    #[default]
    Auto,
    /// Never dither.
    None,
}

const MAX_COLORS: usize = 256;
const TREE_DEPTH: usize = 6;
const NO_CHILD: u32 = u32::MAX;
const ALPHA_THRESHOLD: u8 = 128;

struct Node {
    children: [u32; 8],
    count: u64,
    b: u64,
    g: u64,
    r: u64,
    leaf: bool,
}

impl Node {
    fn new(leaf: bool) -> Self {
        Self {
            children: [NO_CHILD; 8],
            count: 0,
            b: 0,
            g: 0,
            r: 0,
            leaf,
        }
    }
}

/// Octree color reducer backing [`build_palette`].
struct OctreeQuantizer {
    nodes: Vec<Node>,
    levels: Vec<Vec<u32>>,
    leaf_count: usize,
}

impl OctreeQuantizer {
    fn new() -> Self {
        Self {
            nodes: vec![Node::new(false)],
            levels: vec![Vec::new(); TREE_DEPTH],
            leaf_count: 0,
        }
    }

    #[inline]
    fn child_index(b: u8, g: u8, r: u8, depth: usize) -> usize {
        let bit = 7 - depth;
        (((r >> bit) & 1) << 2 | ((g >> bit) & 1) << 1 | ((b >> bit) & 1)) as usize
    }

    fn add_color(&mut self, b: u8, g: u8, r: u8) {
        let mut node = 0u32;
        for depth in 0..TREE_DEPTH {
            if self.nodes[node as usize].leaf {
                break;
            }
            let ci = Self::child_index(b, g, r, depth);
            let next = self.nodes[node as usize].children[ci];
            let next = if next == NO_CHILD {
                let leaf = depth + 1 == TREE_DEPTH;
                let idx = self.nodes.len() as u32;
                self.nodes.push(Node::new(leaf));
                self.nodes[node as usize].children[ci] = idx;
                if leaf {
                    self.leaf_count += 1;
                } else {
                    self.levels[depth + 1].push(idx);
                }
                idx
            } else {
                next
            };
            node = next;
        }
        let n = &mut self.nodes[node as usize];
        n.count += 1;
        n.b += u64::from(b);
        n.g += u64::from(g);
        n.r += u64::from(r);

        while self.leaf_count > MAX_COLORS {
            self.reduce();
        }
    }

    fn reduce_to(&mut self, max: usize) {
        while self.leaf_count > max {
            self.reduce();
        }
    }

    /// Merges the children of one deepest interior node into it.
    fn reduce(&mut self) {
        for level in (1..TREE_DEPTH).rev() {
            // Take the interior node with the fewest direct leaves merged
            // away last; popping the most recent works well in practice.
            while let Some(idx) = self.levels[level].pop() {
                let children = self.nodes[idx as usize].children;
                let mut merged = 0usize;
                let (mut b, mut g, mut r, mut count) = (0u64, 0u64, 0u64, 0u64);
                for c in children {
                    if c == NO_CHILD {
                        continue;
                    }
                    let child = &self.nodes[c as usize];
                    if !child.leaf {
                        continue;
                    }
                    b += child.b;
                    g += child.g;
                    r += child.r;
                    count += child.count;
                    merged += 1;
                }
                if merged == 0 {
                    continue;
                }
                let n = &mut self.nodes[idx as usize];
                n.children = [NO_CHILD; 8];
                n.leaf = true;
                n.b += b;
                n.g += g;
                n.r += r;
                n.count += count;
                self.leaf_count = self.leaf_count + 1 - merged;
                return;
            }
        }
    }

    fn collect_palette(&self, transparent_slot: bool) -> Vec<u32> {
        let mut entries = Vec::with_capacity(self.leaf_count + usize::from(transparent_slot));
        if transparent_slot {
            entries.push(0x00000000);
        }
        let mut stack = vec![0u32];
        while let Some(idx) = stack.pop() {
            let n = &self.nodes[idx as usize];
            if n.leaf || (n.count > 0 && n.children.iter().all(|c| *c == NO_CHILD)) {
                if n.count > 0 {
                    let b = (n.b / n.count) as u32;
                    let g = (n.g / n.count) as u32;
                    let r = (n.r / n.count) as u32;
                    entries.push(0xFF00_0000 | r << 16 | g << 8 | b);
                }
                continue;
            }
            for c in n.children {
                if c != NO_CHILD {
                    stack.push(c);
                }
            }
        }
        entries
    }
}

/// Result of palette construction over a frame.
pub struct PaletteBuild {
    /// The constructed palette.
    pub palette: Palette,
    /// `true` when every distinct frame color got its own entry.
    pub is_exact: bool,
}

/// Builds a palette from a direct-color frame buffer line iterator.
///
/// `pixels` yields packed BGR(A) pixels; `has_alpha` marks 4-byte input.
pub fn build_palette<'a>(
    pixels: impl Iterator<Item = &'a [u8]>,
    has_alpha: bool,
) -> Result<PaletteBuild> {
    let mut distinct: HashMap<u32, u64> = HashMap::new();
    let mut any_transparent = false;
    let mut overflow = false;
    let mut tree = OctreeQuantizer::new();

    for px in pixels {
        let (b, g, r, a) = if has_alpha {
            (px[0], px[1], px[2], px[3])
        } else {
            (px[0], px[1], px[2], 0xFF)
        };
        if a < ALPHA_THRESHOLD {
            any_transparent = true;
            continue;
        }
        tree.add_color(b, g, r);
        if !overflow {
            let key = u32::from(b) | u32::from(g) << 8 | u32::from(r) << 16;
            *distinct.entry(key).or_insert(0) += 1;
            if distinct.len() + usize::from(any_transparent) > MAX_COLORS {
                overflow = true;
            }
        }
    }

    let is_exact = !overflow;
    let entries = if is_exact {
        let mut entries: Vec<u32> = Vec::with_capacity(distinct.len() + 1);
        if any_transparent {
            entries.push(0x00000000);
        }
        let mut keys: Vec<u32> = distinct.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            let b = key & 0xFF;
            let g = key >> 8 & 0xFF;
            let r = key >> 16 & 0xFF;
            entries.push(0xFF00_0000 | r << 16 | g << 8 | b);
        }
        entries
    } else {
        tree.reduce_to(MAX_COLORS - usize::from(any_transparent));
        tree.collect_palette(any_transparent)
    };

    if entries.is_empty() {
        return Err(Error::invalid_parameter(
            "cannot build a palette from an empty frame".to_string(),
        ));
    }
    Ok(PaletteBuild {
        palette: Palette::new(entries)?,
        is_exact,
    })
}

fn nearest_entry(palette: &Palette, b: i32, g: i32, r: i32, skip_transparent: bool) -> u8 {
    let mut best = 0usize;
    let mut best_dist = i64::MAX;
    for (i, entry) in palette.entries().iter().enumerate() {
        if skip_transparent && entry >> 24 == 0 {
            continue;
        }
        let eb = i32::from((entry & 0xFF) as u8);
        let eg = i32::from((entry >> 8 & 0xFF) as u8);
        let er = i32::from((entry >> 16 & 0xFF) as u8);
        let d = i64::from((b - eb) * (b - eb))
            + i64::from((g - eg) * (g - eg))
            + i64::from((r - er) * (r - er));
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best as u8
}

/// A chained transform producing `Indexed8` output from direct color.
///
/// Construction pulls the whole upstream frame: the octree must see every
/// pixel before mapping, and error-diffusion dithering is inherently
/// sequential.
pub struct IndexedSource {
    prev: Box<dyn PixelSource>,
    format: &'static PixelFormat,
    palette: Palette,
    is_exact: bool,
    indices: Vec<u8>,
    profiler: Rc<SourceProfiler>,
}

impl IndexedSource {
    /// Quantizes `prev` (`Bgr24` or `Bgra32`) to indexed color.
    pub fn new(prev: Box<dyn PixelSource>, dither: DitherMode) -> Result<Self> {
        let src_fmt = prev.format();
        let has_alpha = match src_fmt.id {
            FormatId::Bgr24 => false,
            FormatId::Bgra32 => true,
            other => return Err(Error::unsupported_format(other.name(), "quantize")),
        };
        let mut prev = prev;
        let (w, h) = (prev.width(), prev.height());
        let bpp = src_fmt.bytes_per_pixel();
        let line_bytes = src_fmt.line_bytes(w);

        let mut frame = buffer::rent(line_bytes * h as usize)?;
        prev.copy_pixels(PixelArea::of(w, h), line_bytes, &mut frame)?;

        let build = build_palette(frame.chunks_exact(bpp), has_alpha)?;
        let dithering = matches!(dither, DitherMode::Auto) && !build.is_exact;
        let has_transparent = build.palette.entries().first().map(|e| e >> 24) == Some(0);

        let mut exact_map: HashMap<u32, u8> = HashMap::new();
        for (i, e) in build.palette.entries().iter().enumerate() {
            exact_map.insert(*e, i as u8);
        }

        let mut indices = vec![0u8; (w * h) as usize];
        // Floyd-Steinberg error rows for b, g, r.
        let mut err_cur = vec![[0i32; 3]; w as usize + 2];
        let mut err_next = vec![[0i32; 3]; w as usize + 2];

        for y in 0..h as usize {
            err_next.iter_mut().for_each(|e| *e = [0; 3]);
            let row = &frame[y * line_bytes..y * line_bytes + line_bytes];
            for x in 0..w as usize {
                let px = &row[x * bpp..x * bpp + bpp];
                let a = if has_alpha { px[3] } else { 0xFF };
                if has_transparent && a < ALPHA_THRESHOLD {
                    indices[y * w as usize + x] = 0;
                    continue;
                }
                let (mut b, mut g, mut r) =
                    (i32::from(px[0]), i32::from(px[1]), i32::from(px[2]));
                if dithering {
                    b = (b + err_cur[x + 1][0] / 16).clamp(0, 255);
                    g = (g + err_cur[x + 1][1] / 16).clamp(0, 255);
                    r = (r + err_cur[x + 1][2] / 16).clamp(0, 255);
                }
                let key = 0xFF00_0000u32
                    | (r as u32) << 16
                    | (g as u32) << 8
                    | b as u32;
                let idx = match exact_map.get(&key) {
                    Some(i) => *i,
                    None => nearest_entry(&build.palette, b, g, r, has_transparent),
                };
                indices[y * w as usize + x] = idx;

                if dithering {
                    let e = build.palette.bgra(idx as usize);
                    let db = b - i32::from(e[0]);
                    let dg = g - i32::from(e[1]);
                    let dr = r - i32::from(e[2]);
                    for (c, d) in [db, dg, dr].into_iter().enumerate() {
                        err_cur[x + 2][c] += d * 7;
                        err_next[x][c] += d * 3;
                        err_next[x + 1][c] += d * 5;
                        err_next[x + 2][c] += d;
                    }
                }
            }
            std::mem::swap(&mut err_cur, &mut err_next);
        }

        debug!(
            colors = build.palette.len(),
            exact = build.is_exact,
            dithered = dithering,
            "quantized frame"
        );
        let profiler = SourceProfiler::new("quantize");
        Ok(Self {
            prev,
            format: PixelFormat::from_id(FormatId::Indexed8),
            palette: build.palette,
            is_exact: build.is_exact,
            indices,
            profiler,
        })
    }

    /// The constructed palette, for the encoder.
    #[inline]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Whether every source color got its own palette entry.
    #[inline]
    pub fn is_exact(&self) -> bool {
        self.is_exact
    }
}

impl PixelSource for IndexedSource {
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
        let w = self.width() as usize;
        for (row, y) in (area.y..area.bottom()).enumerate() {
            let start = y as usize * w + area.x as usize;
            buf[row * stride..row * stride + line_bytes]
                .copy_from_slice(&self.indices[start..start + line_bytes]);
        }
        self.profiler.leave();
        Ok(())
    }

    fn as_chained_mut(&mut self) -> Option<&mut dyn ChainedSource> {
        Some(self)
    }
}

impl ChainedSource for IndexedSource {
    fn upstream(&self) -> &dyn PixelSource {
        self.prev.as_ref()
    }

    fn upstream_box(&mut self) -> &mut Box<dyn PixelSource> {
        &mut self.prev
    }
}
