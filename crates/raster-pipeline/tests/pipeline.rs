//! End-to-end pipeline scenarios over in-memory codec adapters.

use raster_core::{FormatId, FrameBufferSource, Orientation, PixelArea, PixelSource, PlanarSource};
use raster_pipeline::codec::{
    AnimationContainer, AnimationFrame, Encoder, FrameDisposal, FrameMetadata, ImageContainer,
    ImageFrame, YccFrame,
};
use raster_pipeline::{
    process_image, process_image_with, BlendingMode, CropScaleMode, HybridMode,
    ProcessImageSettings, WorkingDepth,
};
use raster_core::{ChromaPosition, Result};
use raster_ops::{Interpolation, MatteColor};

// ---------------------------------------------------------------------------
// In-memory container / encoder
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct MemFrameData {
    format: FormatId,
    width: u32,
    height: u32,
    data: Vec<u8>,
    orientation: Option<Orientation>,
    palette: Option<Vec<u32>>,
    animation: Option<AnimationFrame>,
    ycc: Option<YccPlanes>,
}

#[derive(Clone)]
struct YccPlanes {
    y: (u32, u32, Vec<u8>),
    cb: (u32, u32, Vec<u8>),
    cr: (u32, u32, Vec<u8>),
    video: bool,
}

impl MemFrameData {
    fn bgr(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            format: FormatId::Bgr24,
            width,
            height,
            data,
            orientation: None,
            palette: None,
            animation: None,
            ycc: None,
        }
    }

    fn solid(format: FormatId, width: u32, height: u32, px: &[u8]) -> Self {
        let mut data = Vec::new();
        for _ in 0..width * height {
            data.extend_from_slice(px);
        }
        Self {
            format,
            width,
            height,
            data,
            orientation: None,
            palette: None,
            animation: None,
            ycc: None,
        }
    }

    fn to_buffer(&self) -> FrameBufferSource {
        let mut fb = FrameBufferSource::new(self.format, self.width, self.height).unwrap();
        let line = raster_core::PixelFormat::from_id(self.format).line_bytes(self.width);
        for y in 0..self.height {
            let start = y as usize * line;
            fb.line_mut(y)[..line].copy_from_slice(&self.data[start..start + line]);
        }
        fb
    }
}

struct MemFrame {
    data: MemFrameData,
}

fn plane_source(id: FormatId, (w, h, bytes): &(u32, u32, Vec<u8>)) -> Box<dyn PixelSource> {
    let mut fb = FrameBufferSource::new(id, *w, *h).unwrap();
    for y in 0..*h {
        let line = *w as usize;
        fb.line_mut(y).copy_from_slice(&bytes[y as usize * line..(y as usize + 1) * line]);
    }
    Box::new(fb)
}

impl YccFrame for MemFrame {
    fn planes(&mut self) -> Result<PlanarSource> {
        let ycc = self.data.ycc.as_ref().unwrap();
        let (yid, cbid, crid) = if ycc.video {
            (FormatId::Y8Video, FormatId::Cb8Video, FormatId::Cr8Video)
        } else {
            (FormatId::Y8, FormatId::Cb8, FormatId::Cr8)
        };
        PlanarSource::new(
            plane_source(yid, &ycc.y),
            plane_source(cbid, &ycc.cb),
            plane_source(crid, &ycc.cr),
            ChromaPosition::Center,
        )
    }

    fn chroma_position(&self) -> ChromaPosition {
        ChromaPosition::Center
    }

    fn matrix(&self) -> Option<raster_ops::YccMatrix> {
        None
    }

    fn is_video_range(&self) -> bool {
        self.data.ycc.as_ref().map(|y| y.video).unwrap_or(false)
    }
}

impl ImageFrame for MemFrame {
    fn width(&self) -> u32 {
        self.data.width
    }

    fn height(&self) -> u32 {
        self.data.height
    }

    fn pixel_source(&mut self) -> Result<Box<dyn PixelSource>> {
        Ok(Box::new(self.data.to_buffer()))
    }

    fn orientation(&self) -> Option<Orientation> {
        self.data.orientation
    }

    fn animation(&self) -> Option<AnimationFrame> {
        self.data.animation
    }

    fn palette(&self) -> Option<&[u32]> {
        self.data.palette.as_deref()
    }

    fn as_ycc(&mut self) -> Option<&mut dyn YccFrame> {
        if self.data.ycc.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

struct MemContainer {
    frames: Vec<MemFrameData>,
    animation: Option<AnimationContainer>,
}

impl MemContainer {
    fn single(frame: MemFrameData) -> Self {
        Self {
            frames: vec![frame],
            animation: None,
        }
    }
}

impl ImageContainer for MemContainer {
    fn mime_type(&self) -> &str {
        "image/x-test"
    }

    fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    fn frame(&mut self, index: u32) -> Result<Box<dyn ImageFrame + '_>> {
        Ok(Box::new(MemFrame {
            data: self.frames[index as usize].clone(),
        }))
    }

    fn animation(&self) -> Option<AnimationContainer> {
        self.animation
    }
}

struct EncodedFrame {
    format: FormatId,
    width: u32,
    height: u32,
    data: Vec<u8>,
    palette: Option<Vec<u32>>,
}

struct MemEncoder {
    accepts: Vec<FormatId>,
    closest: FormatId,
    frames: Vec<EncodedFrame>,
    committed: bool,
}

impl MemEncoder {
    fn accepting(accepts: &[FormatId]) -> Self {
        Self {
            closest: accepts[0],
            accepts: accepts.to_vec(),
            frames: Vec::new(),
            committed: false,
        }
    }
}

impl Encoder for MemEncoder {
    fn supports_pixel_format(&self, format: FormatId) -> bool {
        self.accepts.contains(&format)
    }

    fn closest_pixel_format(&self, _format: FormatId) -> FormatId {
        self.closest
    }

    fn write_frame(
        &mut self,
        source: &mut dyn PixelSource,
        metadata: &FrameMetadata,
        area: PixelArea,
    ) -> Result<()> {
        let line = source.format().line_bytes(area.width);
        let mut data = vec![0u8; line * area.height as usize];
        source.copy_pixels(area, line, &mut data)?;
        self.frames.push(EncodedFrame {
            format: source.format().id,
            width: area.width,
            height: area.height,
            data,
            palette: metadata.palette.clone(),
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.committed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn resize_only_preserves_constant() {
    // 100x100 solid mid-grey halved with Lanczos3 stays exactly mid-grey.
    let mut container =
        MemContainer::single(MemFrameData::solid(FormatId::Bgr24, 100, 100, &[0x80, 0x80, 0x80]));
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgr24]);
    let settings = ProcessImageSettings {
        width: 50,
        height: 50,
        interpolation: Interpolation::Lanczos3,
        ..Default::default()
    };
    let result = process_image(&mut container, &settings, &mut encoder).unwrap();
    assert_eq!((result.width, result.height), (50, 50));
    assert!(encoder.committed);

    let frame = &encoder.frames[0];
    assert_eq!(frame.format, FormatId::Bgr24);
    assert_eq!(frame.data.len(), 50 * 50 * 3);
    assert!(
        frame.data.iter().all(|b| *b == 0x80),
        "constant input must survive the normalized kernel exactly"
    );
    // The chain carried profilers for each transform it appended.
    assert!(!result.profile.is_empty());
    assert!(result.profile.iter().any(|p| p.pulls > 0));
}

#[test]
fn alpha_flatten_on_white_linear() {
    // Half-transparent blue and green over a white matte with linear
    // blending: untouched channels stay 255, zero channels land at the
    // sRGB encoding of linear 0.498 (187).
    let mut data = Vec::new();
    data.extend_from_slice(&[255, 0, 0, 128]);
    data.extend_from_slice(&[0, 255, 0, 128]);
    let mut frame = MemFrameData::solid(FormatId::Bgra32, 2, 1, &[0; 4]);
    frame.data = data;
    let mut container = MemContainer::single(frame);
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgr24, FormatId::Bgra32]);
    let settings = ProcessImageSettings {
        blend: BlendingMode::Linear,
        matte: Some(MatteColor::WHITE),
        ..Default::default()
    };
    process_image(&mut container, &settings, &mut encoder).unwrap();

    let frame = &encoder.frames[0];
    assert_eq!(frame.format, FormatId::Bgr24, "opaque matte drops alpha");
    let px0 = &frame.data[0..3];
    let px1 = &frame.data[3..6];
    assert_eq!(px0[0], 255);
    assert!((i32::from(px0[1]) - 187).abs() <= 1, "{px0:?}");
    assert!((i32::from(px0[2]) - 187).abs() <= 1, "{px0:?}");
    assert!((i32::from(px1[0]) - 187).abs() <= 1, "{px1:?}");
    assert_eq!(px1[1], 255);
    assert!((i32::from(px1[2]) - 187).abs() <= 1, "{px1:?}");
}

#[test]
fn planar_bt601_pure_red() {
    // (Y=76, Cb=85, Cr=255) in full-range BT.601 is saturated red.
    let mut frame = MemFrameData::solid(FormatId::Bgr24, 1, 1, &[0, 0, 0]);
    frame.ycc = Some(YccPlanes {
        y: (1, 1, vec![76]),
        cb: (1, 1, vec![85]),
        cr: (1, 1, vec![255]),
        video: false,
    });
    let mut container = MemContainer::single(frame);
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgr24]);
    process_image(&mut container, &ProcessImageSettings::default(), &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!(out.format, FormatId::Bgr24);
    assert!(out.data[0] <= 1, "B {:?}", out.data);
    assert!(out.data[1] <= 1, "G {:?}", out.data);
    assert!(out.data[2] >= 254, "R {:?}", out.data);
}

#[test]
fn indexed_greyscale_palette_to_grey8() {
    let mut frame = MemFrameData::solid(FormatId::Indexed8, 2, 2, &[0]);
    frame.data = vec![0, 1, 1, 0];
    frame.palette = Some(vec![0xFF000000, 0xFFFFFFFF]);
    let mut container = MemContainer::single(frame);
    let mut encoder = MemEncoder::accepting(&[FormatId::Grey8, FormatId::Bgr24]);
    process_image(&mut container, &ProcessImageSettings::default(), &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!(out.format, FormatId::Grey8);
    assert_eq!(out.data, vec![0, 255, 255, 0]);
}

#[test]
fn crop_with_rotate90() {
    // Storage 4x2, pixels A..H as distinct grey ramps in Bgr24. Cropping
    // the presentation window matching storage (1,0,2x2) of a Rotate90
    // frame yields [[F, B], [G, C]].
    let px = |v: u8| [v, v, v];
    let mut data = Vec::new();
    for v in [10, 20, 30, 40] {
        data.extend_from_slice(&px(v)); // A B C D
    }
    for v in [50, 60, 70, 80] {
        data.extend_from_slice(&px(v)); // E F G H
    }
    let mut frame = MemFrameData::bgr(4, 2, data);
    frame.orientation = Some(Orientation::Rotate90);
    let mut container = MemContainer::single(frame);
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgr24]);
    let settings = ProcessImageSettings {
        crop: Some(PixelArea::new(0, 1, 2, 2)),
        ..Default::default()
    };
    let result = process_image(&mut container, &settings, &mut encoder).unwrap();
    assert_eq!((result.width, result.height), (2, 2));

    let out = &encoder.frames[0];
    let at = |x: usize, y: usize| out.data[y * 6 + x * 3];
    assert_eq!(at(0, 0), 60, "F");
    assert_eq!(at(1, 0), 20, "B");
    assert_eq!(at(0, 1), 70, "G");
    assert_eq!(at(1, 1), 30, "C");
}

#[test]
fn pad_mode_fills_border_with_matte() {
    // 4x2 red content padded onto a 4x4 canvas: green border above and
    // below, content centered.
    let mut container =
        MemContainer::single(MemFrameData::solid(FormatId::Bgr24, 4, 2, &[0, 0, 255]));
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgr24]);
    let settings = ProcessImageSettings {
        width: 4,
        height: 4,
        mode: CropScaleMode::Pad,
        matte: Some(MatteColor::opaque(0, 255, 0)),
        ..Default::default()
    };
    process_image(&mut container, &settings, &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!((out.width, out.height), (4, 4));
    let row = |y: usize| &out.data[y * 12..y * 12 + 12];
    assert_eq!(row(0), [0, 255, 0].repeat(4).as_slice(), "top border");
    assert_eq!(row(1), [0, 0, 255].repeat(4).as_slice(), "content");
    assert_eq!(row(2), [0, 0, 255].repeat(4).as_slice(), "content");
    assert_eq!(row(3), [0, 255, 0].repeat(4).as_slice(), "bottom border");
}

#[test]
fn hybrid_prescale_large_downscale() {
    // 64x64 checkerboard of 0 and 255 reduced 8x lands mid-grey either
    // way; FavorSpeed routes through the box pre-scaler.
    let mut data = Vec::new();
    for y in 0..64u32 {
        for x in 0..64u32 {
            let v = if (x + y) % 2 == 0 { 0u8 } else { 255 };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    let mut container = MemContainer::single(MemFrameData::bgr(64, 64, data));
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgr24]);
    let settings = ProcessImageSettings {
        width: 8,
        height: 8,
        hybrid: HybridMode::FavorSpeed,
        blend: BlendingMode::Companded,
        ..Default::default()
    };
    process_image(&mut container, &settings, &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!((out.width, out.height), (8, 8));
    for b in &out.data {
        assert!((i32::from(*b) - 128).abs() <= 1, "checkerboard mean, got {b}");
    }
}

#[test]
fn quantized_output_for_indexed_encoder() {
    let mut data = Vec::new();
    for i in 0..4u8 {
        data.extend_from_slice(&[i * 60, 0, 0]);
    }
    let mut container = MemContainer::single(MemFrameData::bgr(4, 1, data));
    let mut encoder = MemEncoder::accepting(&[FormatId::Indexed8]);
    process_image(&mut container, &ProcessImageSettings::default(), &mut encoder).unwrap();

    let out = &encoder.frames[0];
    assert_eq!(out.format, FormatId::Indexed8);
    let palette = out.palette.as_ref().expect("palette handed to encoder");
    assert_eq!(palette.len(), 4);
    // Every index maps back to its source color.
    for (i, idx) in out.data.iter().enumerate() {
        let entry = palette[*idx as usize];
        assert_eq!((entry & 0xFF) as u8, i as u8 * 60, "pixel {i}");
    }
}

#[test]
fn fixed_point_working_depth_matches_float() {
    let mut container =
        MemContainer::single(MemFrameData::solid(FormatId::Bgr24, 40, 40, &[200, 100, 50]));
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgr24]);
    let settings = ProcessImageSettings {
        width: 20,
        height: 20,
        depth: WorkingDepth::Fixed,
        ..Default::default()
    };
    process_image(&mut container, &settings, &mut encoder).unwrap();

    let out = &encoder.frames[0];
    for px in out.data.chunks_exact(3) {
        assert!((i32::from(px[0]) - 200).abs() <= 1, "{px:?}");
        assert!((i32::from(px[1]) - 100).abs() <= 1, "{px:?}");
        assert!((i32::from(px[2]) - 50).abs() <= 1, "{px:?}");
    }
}

#[test]
fn animation_preserve_composites_frames() {
    // Frame 0 paints the 2x2 screen dark and preserves; frame 1 paints a
    // single bright pixel at (1, 1). The emitted second frame shows both.
    let screen = AnimationContainer {
        screen_width: 2,
        screen_height: 2,
        frame_count: 2,
        loop_count: 0,
        background_color: 0,
        requires_screen_buffer: true,
    };
    let mut f0 = MemFrameData::solid(FormatId::Bgra32, 2, 2, &[10, 10, 10, 255]);
    f0.animation = Some(AnimationFrame {
        disposal: FrameDisposal::Preserve,
        ..Default::default()
    });
    let mut f1 = MemFrameData::solid(FormatId::Bgra32, 1, 1, &[200, 200, 200, 255]);
    f1.animation = Some(AnimationFrame {
        offset_left: 1,
        offset_top: 1,
        ..Default::default()
    });
    let mut container = MemContainer {
        frames: vec![f0, f1],
        animation: Some(screen),
    };
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgra32]);
    let result =
        process_image(&mut container, &ProcessImageSettings::default(), &mut encoder).unwrap();
    assert_eq!(result.frames_written, 2);

    let last = &encoder.frames[1];
    assert_eq!(&last.data[0..4], &[10, 10, 10, 255], "preserved frame 0");
    assert_eq!(&last.data[12..16], &[200, 200, 200, 255], "frame 1 pixel");
}

#[test]
fn animation_frame_range_replays_preserved_frames() {
    let screen = AnimationContainer {
        screen_width: 1,
        screen_height: 1,
        frame_count: 2,
        loop_count: 0,
        background_color: 0,
        requires_screen_buffer: true,
    };
    let mut f0 = MemFrameData::solid(FormatId::Bgra32, 1, 1, &[44, 44, 44, 255]);
    f0.animation = Some(AnimationFrame {
        disposal: FrameDisposal::Preserve,
        ..Default::default()
    });
    // Frame 1 is fully transparent; only the replayed frame 0 shows.
    let mut f1 = MemFrameData::solid(FormatId::Bgra32, 1, 1, &[0, 0, 0, 0]);
    f1.animation = Some(AnimationFrame::default());
    let mut container = MemContainer {
        frames: vec![f0, f1],
        animation: Some(screen),
    };
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgra32]);
    let settings = ProcessImageSettings {
        frame_range: Some(1..2),
        ..Default::default()
    };
    let result = process_image(&mut container, &settings, &mut encoder).unwrap();
    assert_eq!(result.frames_written, 1);
    assert_eq!(&encoder.frames[0].data[..4], &[44, 44, 44, 255]);
}

#[test]
fn matrix_profile_converts_to_srgb() {
    use raster_ops::mat3::Mat3;
    use raster_pipeline::codec::IccProfileSource;
    use raster_pipeline::profile::ColorProfile;

    struct Blob;
    impl IccProfileSource for Blob {
        fn profile_length(&self) -> usize {
            12
        }
        fn copy_profile(&self, buf: &mut [u8]) -> Result<()> {
            buf.copy_from_slice(b"swap-rb-prof");
            Ok(())
        }
    }

    struct ProfiledFrame(MemFrame, Blob);
    impl ImageFrame for ProfiledFrame {
        fn width(&self) -> u32 {
            self.0.width()
        }
        fn height(&self) -> u32 {
            self.0.height()
        }
        fn pixel_source(&mut self) -> Result<Box<dyn PixelSource>> {
            self.0.pixel_source()
        }
        fn icc_profile(&self) -> Option<&dyn IccProfileSource> {
            Some(&self.1)
        }
    }

    struct ProfiledContainer(MemFrameData);
    impl ImageContainer for ProfiledContainer {
        fn mime_type(&self) -> &str {
            "image/x-test"
        }
        fn frame_count(&self) -> u32 {
            1
        }
        fn frame(&mut self, _index: u32) -> Result<Box<dyn ImageFrame + '_>> {
            Ok(Box::new(ProfiledFrame(MemFrame { data: self.0.clone() }, Blob)))
        }
    }

    // A profile that swaps R and B in linear light; a pure blue source
    // pixel encodes as pure red.
    let parser = |_bytes: &[u8]| {
        Some(ColorProfile::Matrix {
            to_srgb_linear: Mat3::from_rows([
                [0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0],
                [1.0, 0.0, 0.0],
            ]),
        })
    };

    let mut container =
        ProfiledContainer(MemFrameData::solid(FormatId::Bgr24, 1, 1, &[255, 0, 0]));
    let mut encoder = MemEncoder::accepting(&[FormatId::Bgr24]);
    process_image_with(
        &mut container,
        &ProcessImageSettings::default(),
        &mut encoder,
        &parser,
    )
    .unwrap();

    let out = &encoder.frames[0];
    assert!(out.data[0] <= 1, "blue removed: {:?}", out.data);
    assert!(out.data[2] >= 254, "red added: {:?}", out.data);
}
