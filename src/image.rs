//! Still image backend
//!
//! Pure Rust [`MediaBackend`] over the `image` and `fast_image_resize`
//! crates. A still image file is treated as a container with one video
//! stream holding one packet, the same way FFmpeg's image demuxer sees it:
//! the declared codec comes from the file extension when there is one, and
//! from the content otherwise.

use fast_image_resize as fr;
use fr::images::Image as FrImage;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

use crate::backend::{
    CodecEntry, CodecMedia, CoderRole, ColorRange, DecoderChoice, MediaBackend, OptionDict,
    PacketData, PixelLayout, RasterFrame, RasterSpec,
};
use crate::descriptor::{FormatDescriptor, MediaKind, Rational, StreamDescriptor, StreamParams, VideoParams};
use crate::error::BackendError;
use crate::signature::{self, ImageCodec};
use crate::transcode::scale_to_quality;

/// Probe score of a format recognized by its file extension
const SCORE_EXTENSION: i32 = 50;
/// Probe score of a format recognized by its content
const SCORE_CONTENT: i32 = 99;

const ALL_CODECS: [ImageCodec; 5] = [
    ImageCodec::Mjpeg,
    ImageCodec::Png,
    ImageCodec::Gif,
    ImageCodec::Bmp,
    ImageCodec::Tiff,
];

/// `image` crate format for a codec
fn image_format(codec: ImageCodec) -> ImageFormat {
    match codec {
        ImageCodec::Mjpeg => ImageFormat::Jpeg,
        ImageCodec::Png => ImageFormat::Png,
        ImageCodec::Gif => ImageFormat::Gif,
        ImageCodec::Bmp => ImageFormat::Bmp,
        ImageCodec::Tiff => ImageFormat::Tiff,
    }
}

fn codec_of(format: ImageFormat) -> Option<ImageCodec> {
    ALL_CODECS.into_iter().find(|c| image_format(*c) == format)
}

/// libavcodec numbering, so descriptors look alike across backends
fn codec_id(codec: ImageCodec) -> i32 {
    match codec {
        ImageCodec::Mjpeg => 7,
        ImageCodec::Png => 61,
        ImageCodec::Bmp => 78,
        ImageCodec::Tiff => 96,
        ImageCodec::Gif => 97,
    }
}

fn pipe_format_name(codec: ImageCodec) -> String {
    match codec {
        ImageCodec::Mjpeg => "jpeg_pipe".to_string(),
        other => format!("{}_pipe", other.name()),
    }
}

// ============================================================================
// Handles
// ============================================================================

/// An opened image file
pub struct StillInput {
    path: PathBuf,
    data: Rc<[u8]>,
    probe_size: usize,
    /// Codec named by the file extension
    declared: Option<ImageCodec>,
    /// Codec named by the content, filled by stream discovery
    sniffed: Option<ImageCodec>,
    dimensions: Option<(u32, u32)>,
    packet_read: bool,
}

impl StillInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Codec the single stream is declared as
    pub fn codec(&self) -> Option<ImageCodec> {
        self.declared.or(self.sniffed)
    }
}

/// The whole file as one packet
#[derive(Debug, Clone)]
pub struct StillPacket {
    data: Rc<[u8]>,
}

impl PacketData for StillPacket {
    fn stream_index(&self) -> usize {
        0
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

pub struct StillDecoder {
    codec: ImageCodec,
    pending: Option<StillPacket>,
}

/// Pixel storage of a decoded raster
#[derive(Debug, Clone)]
enum Pixels {
    Rgb(RgbImage),
    /// Planar 4:2:0, chroma planes are `ceil(w/2) x ceil(h/2)`
    Yuv420 { y: Vec<u8>, u: Vec<u8>, v: Vec<u8> },
}

/// Decoded picture
#[derive(Debug, Clone)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Pixels,
    range: ColorRange,
}

impl Raster {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: Pixels::Rgb(image),
            range: ColorRange::Full,
        }
    }

    /// Packed RGB8 copy of the raster
    pub fn to_rgb(&self) -> RgbImage {
        match &self.pixels {
            Pixels::Rgb(image) => image.clone(),
            Pixels::Yuv420 { y, u, v } => yuv420_to_rgb(self.width, self.height, y, u, v, self.range),
        }
    }

    fn into_rgb(self) -> RgbImage {
        match self.pixels {
            Pixels::Rgb(image) => image,
            Pixels::Yuv420 { y, u, v } => yuv420_to_rgb(self.width, self.height, &y, &u, &v, self.range),
        }
    }
}

impl RasterFrame for Raster {
    fn width(&self) -> i32 {
        self.width as i32
    }

    fn height(&self) -> i32 {
        self.height as i32
    }

    fn layout(&self) -> PixelLayout {
        match self.pixels {
            Pixels::Rgb(_) => PixelLayout::Rgb24,
            Pixels::Yuv420 { .. } => PixelLayout::Yuv420p,
        }
    }

    fn color_range(&self) -> ColorRange {
        self.range
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Codec library backed by the `image` crate
#[derive(Debug, Clone, Default)]
pub struct StillImageBackend;

impl StillImageBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for StillImageBackend {
    type Input = StillInput;
    type Packet = StillPacket;
    type Decoder = StillDecoder;
    type Frame = Raster;

    fn open_input(&self, locator: &str, options: &OptionDict) -> Result<StillInput, BackendError> {
        let path = match locator.strip_prefix("file://") {
            Some(path) => path,
            None if locator.contains("://") => {
                return Err(BackendError::Unsupported(format!(
                    "network locator {} (build with the ffmpeg feature)",
                    locator
                )))
            }
            None => locator,
        };

        let data = std::fs::read(path).map_err(|e| BackendError::call("open", e.to_string()))?;
        let probe_size = options
            .get("probesize")
            .and_then(|v| v.parse().ok())
            .unwrap_or(data.len());
        let declared = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageCodec::from_name);

        debug!("Opened image {} ({} bytes, declared {:?})", path, data.len(), declared);
        Ok(StillInput {
            path: PathBuf::from(path),
            data: Rc::from(data),
            probe_size,
            declared,
            sniffed: None,
            dimensions: None,
            packet_read: false,
        })
    }

    fn find_stream_info(&self, input: &mut StillInput) -> Result<(), BackendError> {
        let head = &input.data[..input.data.len().min(input.probe_size)];
        input.sniffed = signature::detect(head)
            .or_else(|| image::guess_format(head).ok().and_then(codec_of));

        let Some(codec) = input.codec() else {
            return Err(BackendError::call(
                "find_stream_info",
                format!("unrecognized image data: {}", signature::describe(head)),
            ));
        };

        // The header parse only succeeds when the declared codec is right
        input.dimensions = ImageReader::with_format(Cursor::new(&input.data[..]), image_format(codec))
            .into_dimensions()
            .ok();
        debug!("Image stream: {} {:?}", codec.name(), input.dimensions);
        Ok(())
    }

    fn describe(&self, input: &StillInput) -> FormatDescriptor {
        let mut stream = StreamDescriptor::new(0, MediaKind::Video);
        let codec = input.codec();
        if let Some(codec) = codec {
            stream.codec_id = codec_id(codec);
            stream.codec_name = Some(codec.name().to_string());
            stream.codec_long_name = Some(codec.long_name().to_string());
        }
        stream.r_frame_rate = Rational::new(25, 1);
        stream.avg_frame_rate = Rational::new(0, 0);
        stream.time_base = Rational::new(1, 25);
        stream.duration = 1;

        let (width, height) = input.dimensions.unwrap_or((0, 0));
        stream.params = StreamParams::Video(VideoParams {
            width: width as i32,
            height: height as i32,
            pix_fmt: input.dimensions.map(|_| "rgb24".to_string()),
            ..Default::default()
        });

        let (format_name, probe_score) = match (input.declared, codec) {
            (Some(_), _) => (Some("image2".to_string()), SCORE_EXTENSION),
            (None, Some(codec)) => (Some(pipe_format_name(codec)), SCORE_CONTENT),
            (None, None) => (None, 0),
        };

        FormatDescriptor {
            format_name,
            duration_us: Some(40_000),
            size: Some(input.data.len() as i64),
            probe_score,
            streams: vec![stream],
            ..Default::default()
        }
    }

    fn attached_picture(&self, _input: &StillInput, _stream: usize) -> Option<StillPacket> {
        None
    }

    fn read_packet(&self, input: &mut StillInput) -> Result<Option<StillPacket>, BackendError> {
        if input.packet_read {
            return Ok(None);
        }
        input.packet_read = true;
        Ok(Some(StillPacket { data: Rc::clone(&input.data) }))
    }

    fn open_decoder(
        &self,
        input: &StillInput,
        stream: usize,
        choice: DecoderChoice,
    ) -> Result<StillDecoder, BackendError> {
        if stream != 0 {
            return Err(BackendError::Unsupported(format!("stream {} of a still image", stream)));
        }

        let codec = match choice {
            DecoderChoice::Declared => input
                .codec()
                .ok_or_else(|| BackendError::DecoderNotFound("unknown".to_string()))?,
            DecoderChoice::Forced(codec) => codec,
        };
        if !image_format(codec).reading_enabled() {
            return Err(BackendError::DecoderNotFound(codec.name().to_string()));
        }

        Ok(StillDecoder { codec, pending: None })
    }

    fn send_packet(&self, decoder: &mut StillDecoder, packet: &StillPacket) -> Result<(), BackendError> {
        if decoder.pending.is_some() {
            return Err(BackendError::call("send_packet", "decoder has an undrained packet"));
        }
        decoder.pending = Some(packet.clone());
        Ok(())
    }

    fn send_eof(&self, _decoder: &mut StillDecoder) -> Result<(), BackendError> {
        Ok(())
    }

    fn receive_frame(&self, decoder: &mut StillDecoder) -> Result<Option<Raster>, BackendError> {
        let Some(packet) = decoder.pending.take() else {
            return Ok(None);
        };

        let image = image::load_from_memory_with_format(packet.data(), image_format(decoder.codec))
            .map_err(|e| BackendError::call("receive_frame", format!("{}: {}", decoder.codec.name(), e)))?;
        Ok(Some(Raster::from_rgb(image.to_rgb8())))
    }

    fn rescale(&self, frame: &Raster, target: &RasterSpec) -> Result<Raster, BackendError> {
        if target.width <= 0 || target.height <= 0 {
            return Err(BackendError::call(
                "rescale",
                format!("invalid target size {}x{}", target.width, target.height),
            ));
        }
        let (width, height) = (target.width as u32, target.height as u32);

        let rgb = if (width, height) == (frame.width, frame.height) {
            frame.to_rgb()
        } else {
            resize_bilinear(&frame.to_rgb(), width, height)?
        };

        let range = match target.range {
            ColorRange::Unspecified => frame.range,
            range => range,
        };
        match &target.layout {
            PixelLayout::Rgb24 => Ok(Raster { range, ..Raster::from_rgb(rgb) }),
            PixelLayout::Yuv420p => {
                let (y, u, v) = rgb_to_yuv420(&rgb, range);
                Ok(Raster { width, height, pixels: Pixels::Yuv420 { y, u, v }, range })
            }
            PixelLayout::Other(name) => Err(BackendError::Unsupported(format!("pixel format {}", name))),
        }
    }

    fn encode_still(&self, frame: &Raster, width: i32, height: i32, qscale: i32) -> Result<Vec<u8>, BackendError> {
        if width != frame.width() || height != frame.height() {
            return Err(BackendError::call(
                "encode_still",
                format!(
                    "frame is {}x{} but the encoder was opened for {}x{}",
                    frame.width, frame.height, width, height
                ),
            ));
        }

        let rgb = frame.clone().into_rgb();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, scale_to_quality(qscale))
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|e| BackendError::call("encode_still", e.to_string()))?;
        Ok(out)
    }

    fn codec_catalog(&self) -> Vec<CodecEntry> {
        let mut entries = Vec::new();
        for codec in ALL_CODECS {
            let format = image_format(codec);
            let roles = [
                (CoderRole::Encoder, format.writing_enabled()),
                (CoderRole::Decoder, format.reading_enabled()),
            ];
            for (role, enabled) in roles {
                if enabled {
                    entries.push(CodecEntry {
                        media: CodecMedia::Video,
                        role,
                        name: codec.name().to_string(),
                        long_name: Some(codec.long_name().to_string()),
                        hw: Vec::new(),
                    });
                }
            }
        }
        entries
    }
}

// ============================================================================
// Pixel Conversion
// ============================================================================

/// SIMD bilinear resample via fast_image_resize
fn resize_bilinear(src: &RgbImage, width: u32, height: u32) -> Result<RgbImage, BackendError> {
    let src_image = FrImage::from_vec_u8(src.width(), src.height(), src.as_raw().clone(), fr::PixelType::U8x3)
        .map_err(|e| BackendError::call("rescale", format!("source image: {:?}", e)))?;
    let mut dst_image = FrImage::new(width, height, src_image.pixel_type());

    let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
    fr::Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| BackendError::call("rescale", format!("{:?}", e)))?;

    RgbImage::from_raw(width, height, dst_image.buffer().to_vec())
        .ok_or_else(|| BackendError::call("rescale", "resized buffer has the wrong size"))
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// BT.601 RGB -> planar YUV 4:2:0, chroma averaged over 2x2 blocks
fn rgb_to_yuv420(rgb: &RgbImage, range: ColorRange) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
    let limited = range == ColorRange::Limited;

    let luma = |y: f32| if limited { 16.0 + y * 219.0 / 255.0 } else { y };
    let chroma = |c: f32| if limited { 128.0 + c * 224.0 / 255.0 } else { 128.0 + c };

    let mut y_plane = Vec::with_capacity(width * height);
    for px in rgb.pixels() {
        let [r, g, b] = px.0.map(f32::from);
        y_plane.push(clamp_u8(luma(0.299 * r + 0.587 * g + 0.114 * b)));
    }

    let mut u_plane = Vec::with_capacity(cw * ch);
    let mut v_plane = Vec::with_capacity(cw * ch);
    for cy in 0..ch {
        for cx in 0..cw {
            let (mut cb, mut cr, mut n) = (0.0f32, 0.0f32, 0.0f32);
            for y in (cy * 2)..((cy * 2 + 2).min(height)) {
                for x in (cx * 2)..((cx * 2 + 2).min(width)) {
                    let [r, g, b] = rgb.get_pixel(x as u32, y as u32).0.map(f32::from);
                    cb += -0.168_736 * r - 0.331_264 * g + 0.5 * b;
                    cr += 0.5 * r - 0.418_688 * g - 0.081_312 * b;
                    n += 1.0;
                }
            }
            u_plane.push(clamp_u8(chroma(cb / n)));
            v_plane.push(clamp_u8(chroma(cr / n)));
        }
    }

    (y_plane, u_plane, v_plane)
}

/// Planar YUV 4:2:0 -> BT.601 RGB
fn yuv420_to_rgb(width: u32, height: u32, y: &[u8], u: &[u8], v: &[u8], range: ColorRange) -> RgbImage {
    let cw = (width as usize).div_ceil(2);
    let limited = range == ColorRange::Limited;

    RgbImage::from_fn(width, height, |x, row| {
        let luma = y[row as usize * width as usize + x as usize] as f32;
        let idx = (row as usize / 2) * cw + x as usize / 2;
        let (mut cb, mut cr) = (u[idx] as f32 - 128.0, v[idx] as f32 - 128.0);

        let luma = if limited { (luma - 16.0) * 255.0 / 219.0 } else { luma };
        if limited {
            cb *= 255.0 / 224.0;
            cr *= 255.0 / 224.0;
        }

        image::Rgb([
            clamp_u8(luma + 1.402 * cr),
            clamp_u8(luma - 0.344_136 * cb - 0.714_136 * cr),
            clamp_u8(luma + 1.772 * cb),
        ])
    })
}
