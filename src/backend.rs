//! Codec library contract
//!
//! The pipeline never decodes or encodes pixels itself. It drives a
//! [`MediaBackend`], which wraps a real codec library: FFmpeg
//! ([`FfmpegBackend`](crate::FfmpegBackend), feature `ffmpeg`) or the pure
//! Rust still image stack ([`StillImageBackend`](crate::StillImageBackend)).
//!
//! Every handle a backend hands out owns its native resources and releases
//! them on drop, so callers get scoped cleanup on every exit path.

use serde::{Deserialize, Serialize};

use crate::descriptor::FormatDescriptor;
use crate::error::BackendError;
use crate::signature::ImageCodec;

/// Ordered key/value options passed to the container open call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionDict {
    entries: Vec<(String, String)>,
}

impl OptionDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pixel layout of a decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelLayout {
    /// Planar YUV 4:2:0
    Yuv420p,
    /// Packed 8-bit RGB
    Rgb24,
    /// Anything else, by backend name
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRange {
    Unspecified,
    /// MPEG / TV range
    Limited,
    /// JPEG / PC range
    Full,
}

/// Target geometry and layout of a rescale / conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSpec {
    pub width: i32,
    pub height: i32,
    pub layout: PixelLayout,
    pub range: ColorRange,
}

/// Decoded picture as seen by the pipeline
pub trait RasterFrame {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn layout(&self) -> PixelLayout;
    fn color_range(&self) -> ColorRange;
}

/// Demuxed packet as seen by the pipeline
pub trait PacketData {
    fn stream_index(&self) -> usize;
    fn data(&self) -> &[u8];
}

/// Which codec a decoder is opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderChoice {
    /// The codec the container declares for the stream
    Declared,
    /// Force the decoder context to this codec; declared stream parameters
    /// are not trusted
    Forced(ImageCodec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecMedia {
    Video = 0,
    Audio = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoderRole {
    Encoder = 1,
    Decoder = 2,
}

/// One entry of a backend's codec catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecEntry {
    pub media: CodecMedia,
    pub role: CoderRole,
    pub name: String,
    pub long_name: Option<String>,
    /// Hardware device types the codec can use (e.g. "cuda", "vaapi")
    pub hw: Vec<String>,
}

/// Demux / decode / scale / encode primitives of a codec library.
pub trait MediaBackend {
    /// Open container
    type Input;
    type Packet: PacketData + Clone;
    type Decoder;
    type Frame: RasterFrame;

    /// First probe phase: open the resource and read its header.
    fn open_input(&self, locator: &str, options: &OptionDict) -> Result<Self::Input, BackendError>;

    /// Second probe phase: discover stream parameters.
    fn find_stream_info(&self, input: &mut Self::Input) -> Result<(), BackendError>;

    fn describe(&self, input: &Self::Input) -> FormatDescriptor;

    /// Embedded picture packet of `stream`, if it carries one.
    fn attached_picture(&self, input: &Self::Input, stream: usize) -> Option<Self::Packet>;

    /// Next packet of any stream; `Ok(None)` at end of stream.
    fn read_packet(&self, input: &mut Self::Input) -> Result<Option<Self::Packet>, BackendError>;

    /// Find, configure and open a decoder for `stream`.
    ///
    /// Reports [`BackendError::DecoderNotFound`] when the codec library has
    /// no decoder for the codec at all.
    fn open_decoder(
        &self,
        input: &Self::Input,
        stream: usize,
        choice: DecoderChoice,
    ) -> Result<Self::Decoder, BackendError>;

    fn send_packet(&self, decoder: &mut Self::Decoder, packet: &Self::Packet) -> Result<(), BackendError>;

    /// Signal end of input so buffered frames can be drained.
    fn send_eof(&self, decoder: &mut Self::Decoder) -> Result<(), BackendError>;

    /// Next decoded frame; `Ok(None)` when the decoder needs more input.
    fn receive_frame(&self, decoder: &mut Self::Decoder) -> Result<Option<Self::Frame>, BackendError>;

    /// Bilinear resample / pixel format conversion into a new frame.
    fn rescale(&self, frame: &Self::Frame, target: &RasterSpec) -> Result<Self::Frame, BackendError>;

    /// Encode one frame with the still image profile at a fixed quality
    /// scale (2 = best, 31 = worst) and return the encoded bytes.
    fn encode_still(
        &self,
        frame: &Self::Frame,
        width: i32,
        height: i32,
        qscale: i32,
    ) -> Result<Vec<u8>, BackendError>;

    /// Audio and video codecs the library provides.
    fn codec_catalog(&self) -> Vec<CodecEntry>;
}
