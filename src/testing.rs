//! Scripted in-memory backend for unit tests

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::backend::{
    CodecEntry, CodecMedia, CoderRole, ColorRange, DecoderChoice, MediaBackend, OptionDict,
    PacketData, PixelLayout, RasterFrame, RasterSpec,
};
use crate::descriptor::{
    AudioParams, FormatDescriptor, MediaKind, Rational, StreamDescriptor, StreamParams, VideoParams,
};
use crate::error::BackendError;
use crate::signature::ImageCodec;

pub const JPEG_BYTES: &[u8] = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00\x01\x01";
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1A\n\x00\x00\x00\rIHDR";

/// How the declared decoder behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeScript {
    Works,
    NotFound,
    OpenFails,
    SendFails,
    ReceiveFails,
    /// Buffers the first packet, fails on the second
    ReceiveFailsLate,
    NeverOutputs,
}

#[derive(Debug, Clone)]
pub struct FakePacket {
    pub stream: usize,
    pub data: Vec<u8>,
}

impl PacketData for FakePacket {
    fn stream_index(&self) -> usize {
        self.stream
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeFrame {
    pub width: i32,
    pub height: i32,
    pub layout: PixelLayout,
    pub range: ColorRange,
}

impl RasterFrame for FakeFrame {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn layout(&self) -> PixelLayout {
        self.layout.clone()
    }

    fn color_range(&self) -> ColorRange {
        self.range
    }
}

pub struct FakeInput {
    cursor: usize,
    live: Rc<Cell<usize>>,
}

impl Drop for FakeInput {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

pub struct FakeDecoder {
    script: DecodeScript,
    ready: bool,
    sent: usize,
}

pub struct FakeBackend {
    pub format: FormatDescriptor,
    pub packets: Vec<FakePacket>,
    pub attached: Option<FakePacket>,
    pub fail_open: Option<String>,
    pub fail_probe: Option<String>,
    pub declared: DecodeScript,
    /// Codecs that decode when forced
    pub forced_ok: Vec<ImageCodec>,
    pub frame: FakeFrame,
    pub fail_rescale: bool,
    pub fail_encode: bool,
    calls: RefCell<Vec<String>>,
    live: Rc<Cell<usize>>,
}

impl FakeBackend {
    fn with_format(format: FormatDescriptor, frame: FakeFrame) -> Self {
        Self {
            format,
            packets: Vec::new(),
            attached: None,
            fail_open: None,
            fail_probe: None,
            declared: DecodeScript::Works,
            forced_ok: Vec::new(),
            frame,
            fail_rescale: false,
            fail_encode: false,
            calls: RefCell::new(Vec::new()),
            live: Rc::new(Cell::new(0)),
        }
    }

    /// MP3-like container: audio stream 0, MJPEG cover on stream 1.
    pub fn audio_with_cover() -> Self {
        let mut audio = StreamDescriptor::new(0, MediaKind::Audio);
        audio.codec_id = 86017;
        audio.codec_name = Some("mp3".to_string());
        audio.codec_long_name = Some("MP3 (MPEG audio layer 3)".to_string());
        audio.bit_rate = 320_000;
        audio.time_base = Rational::new(1, 14_112_000);
        audio.duration = 2_822_400_000;
        audio.params = StreamParams::Audio(AudioParams {
            sample_rate: 44_100,
            channels: 2,
            channel_layout: Some("stereo".to_string()),
            sample_fmt: Some("fltp".to_string()),
            initial_padding: 0,
            trailing_padding: 0,
        });

        let mut cover = StreamDescriptor::new(1, MediaKind::Video);
        cover.codec_id = 7;
        cover.codec_name = Some("mjpeg".to_string());
        cover.attached_pic = true;
        cover.time_base = Rational::new(1, 90_000);
        cover.tags.insert("comment".to_string(), "Cover (front)".to_string());
        cover.params = StreamParams::Video(VideoParams {
            width: 500,
            height: 500,
            pix_fmt: Some("yuvj420p".to_string()),
            color_range: Some("pc".to_string()),
            ..Default::default()
        });

        let mut tags = BTreeMap::new();
        tags.insert("title".to_string(), "Song".to_string());
        tags.insert("artist".to_string(), "Band".to_string());

        let format = FormatDescriptor {
            format_name: Some("mp3".to_string()),
            start_time: 25_057,
            duration_us: Some(200_000_000),
            size: Some(8_000_000),
            bit_rate: 320_000,
            probe_score: 51,
            tags,
            streams: vec![audio, cover],
            ..Default::default()
        };

        let mut backend = Self::with_format(format, FakeFrame {
            width: 500,
            height: 500,
            layout: PixelLayout::Yuv420p,
            range: ColorRange::Full,
        });
        backend.attached = Some(FakePacket { stream: 1, data: JPEG_BYTES.to_vec() });
        backend
    }

    /// H.264 clip: video stream 0, audio stream 1, interleaved packets.
    pub fn video_clip() -> Self {
        let mut video = StreamDescriptor::new(0, MediaKind::Video);
        video.codec_id = 27;
        video.codec_name = Some("h264".to_string());
        video.avg_frame_rate = Rational::new(30_000, 1001);
        video.r_frame_rate = Rational::new(30_000, 1001);
        video.time_base = Rational::new(1, 30_000);
        video.duration = 300_000;
        video.params = StreamParams::Video(VideoParams {
            width: 1920,
            height: 1080,
            framerate: Rational::new(30_000, 1001),
            sample_aspect_ratio: Rational::new(1, 1),
            pix_fmt: Some("yuv420p".to_string()),
            level: 40,
            ..Default::default()
        });
        let audio = StreamDescriptor::new(1, MediaKind::Audio);

        let format = FormatDescriptor {
            format_name: Some("mov,mp4,m4a,3gp,3g2,mj2".to_string()),
            duration_us: Some(10_000_000),
            streams: vec![video, audio],
            ..Default::default()
        };

        let mut backend = Self::with_format(format, FakeFrame {
            width: 1920,
            height: 1080,
            layout: PixelLayout::Yuv420p,
            range: ColorRange::Limited,
        });
        backend.packets = vec![
            FakePacket { stream: 1, data: vec![0xAA; 32] },
            FakePacket { stream: 0, data: vec![0x00, 0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x28] },
            FakePacket { stream: 1, data: vec![0xAB; 32] },
            FakePacket { stream: 0, data: vec![0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x00, 0x01] },
        ];
        backend
    }

    /// Audio only, no video stream at all.
    pub fn audio_only() -> Self {
        let mut backend = Self::audio_with_cover();
        backend.format.streams.truncate(1);
        backend.attached = None;
        backend
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Inputs opened and not yet dropped
    pub fn live_inputs(&self) -> usize {
        self.live.get()
    }

    fn note(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }
}

impl MediaBackend for FakeBackend {
    type Input = FakeInput;
    type Packet = FakePacket;
    type Decoder = FakeDecoder;
    type Frame = FakeFrame;

    fn open_input(&self, locator: &str, _options: &OptionDict) -> Result<FakeInput, BackendError> {
        self.note(format!("open_input {}", locator));
        if let Some(message) = &self.fail_open {
            return Err(BackendError::call("avformat_open_input", message.clone()));
        }
        self.live.set(self.live.get() + 1);
        Ok(FakeInput { cursor: 0, live: Rc::clone(&self.live) })
    }

    fn find_stream_info(&self, _input: &mut FakeInput) -> Result<(), BackendError> {
        self.note("find_stream_info");
        match &self.fail_probe {
            Some(message) => Err(BackendError::call("avformat_find_stream_info", message.clone())),
            None => Ok(()),
        }
    }

    fn describe(&self, _input: &FakeInput) -> FormatDescriptor {
        self.format.clone()
    }

    fn attached_picture(&self, _input: &FakeInput, stream: usize) -> Option<FakePacket> {
        self.attached.clone().filter(|p| p.stream == stream)
    }

    fn read_packet(&self, input: &mut FakeInput) -> Result<Option<FakePacket>, BackendError> {
        let packet = self.packets.get(input.cursor).cloned();
        input.cursor += 1;
        Ok(packet)
    }

    fn open_decoder(
        &self,
        _input: &FakeInput,
        _stream: usize,
        choice: DecoderChoice,
    ) -> Result<FakeDecoder, BackendError> {
        self.note(format!("open_decoder {:?}", choice));
        let script = match choice {
            DecoderChoice::Declared => self.declared,
            DecoderChoice::Forced(codec) if self.forced_ok.contains(&codec) => DecodeScript::Works,
            DecoderChoice::Forced(_) => DecodeScript::ReceiveFails,
        };
        match script {
            DecodeScript::NotFound => Err(BackendError::DecoderNotFound("fake".to_string())),
            DecodeScript::OpenFails => Err(BackendError::call("avcodec_open2", "Invalid argument")),
            _ => Ok(FakeDecoder { script, ready: false, sent: 0 }),
        }
    }

    fn send_packet(&self, decoder: &mut FakeDecoder, packet: &FakePacket) -> Result<(), BackendError> {
        self.note(format!("send_packet {}", packet.data.len()));
        if decoder.script == DecodeScript::SendFails {
            return Err(BackendError::call("avcodec_send_packet", "Invalid data found when processing input"));
        }
        decoder.ready = true;
        decoder.sent += 1;
        Ok(())
    }

    fn send_eof(&self, _decoder: &mut FakeDecoder) -> Result<(), BackendError> {
        self.note("send_eof");
        Ok(())
    }

    fn receive_frame(&self, decoder: &mut FakeDecoder) -> Result<Option<FakeFrame>, BackendError> {
        if !decoder.ready {
            return Ok(None);
        }
        decoder.ready = false;
        match decoder.script {
            DecodeScript::ReceiveFails => {
                Err(BackendError::call("avcodec_receive_frame", "Invalid data found when processing input"))
            }
            DecodeScript::ReceiveFailsLate if decoder.sent < 2 => Ok(None),
            DecodeScript::ReceiveFailsLate => {
                Err(BackendError::call("avcodec_receive_frame", "Invalid data found when processing input"))
            }
            DecodeScript::NeverOutputs => Ok(None),
            _ => Ok(Some(self.frame.clone())),
        }
    }

    fn rescale(&self, frame: &FakeFrame, target: &RasterSpec) -> Result<FakeFrame, BackendError> {
        self.note(format!("rescale {}x{}", target.width, target.height));
        if self.fail_rescale || target.width <= 0 || target.height <= 0 {
            return Err(BackendError::call("sws_getContext", "cannot create scaler"));
        }
        Ok(FakeFrame {
            width: target.width,
            height: target.height,
            layout: target.layout.clone(),
            range: if target.range == ColorRange::Unspecified { frame.range } else { target.range },
        })
    }

    fn encode_still(&self, frame: &FakeFrame, width: i32, height: i32, qscale: i32) -> Result<Vec<u8>, BackendError> {
        self.note(format!("encode {}x{} q{}", width, height, qscale));
        if self.fail_encode {
            return Err(BackendError::call("avcodec_send_frame", "Invalid argument"));
        }
        if frame.width != width || frame.height != height {
            return Err(BackendError::call("avcodec_send_frame", "frame size does not match encoder"));
        }
        Ok(format!("JPEG {}x{} q{}", width, height, qscale).into_bytes())
    }

    fn codec_catalog(&self) -> Vec<CodecEntry> {
        vec![
            CodecEntry {
                media: CodecMedia::Video,
                role: CoderRole::Decoder,
                name: "h264".to_string(),
                long_name: Some("H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10".to_string()),
                hw: vec!["cuda".to_string(), "vaapi".to_string()],
            },
            CodecEntry {
                media: CodecMedia::Audio,
                role: CoderRole::Encoder,
                name: "aac".to_string(),
                long_name: None,
                hw: Vec::new(),
            },
        ]
    }
}
