//! FFmpeg backend
//!
//! [`MediaBackend`] over libavformat / libavcodec / libswscale through the
//! raw `ffmpeg-sys-next` bindings. Handles local paths and every protocol
//! the linked FFmpeg was built with.
//!
//! # Safety
//!
//! Every native object is owned by exactly one guard type whose `Drop`
//! frees it, so a handle is released on all exit paths. Raw pointers never
//! leave this module.

use ffmpeg_sys_next as ff;
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::Once;
use tracing::debug;

use crate::backend::{
    CodecEntry, CodecMedia, CoderRole, ColorRange, DecoderChoice, MediaBackend, OptionDict,
    PacketData, PixelLayout, RasterFrame, RasterSpec,
};
use crate::descriptor::{
    AudioParams, FormatDescriptor, MediaKind, Rational, StreamDescriptor, StreamParams, VideoParams,
};
use crate::error::BackendError;
use crate::signature::ImageCodec;

/// Bilinear interpolation (libswscale/swscale.h)
const SWS_BILINEAR: c_int = 2;
/// ITU-R BT.601 coefficients (libswscale/swscale.h)
const SWS_CS_DEFAULT: c_int = 5;
const AV_NOPTS_VALUE: i64 = i64::MIN;

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
const EAGAIN: c_int = 35;
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
const EAGAIN: c_int = 11;

static NETWORK_INIT: Once = Once::new();

// ============================================================================
// Helpers
// ============================================================================

/// Human readable text of an FFmpeg error code
fn av_error(code: c_int) -> String {
    let mut buf = [0 as c_char; 256];
    unsafe {
        if ff::av_strerror(code, buf.as_mut_ptr(), buf.len()) < 0 {
            return format!("error code {}", code);
        }
        CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned()
    }
}

fn check(op: &'static str, ret: c_int) -> Result<c_int, BackendError> {
    if ret < 0 {
        Err(BackendError::call(op, av_error(ret)))
    } else {
        Ok(ret)
    }
}

unsafe fn cstr_opt(p: *const c_char) -> Option<String> {
    if p.is_null() {
        None
    } else {
        Some(CStr::from_ptr(p).to_string_lossy().into_owned())
    }
}

fn c_string(op: &'static str, value: &str) -> Result<CString, BackendError> {
    CString::new(value).map_err(|_| BackendError::call(op, format!("NUL byte in {:?}", value)))
}

fn rational(r: ff::AVRational) -> Rational {
    Rational::new(r.num, r.den)
}

unsafe fn dict_to_map(dict: *const ff::AVDictionary) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if dict.is_null() {
        return map;
    }

    let empty = b"\0".as_ptr() as *const c_char;
    let mut entry: *mut ff::AVDictionaryEntry = ptr::null_mut();
    loop {
        entry = ff::av_dict_get(dict, empty, entry, ff::AV_DICT_IGNORE_SUFFIX as c_int);
        if entry.is_null() {
            break;
        }
        if let (Some(key), Some(value)) = (cstr_opt((*entry).key), cstr_opt((*entry).value)) {
            map.insert(key, value);
        }
    }
    map
}

fn pix_fmt_from_raw(format: c_int) -> Option<ff::AVPixelFormat> {
    if format < 0 || format >= ff::AVPixelFormat::AV_PIX_FMT_NB as c_int {
        return None;
    }
    // In range of the enum's contiguous discriminants
    Some(unsafe { std::mem::transmute::<c_int, ff::AVPixelFormat>(format) })
}

fn pix_fmt_name(format: c_int) -> Option<String> {
    pix_fmt_from_raw(format).and_then(|f| unsafe { cstr_opt(ff::av_get_pix_fmt_name(f)) })
}

fn sample_fmt_name(format: c_int) -> Option<String> {
    if format < 0 || format >= ff::AVSampleFormat::AV_SAMPLE_FMT_NB as c_int {
        return None;
    }
    let format = unsafe { std::mem::transmute::<c_int, ff::AVSampleFormat>(format) };
    unsafe { cstr_opt(ff::av_get_sample_fmt_name(format)) }
}

fn codec_id_of(codec: ImageCodec) -> ff::AVCodecID {
    match codec {
        ImageCodec::Mjpeg => ff::AVCodecID::AV_CODEC_ID_MJPEG,
        ImageCodec::Png => ff::AVCodecID::AV_CODEC_ID_PNG,
        ImageCodec::Gif => ff::AVCodecID::AV_CODEC_ID_GIF,
        ImageCodec::Bmp => ff::AVCodecID::AV_CODEC_ID_BMP,
        ImageCodec::Tiff => ff::AVCodecID::AV_CODEC_ID_TIFF,
    }
}

fn layout_to_pix_fmt(layout: &PixelLayout) -> Result<ff::AVPixelFormat, BackendError> {
    match layout {
        PixelLayout::Yuv420p => Ok(ff::AVPixelFormat::AV_PIX_FMT_YUV420P),
        PixelLayout::Rgb24 => Ok(ff::AVPixelFormat::AV_PIX_FMT_RGB24),
        PixelLayout::Other(name) => {
            let c_name = c_string("av_get_pix_fmt", name)?;
            let format = unsafe { ff::av_get_pix_fmt(c_name.as_ptr()) };
            match format {
                ff::AVPixelFormat::AV_PIX_FMT_NONE => Err(BackendError::Unsupported(format!("pixel format {}", name))),
                format => Ok(format),
            }
        }
    }
}

fn range_to_av(range: ColorRange) -> ff::AVColorRange {
    match range {
        ColorRange::Unspecified => ff::AVColorRange::AVCOL_RANGE_UNSPECIFIED,
        ColorRange::Limited => ff::AVColorRange::AVCOL_RANGE_MPEG,
        ColorRange::Full => ff::AVColorRange::AVCOL_RANGE_JPEG,
    }
}

// ============================================================================
// Owned Handles
// ============================================================================

/// Open container (`AVFormatContext`)
pub struct FormatInput {
    ctx: *mut ff::AVFormatContext,
}

impl FormatInput {
    unsafe fn stream(&self, index: usize) -> Result<*mut ff::AVStream, BackendError> {
        if index >= (*self.ctx).nb_streams as usize {
            return Err(BackendError::call("stream", format!("no stream {}", index)));
        }
        Ok(*(*self.ctx).streams.add(index))
    }
}

impl Drop for FormatInput {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            unsafe { ff::avformat_close_input(&mut self.ctx) };
        }
    }
}

/// Option dictionary (`AVDictionary`)
struct Dictionary(*mut ff::AVDictionary);

impl Dictionary {
    fn from_options(options: &OptionDict) -> Result<Self, BackendError> {
        let mut dict = Dictionary(ptr::null_mut());
        for (key, value) in options.iter() {
            let key = c_string("av_dict_set", key)?;
            let value = c_string("av_dict_set", value)?;
            check("av_dict_set", unsafe { ff::av_dict_set(&mut dict.0, key.as_ptr(), value.as_ptr(), 0) })?;
        }
        Ok(dict)
    }
}

impl Drop for Dictionary {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { ff::av_dict_free(&mut self.0) };
        }
    }
}

/// Demuxed packet (`AVPacket`)
pub struct FfmpegPacket {
    ptr: *mut ff::AVPacket,
}

impl FfmpegPacket {
    fn alloc() -> Result<Self, BackendError> {
        let ptr = unsafe { ff::av_packet_alloc() };
        if ptr.is_null() {
            return Err(BackendError::call("av_packet_alloc", "out of memory"));
        }
        Ok(Self { ptr })
    }
}

impl Clone for FfmpegPacket {
    fn clone(&self) -> Self {
        let ptr = unsafe {
            match self.ptr.is_null() {
                true => ptr::null_mut(),
                false => ff::av_packet_clone(self.ptr),
            }
        };
        Self { ptr }
    }
}

impl PacketData for FfmpegPacket {
    fn stream_index(&self) -> usize {
        if self.ptr.is_null() {
            return usize::MAX;
        }
        unsafe { (*self.ptr).stream_index as usize }
    }

    fn data(&self) -> &[u8] {
        unsafe {
            if self.ptr.is_null() || (*self.ptr).data.is_null() || (*self.ptr).size <= 0 {
                return &[];
            }
            std::slice::from_raw_parts((*self.ptr).data, (*self.ptr).size as usize)
        }
    }
}

impl Drop for FfmpegPacket {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { ff::av_packet_free(&mut self.ptr) };
        }
    }
}

/// Codec context (`AVCodecContext`), used for decoders and the encoder
pub struct CodecContext {
    ctx: *mut ff::AVCodecContext,
}

impl CodecContext {
    fn alloc(codec: *const ff::AVCodec) -> Result<Self, BackendError> {
        let ctx = unsafe { ff::avcodec_alloc_context3(codec) };
        if ctx.is_null() {
            return Err(BackendError::call("avcodec_alloc_context3", "out of memory"));
        }
        Ok(Self { ctx })
    }
}

impl Drop for CodecContext {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            unsafe { ff::avcodec_free_context(&mut self.ctx) };
        }
    }
}

/// Decoded picture (`AVFrame`)
pub struct FfmpegFrame {
    ptr: *mut ff::AVFrame,
}

impl FfmpegFrame {
    fn alloc() -> Result<Self, BackendError> {
        let ptr = unsafe { ff::av_frame_alloc() };
        if ptr.is_null() {
            return Err(BackendError::call("av_frame_alloc", "out of memory"));
        }
        Ok(Self { ptr })
    }

    fn is_full_range(&self) -> bool {
        unsafe {
            (*self.ptr).color_range == ff::AVColorRange::AVCOL_RANGE_JPEG
                || (*self.ptr).format == ff::AVPixelFormat::AV_PIX_FMT_YUVJ420P as c_int
        }
    }
}

impl RasterFrame for FfmpegFrame {
    fn width(&self) -> i32 {
        unsafe { (*self.ptr).width }
    }

    fn height(&self) -> i32 {
        unsafe { (*self.ptr).height }
    }

    fn layout(&self) -> PixelLayout {
        let format = unsafe { (*self.ptr).format };
        if format == ff::AVPixelFormat::AV_PIX_FMT_YUV420P as c_int {
            PixelLayout::Yuv420p
        } else if format == ff::AVPixelFormat::AV_PIX_FMT_RGB24 as c_int {
            PixelLayout::Rgb24
        } else {
            PixelLayout::Other(pix_fmt_name(format).unwrap_or_else(|| format.to_string()))
        }
    }

    fn color_range(&self) -> ColorRange {
        match unsafe { (*self.ptr).color_range } {
            ff::AVColorRange::AVCOL_RANGE_MPEG => ColorRange::Limited,
            ff::AVColorRange::AVCOL_RANGE_JPEG => ColorRange::Full,
            _ => ColorRange::Unspecified,
        }
    }
}

impl Drop for FfmpegFrame {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { ff::av_frame_free(&mut self.ptr) };
        }
    }
}

/// Scaler (`SwsContext`)
struct Scaler(*mut ff::SwsContext);

impl Drop for Scaler {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { ff::sws_freeContext(self.0) };
        }
    }
}

// ============================================================================
// Descriptors
// ============================================================================

unsafe fn describe_stream(index: usize, st: *const ff::AVStream) -> StreamDescriptor {
    let st = &*st;
    let par = &*st.codecpar;

    let kind = match par.codec_type {
        ff::AVMediaType::AVMEDIA_TYPE_VIDEO => MediaKind::Video,
        ff::AVMediaType::AVMEDIA_TYPE_AUDIO => MediaKind::Audio,
        other => MediaKind::Other(cstr_opt(ff::av_get_media_type_string(other))),
    };

    let mut stream = StreamDescriptor::new(index, kind);
    stream.codec_id = par.codec_id as i32;
    stream.codec_name = cstr_opt(ff::avcodec_get_name(par.codec_id));
    let desc = ff::avcodec_descriptor_get(par.codec_id);
    if !desc.is_null() {
        stream.codec_long_name = cstr_opt((*desc).long_name);
    }
    stream.codec_tag = par.codec_tag;
    stream.bit_rate = par.bit_rate;
    stream.bits_per_sample = par.bits_per_raw_sample;
    stream.start_time = st.start_time;
    stream.r_frame_rate = rational(st.r_frame_rate);
    stream.avg_frame_rate = rational(st.avg_frame_rate);
    stream.time_base = rational(st.time_base);
    stream.duration = st.duration;
    stream.attached_pic = st.disposition & ff::AV_DISPOSITION_ATTACHED_PIC as c_int != 0;
    stream.tags = dict_to_map(st.metadata);

    stream.params = match par.codec_type {
        ff::AVMediaType::AVMEDIA_TYPE_VIDEO => StreamParams::Video(VideoParams {
            width: par.width,
            height: par.height,
            framerate: rational(par.framerate),
            sample_aspect_ratio: rational(st.sample_aspect_ratio),
            color_range: cstr_opt(ff::av_color_range_name(par.color_range)),
            color_space: cstr_opt(ff::av_color_space_name(par.color_space)),
            chroma_location: cstr_opt(ff::av_chroma_location_name(par.chroma_location)),
            pix_fmt: pix_fmt_name(par.format),
            level: par.level,
        }),
        ff::AVMediaType::AVMEDIA_TYPE_AUDIO => {
            let mut buf = [0 as c_char; 128];
            let written = ff::av_channel_layout_describe(&par.ch_layout, buf.as_mut_ptr(), buf.len());
            StreamParams::Audio(AudioParams {
                sample_rate: par.sample_rate,
                channels: par.ch_layout.nb_channels,
                channel_layout: if written > 0 { cstr_opt(buf.as_ptr()) } else { None },
                sample_fmt: sample_fmt_name(par.format),
                initial_padding: par.initial_padding,
                trailing_padding: par.trailing_padding,
            })
        }
        _ => StreamParams::None,
    };

    stream
}

// ============================================================================
// Backend
// ============================================================================

/// Codec library backed by the linked FFmpeg
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    _private: (),
}

impl FfmpegBackend {
    /// Backend handle; network protocols are initialized on first use.
    pub fn new() -> Self {
        NETWORK_INIT.call_once(|| {
            unsafe { ff::avformat_network_init() };
            debug!("FFmpeg network initialized");
        });
        Self { _private: () }
    }
}

impl MediaBackend for FfmpegBackend {
    type Input = FormatInput;
    type Packet = FfmpegPacket;
    type Decoder = CodecContext;
    type Frame = FfmpegFrame;

    fn open_input(&self, locator: &str, options: &OptionDict) -> Result<FormatInput, BackendError> {
        let url = c_string("avformat_open_input", locator)?;
        let mut dict = Dictionary::from_options(options)?;
        let mut input = FormatInput { ctx: ptr::null_mut() };

        let ret = unsafe { ff::avformat_open_input(&mut input.ctx, url.as_ptr(), ptr::null_mut(), &mut dict.0) };
        check("avformat_open_input", ret)?;

        let unused = unsafe { dict_to_map(dict.0) };
        if !unused.is_empty() {
            debug!("Options not consumed by {}: {:?}", locator, unused.keys().collect::<Vec<_>>());
        }
        Ok(input)
    }

    fn find_stream_info(&self, input: &mut FormatInput) -> Result<(), BackendError> {
        check("avformat_find_stream_info", unsafe {
            ff::avformat_find_stream_info(input.ctx, ptr::null_mut())
        })?;
        Ok(())
    }

    fn describe(&self, input: &FormatInput) -> FormatDescriptor {
        unsafe {
            let ctx = &*input.ctx;
            let format_name = if ctx.iformat.is_null() { None } else { cstr_opt((*ctx.iformat).name) };
            let size = if ctx.pb.is_null() { None } else { Some(ff::avio_size(ctx.pb)).filter(|s| *s >= 0) };

            let streams = (0..ctx.nb_streams as usize)
                .map(|i| describe_stream(i, *ctx.streams.add(i)))
                .collect();

            FormatDescriptor {
                format_name,
                nb_programs: ctx.nb_programs,
                nb_stream_groups: ctx.nb_stream_groups,
                start_time: ctx.start_time,
                duration_us: Some(ctx.duration).filter(|d| *d != AV_NOPTS_VALUE),
                size,
                bit_rate: ctx.bit_rate,
                probe_score: ctx.probe_score,
                tags: dict_to_map(ctx.metadata),
                streams,
            }
        }
    }

    fn attached_picture(&self, input: &FormatInput, stream: usize) -> Option<FfmpegPacket> {
        unsafe {
            let st = input.stream(stream).ok()?;
            if (*st).disposition & ff::AV_DISPOSITION_ATTACHED_PIC as c_int == 0 || (*st).attached_pic.size <= 0 {
                return None;
            }

            let packet = FfmpegPacket::alloc().ok()?;
            if ff::av_packet_ref(packet.ptr, &(*st).attached_pic) < 0 {
                return None;
            }
            (*packet.ptr).stream_index = stream as c_int;
            Some(packet)
        }
    }

    fn read_packet(&self, input: &mut FormatInput) -> Result<Option<FfmpegPacket>, BackendError> {
        let packet = FfmpegPacket::alloc()?;
        match unsafe { ff::av_read_frame(input.ctx, packet.ptr) } {
            ret if ret == ff::AVERROR_EOF => Ok(None),
            ret => check("av_read_frame", ret).map(|_| Some(packet)),
        }
    }

    fn open_decoder(
        &self,
        input: &FormatInput,
        stream: usize,
        choice: DecoderChoice,
    ) -> Result<CodecContext, BackendError> {
        unsafe {
            let par = (*input.stream(stream)?).codecpar;
            let codec_id = match choice {
                DecoderChoice::Declared => (*par).codec_id,
                DecoderChoice::Forced(codec) => codec_id_of(codec),
            };

            let codec = ff::avcodec_find_decoder(codec_id);
            if codec.is_null() {
                let name = cstr_opt(ff::avcodec_get_name(codec_id)).unwrap_or_default();
                return Err(BackendError::DecoderNotFound(name));
            }

            let decoder = CodecContext::alloc(codec)?;
            check("avcodec_parameters_to_context", ff::avcodec_parameters_to_context(decoder.ctx, par))?;
            if let DecoderChoice::Forced(_) = choice {
                (*decoder.ctx).codec_id = codec_id;
            }
            check("avcodec_open2", ff::avcodec_open2(decoder.ctx, codec, ptr::null_mut()))?;
            Ok(decoder)
        }
    }

    fn send_packet(&self, decoder: &mut CodecContext, packet: &FfmpegPacket) -> Result<(), BackendError> {
        check("avcodec_send_packet", unsafe { ff::avcodec_send_packet(decoder.ctx, packet.ptr) })?;
        Ok(())
    }

    fn send_eof(&self, decoder: &mut CodecContext) -> Result<(), BackendError> {
        match unsafe { ff::avcodec_send_packet(decoder.ctx, ptr::null()) } {
            ret if ret == ff::AVERROR_EOF => Ok(()),
            ret => check("avcodec_send_packet", ret).map(|_| ()),
        }
    }

    fn receive_frame(&self, decoder: &mut CodecContext) -> Result<Option<FfmpegFrame>, BackendError> {
        let frame = FfmpegFrame::alloc()?;
        match unsafe { ff::avcodec_receive_frame(decoder.ctx, frame.ptr) } {
            ret if ret == -EAGAIN || ret == ff::AVERROR_EOF => Ok(None),
            ret => check("avcodec_receive_frame", ret).map(|_| Some(frame)),
        }
    }

    fn rescale(&self, frame: &FfmpegFrame, target: &RasterSpec) -> Result<FfmpegFrame, BackendError> {
        let src_format = pix_fmt_from_raw(unsafe { (*frame.ptr).format })
            .ok_or_else(|| BackendError::call("sws_getContext", "source frame has no pixel format"))?;
        let dst_format = layout_to_pix_fmt(&target.layout)?;

        let dst = FfmpegFrame::alloc()?;
        unsafe {
            (*dst.ptr).width = target.width;
            (*dst.ptr).height = target.height;
            (*dst.ptr).format = dst_format as c_int;
            (*dst.ptr).color_range = range_to_av(target.range);
            check("av_frame_get_buffer", ff::av_frame_get_buffer(dst.ptr, 0))?;

            let scaler = Scaler(ff::sws_getContext(
                frame.width(),
                frame.height(),
                src_format,
                target.width,
                target.height,
                dst_format,
                SWS_BILINEAR,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
            ));
            if scaler.0.is_null() {
                return Err(BackendError::call(
                    "sws_getContext",
                    format!("{}x{} -> {}x{}", frame.width(), frame.height(), target.width, target.height),
                ));
            }

            let coefficients = ff::sws_getCoefficients(SWS_CS_DEFAULT);
            let dst_full = match target.range {
                ColorRange::Unspecified => frame.is_full_range(),
                range => range == ColorRange::Full,
            };
            ff::sws_setColorspaceDetails(
                scaler.0,
                coefficients,
                frame.is_full_range() as c_int,
                coefficients,
                dst_full as c_int,
                0,
                1 << 16,
                1 << 16,
            );

            check(
                "sws_scale",
                ff::sws_scale(
                    scaler.0,
                    (*frame.ptr).data.as_ptr() as *const *const u8,
                    (*frame.ptr).linesize.as_ptr(),
                    0,
                    frame.height(),
                    (*dst.ptr).data.as_ptr(),
                    (*dst.ptr).linesize.as_ptr(),
                ),
            )?;
        }
        Ok(dst)
    }

    fn encode_still(&self, frame: &FfmpegFrame, width: i32, height: i32, qscale: i32) -> Result<Vec<u8>, BackendError> {
        unsafe {
            let codec = ff::avcodec_find_encoder(ff::AVCodecID::AV_CODEC_ID_MJPEG);
            if codec.is_null() {
                return Err(BackendError::EncoderNotFound("mjpeg".to_string()));
            }

            let global_quality = qscale * ff::FF_QP2LAMBDA as c_int;
            let encoder = CodecContext::alloc(codec)?;
            {
                let ctx = &mut *encoder.ctx;
                ctx.width = width;
                ctx.height = height;
                ctx.pix_fmt = ff::AVPixelFormat::AV_PIX_FMT_YUV420P;
                ctx.color_range = ff::AVColorRange::AVCOL_RANGE_JPEG;
                ctx.time_base = ff::AVRational { num: 1, den: 25 };
                ctx.flags |= ff::AV_CODEC_FLAG_QSCALE as c_int;
                ctx.global_quality = global_quality;
                ctx.qmin = qscale;
                ctx.qmax = qscale;
            }
            check("avcodec_open2", ff::avcodec_open2(encoder.ctx, codec, ptr::null_mut()))?;

            (*frame.ptr).quality = global_quality;
            check("avcodec_send_frame", ff::avcodec_send_frame(encoder.ctx, frame.ptr))?;

            let packet = FfmpegPacket::alloc()?;
            check("avcodec_receive_packet", ff::avcodec_receive_packet(encoder.ctx, packet.ptr))?;
            Ok(packet.data().to_vec())
        }
    }

    fn codec_catalog(&self) -> Vec<CodecEntry> {
        let mut entries = Vec::new();
        let mut opaque: *mut c_void = ptr::null_mut();

        unsafe {
            loop {
                let codec = ff::av_codec_iterate(&mut opaque);
                if codec.is_null() {
                    break;
                }
                let media = match (*codec).type_ {
                    ff::AVMediaType::AVMEDIA_TYPE_VIDEO => CodecMedia::Video,
                    ff::AVMediaType::AVMEDIA_TYPE_AUDIO => CodecMedia::Audio,
                    _ => continue,
                };
                let role = if ff::av_codec_is_encoder(codec) != 0 {
                    CoderRole::Encoder
                } else {
                    CoderRole::Decoder
                };

                let mut hw = Vec::new();
                for i in 0.. {
                    let config = ff::avcodec_get_hw_config(codec, i);
                    if config.is_null() {
                        break;
                    }
                    if let Some(name) = cstr_opt(ff::av_hwdevice_get_type_name((*config).device_type)) {
                        hw.push(name);
                    }
                }

                entries.push(CodecEntry {
                    media,
                    role,
                    name: cstr_opt((*codec).name).unwrap_or_default(),
                    long_name: cstr_opt((*codec).long_name),
                    hw,
                });
            }
        }

        debug!("FFmpeg provides {} audio/video codecs", entries.len());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text() {
        assert!(!av_error(ff::AVERROR_EOF).is_empty());
    }

    #[test]
    fn test_open_missing_file() {
        let backend = FfmpegBackend::new();
        let err = backend.open_input("/nonexistent/media.mp3", &OptionDict::new()).err();
        assert!(matches!(err, Some(BackendError::Call { op: "avformat_open_input", .. })));
    }

    #[test]
    fn test_catalog_has_mjpeg_encoder() {
        let catalog = FfmpegBackend::new().codec_catalog();
        assert!(catalog
            .iter()
            .any(|e| e.name == "mjpeg" && e.role == CoderRole::Encoder && e.media == CodecMedia::Video));
    }

    #[test]
    fn test_image_codecs_have_decoders() {
        for codec in [ImageCodec::Mjpeg, ImageCodec::Png, ImageCodec::Gif, ImageCodec::Bmp, ImageCodec::Tiff] {
            assert!(!unsafe { ff::avcodec_find_decoder(codec_id_of(codec)) }.is_null());
        }
    }
}
