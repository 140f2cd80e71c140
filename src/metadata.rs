//! Container Metadata Serialization
//!
//! Turns a probed container into the JSON document handed back by
//! [`get_media_info`](crate::get_media_info):
//!
//! ```json
//! {
//!   "format":  { "filename": "...", "format_name": "mp3", "nb_streams": 2, ... },
//!   "streams": [ { "index": 0, "codec_id": 86017, "codec_name": "mp3", ... }, ... ]
//! }
//! ```
//!
//! Key order is stable (the crate builds `serde_json` with `preserve_order`)
//! and consumers may rely on it. String fields whose value the backend could
//! not name are left out rather than emitted as `null`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use media_probe::{metadata, LogSink, OpenOptions, ProbeSession, StillImageBackend};
//!
//! let backend = StillImageBackend::new();
//! let mut log = LogSink::new();
//! let session = ProbeSession::open_with(&backend, "cover.png", OpenOptions::default(), &mut log)?;
//! println!("{}", metadata::to_json_string(&session, &mut log));
//! ```

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::backend::MediaBackend;
use crate::descriptor::{AudioParams, FormatDescriptor, MediaKind, Rational, StreamDescriptor, VideoParams};
use crate::log_sink::LogSink;
use crate::probe::ProbeSession;

// ============================================================================
// Entry Points
// ============================================================================

/// Serialize the session's container, `{}` plus a log entry when nothing is open.
pub fn to_json<B: MediaBackend>(session: &ProbeSession<'_, B>, log: &mut LogSink) -> Value {
    match session.describe() {
        Some(format) => format_to_json(session.locator(), &format),
        None => {
            log.push(format!("No open container to describe: {}", session.locator()));
            Value::Object(Map::new())
        }
    }
}

/// [`to_json`] rendered as compact text.
pub fn to_json_string<B: MediaBackend>(session: &ProbeSession<'_, B>, log: &mut LogSink) -> String {
    to_json(session, log).to_string()
}

/// Serialize an already captured descriptor.
pub fn format_to_json(filename: &str, format: &FormatDescriptor) -> Value {
    debug!("Serializing {} ({} streams)", filename, format.nb_streams());

    let mut root = Map::new();
    root.insert("format".to_string(), format_section(filename, format));
    root.insert(
        "streams".to_string(),
        Value::Array(format.streams.iter().map(stream_section).collect()),
    );
    Value::Object(root)
}

// ============================================================================
// Format Section
// ============================================================================

fn format_section(filename: &str, format: &FormatDescriptor) -> Value {
    let mut obj = Map::new();
    obj.insert("filename".into(), filename.into());
    put_opt_str(&mut obj, "format_name", format.format_name.as_deref());
    obj.insert("nb_streams".into(), format.nb_streams().into());
    obj.insert("nb_programs".into(), format.nb_programs.into());
    obj.insert("nb_stream_groups".into(), format.nb_stream_groups.into());
    obj.insert("start_time".into(), format.start_time.into());
    obj.insert("duration".into(), format.duration_seconds().into());
    if let Some(size) = format.size {
        obj.insert("size".into(), size.into());
    }
    obj.insert("bit_rate".into(), format.bit_rate.into());
    obj.insert("probe_score".into(), format.probe_score.into());
    obj.insert("tags".into(), tags_object(&format.tags));
    Value::Object(obj)
}

// ============================================================================
// Stream Sections
// ============================================================================

fn stream_section(stream: &StreamDescriptor) -> Value {
    let mut obj = Map::new();
    obj.insert("index".into(), stream.index.into());
    obj.insert("codec_id".into(), stream.codec_id.into());
    put_opt_str(&mut obj, "codec_name", stream.codec_name.as_deref());
    put_opt_str(&mut obj, "codec_long_name", stream.codec_long_name.as_deref());
    put_opt_str(&mut obj, "codec_type", stream.kind.type_name());
    obj.insert("codec_tag".into(), stream.codec_tag.into());
    obj.insert("bit_rate".into(), stream.bit_rate.into());
    obj.insert("bits_per_sample".into(), stream.bits_per_sample.into());
    obj.insert("start_time".into(), stream.start_time.into());
    put_rational(&mut obj, "r_frame_rate", stream.r_frame_rate);
    put_rational(&mut obj, "avg_frame_rate", stream.avg_frame_rate);
    put_rational(&mut obj, "time_base", stream.time_base);
    if let Some(seconds) = stream.duration_seconds() {
        obj.insert("duration".into(), seconds.into());
    }
    obj.insert("tags".into(), tags_object(&stream.tags));

    match (&stream.kind, stream.video(), stream.audio()) {
        (MediaKind::Video, Some(video), _) => video_fields(&mut obj, stream, video),
        (MediaKind::Audio, _, Some(audio)) => audio_fields(&mut obj, audio),
        _ => {}
    }

    Value::Object(obj)
}

fn video_fields(obj: &mut Map<String, Value>, stream: &StreamDescriptor, video: &VideoParams) {
    obj.insert("width".into(), video.width.into());
    obj.insert("height".into(), video.height.into());
    put_rational(obj, "framerate", video.framerate);
    put_rational(obj, "sample_aspect_ratio", video.sample_aspect_ratio);
    put_opt_str(obj, "color_range", video.color_range.as_deref());
    put_opt_str(obj, "color_space", video.color_space.as_deref());
    put_opt_str(obj, "chroma_location", video.chroma_location.as_deref());
    put_opt_str(obj, "pix_fmt", video.pix_fmt.as_deref());
    put_opt_str(obj, "format", video.pix_fmt.as_deref());
    if stream.avg_frame_rate.is_valid() {
        obj.insert("fps".into(), stream.avg_frame_rate.to_f64().into());
    }
    obj.insert("level".into(), video.level.into());
}

fn audio_fields(obj: &mut Map<String, Value>, audio: &AudioParams) {
    obj.insert("sample_rate".into(), audio.sample_rate.into());
    obj.insert("channels".into(), audio.channels.into());
    put_opt_str(obj, "channel_layout", audio.channel_layout.as_deref());
    put_opt_str(obj, "sample_fmt", audio.sample_fmt.as_deref());
    put_opt_str(obj, "format", audio.sample_fmt.as_deref());
    obj.insert("initial_padding".into(), audio.initial_padding.into());
    obj.insert("trailing_padding".into(), audio.trailing_padding.into());
}

// ============================================================================
// Helpers
// ============================================================================

fn put_opt_str(obj: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        obj.insert(key.to_string(), value.into());
    }
}

/// "num/den", omitted for a zero denominator
fn put_rational(obj: &mut Map<String, Value>, key: &str, value: Rational) {
    if value.den != 0 {
        obj.insert(key.to_string(), value.to_string().into());
    }
}

fn tags_object(tags: &BTreeMap<String, String>) -> Value {
    Value::Object(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

// ============================================================================
// Tests
// ============================================================================
