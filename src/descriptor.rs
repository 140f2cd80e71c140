//! Container and stream descriptors
//!
//! Backend-neutral snapshot of what a probe found. Backends fill these in;
//! the metadata serializer and the cover extractor only ever read them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Rational number (timebases, frame rates, aspect ratios)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Both terms non-zero
    pub fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Media kind of an elementary stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
    /// Any other kind, carrying the backend's type name (e.g. "subtitle")
    Other(Option<String>),
}

impl MediaKind {
    pub fn type_name(&self) -> Option<&str> {
        match self {
            MediaKind::Video => Some("video"),
            MediaKind::Audio => Some("audio"),
            MediaKind::Other(name) => name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    pub width: i32,
    pub height: i32,
    pub framerate: Rational,
    pub sample_aspect_ratio: Rational,
    pub color_range: Option<String>,
    pub color_space: Option<String>,
    pub chroma_location: Option<String>,
    pub pix_fmt: Option<String>,
    pub level: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioParams {
    pub sample_rate: i32,
    pub channels: i32,
    pub channel_layout: Option<String>,
    pub sample_fmt: Option<String>,
    pub initial_padding: i32,
    pub trailing_padding: i32,
}

/// Kind-specific stream parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamParams {
    Video(VideoParams),
    Audio(AudioParams),
    None,
}

/// One elementary stream inside a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: MediaKind,
    pub codec_id: i32,
    pub codec_name: Option<String>,
    pub codec_long_name: Option<String>,
    pub codec_tag: u32,
    pub bit_rate: i64,
    pub bits_per_sample: i32,
    pub start_time: i64,
    pub r_frame_rate: Rational,
    pub avg_frame_rate: Rational,
    pub time_base: Rational,
    /// Raw duration in `time_base` units, negative (`i64::MIN`) when unknown
    pub duration: i64,
    /// Stream carries a single embedded still image
    pub attached_pic: bool,
    pub tags: BTreeMap<String, String>,
    pub params: StreamParams,
}

impl StreamDescriptor {
    /// Bare descriptor; backends fill in what they know.
    pub fn new(index: usize, kind: MediaKind) -> Self {
        let params = match kind {
            MediaKind::Video => StreamParams::Video(VideoParams::default()),
            MediaKind::Audio => StreamParams::Audio(AudioParams::default()),
            MediaKind::Other(_) => StreamParams::None,
        };

        Self {
            index,
            kind,
            codec_id: 0,
            codec_name: None,
            codec_long_name: None,
            codec_tag: 0,
            bit_rate: 0,
            bits_per_sample: 0,
            start_time: 0,
            r_frame_rate: Rational::default(),
            avg_frame_rate: Rational::default(),
            time_base: Rational::default(),
            duration: 0,
            attached_pic: false,
            tags: BTreeMap::new(),
            params,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// Duration in seconds, `None` when unknown or the timebase is unusable
    pub fn duration_seconds(&self) -> Option<f64> {
        if self.duration >= 0 && self.time_base.is_valid() {
            Some(self.duration as f64 * self.time_base.to_f64())
        } else {
            None
        }
    }

    pub fn video(&self) -> Option<&VideoParams> {
        match &self.params {
            StreamParams::Video(v) => Some(v),
            _ => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioParams> {
        match &self.params {
            StreamParams::Audio(a) => Some(a),
            _ => None,
        }
    }
}

/// Container level description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_name: Option<String>,
    pub nb_programs: u32,
    pub nb_stream_groups: u32,
    pub start_time: i64,
    /// Microseconds, `None` when unknown
    pub duration_us: Option<i64>,
    /// Byte size, `None` when the underlying I/O is not sized
    pub size: Option<i64>,
    pub bit_rate: i64,
    pub probe_score: i32,
    pub tags: BTreeMap<String, String>,
    pub streams: Vec<StreamDescriptor>,
}

impl FormatDescriptor {
    pub fn nb_streams(&self) -> usize {
        self.streams.len()
    }

    /// Duration in seconds, `0.0` when unknown
    pub fn duration_seconds(&self) -> f64 {
        self.duration_us.map(|us| us as f64 / 1_000_000.0).unwrap_or(0.0)
    }

    /// First video stream in container order
    pub fn first_video_stream(&self) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.is_video())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational() {
        assert!(Rational::new(1, 25).is_valid());
        assert!(!Rational::new(0, 25).is_valid());
        assert!(!Rational::new(25, 0).is_valid());
        assert_eq!(Rational::new(0, 0).to_f64(), 0.0);
        assert_eq!(Rational::new(30000, 1001).to_string(), "30000/1001");
    }

    #[test]
    fn test_stream_duration() {
        let mut stream = StreamDescriptor::new(0, MediaKind::Audio);
        stream.duration = 441_000;
        assert_eq!(stream.duration_seconds(), None);

        stream.time_base = Rational::new(1, 44_100);
        assert_eq!(stream.duration_seconds(), Some(10.0));

        stream.duration = i64::MIN;
        assert_eq!(stream.duration_seconds(), None);
    }

    #[test]
    fn test_params_follow_kind() {
        assert!(StreamDescriptor::new(0, MediaKind::Video).video().is_some());
        assert!(StreamDescriptor::new(0, MediaKind::Audio).audio().is_some());
        let other = StreamDescriptor::new(0, MediaKind::Other(Some("data".into())));
        assert_eq!(other.params, StreamParams::None);
        assert_eq!(other.kind.type_name(), Some("data"));
    }

    #[test]
    fn test_first_video_stream() {
        let format = FormatDescriptor {
            streams: vec![
                StreamDescriptor::new(0, MediaKind::Audio),
                StreamDescriptor::new(1, MediaKind::Video),
                StreamDescriptor::new(2, MediaKind::Video),
            ],
            ..Default::default()
        };
        assert_eq!(format.first_video_stream().map(|s| s.index), Some(1));
        assert_eq!(format.duration_seconds(), 0.0);
    }
}
