//! media_probe - container probing, cover thumbnails and color palettes
//!
//! Opens an audio/video resource (local path or URL), describes its
//! container and streams as JSON, extracts a representative picture (an
//! embedded cover or the first decodable video frame) into a full size JPEG
//! and an optional thumbnail, and derives a dominant color palette from
//! still images.
//!
//! Codec work is delegated to a [`MediaBackend`]:
//! - [`FfmpegBackend`] (feature `ffmpeg`) links libavformat / libavcodec /
//!   libswscale through `ffmpeg-sys-next`.
//! - [`StillImageBackend`] handles still image files with the pure Rust
//!   `image` / `fast_image_resize` stack.
//!
//! Failures never cross the entry points as errors: each call returns a
//! degraded result plus an optional diagnostic log.

pub mod error;
pub mod log_sink;
pub mod signature;
pub mod descriptor;
pub mod backend;
pub mod probe;
pub mod metadata;
pub mod transcode;
pub mod cover;
pub mod palette;
pub mod pipeline;
pub mod image;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod ffi;

#[cfg(test)]
mod testing;

pub use error::{BackendError, MediaError, Result};
pub use log_sink::LogSink;
pub use backend::{MediaBackend, OptionDict};
pub use descriptor::{FormatDescriptor, StreamDescriptor};
pub use probe::{OpenOptions, ProbeSession};
pub use cover::{PictureConfig, PictureTier};
pub use palette::{Color, PaletteResult};
pub use pipeline::{
    analyze_picture_color_from_data, analyze_picture_color_from_path, available_codecs, get_media_info,
    get_media_picture, MediaInfoOutcome, MediaProbe, PaletteOutcome, PictureOutcome, ProbeConfig,
};
pub use crate::image::StillImageBackend;
#[cfg(feature = "ffmpeg")]
pub use crate::ffmpeg::FfmpegBackend;
