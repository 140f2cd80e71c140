//! Public entry points
//!
//! Each call owns its own probe session, decoders and [`LogSink`]; nothing
//! is shared between calls. The log comes back next to the result as
//! `Option<String>`, `None` meaning nothing went wrong.

use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::backend::MediaBackend;
use crate::cover::{extract_picture, PictureConfig, PictureTier};
use crate::log_sink::LogSink;
use crate::metadata;
use crate::palette::{self, PaletteResult};
use crate::probe::{OpenOptions, ProbeSession};

/// Result of [`get_media_info`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfoOutcome {
    /// `-1` when the resource could not be opened, otherwise the picture tier
    pub status: i32,
    pub json: Option<String>,
    pub log: Option<String>,
}

/// Result of [`get_media_picture`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PictureOutcome {
    pub tier: PictureTier,
    pub log: Option<String>,
}

/// Result of the palette entry points
#[derive(Debug, Clone, PartialEq)]
pub struct PaletteOutcome {
    pub palette: Option<PaletteResult>,
    pub log: Option<String>,
}

impl PaletteOutcome {
    /// Palette JSON text, `None` when analysis failed
    pub fn json(&self) -> Option<String> {
        self.palette.as_ref().map(|p| p.to_json().to_string())
    }
}

/// Pipeline settings shared by the entry points
#[derive(Debug, Clone, Default)]
pub struct ProbeConfig {
    pub open: OpenOptions,
    pub picture: PictureConfig,
}

/// Entry points bound to one backend and configuration.
pub struct MediaProbe<'b, B: MediaBackend> {
    backend: &'b B,
    config: ProbeConfig,
}

impl<'b, B: MediaBackend> MediaProbe<'b, B> {
    pub fn new(backend: &'b B, config: ProbeConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    fn open_options(&self, headers: &str) -> OpenOptions {
        OpenOptions {
            headers: if headers.is_empty() { None } else { Some(headers.to_string()) },
            ..self.config.open.clone()
        }
    }

    /// Probe `locator`, serialize its structure and, when `picture` is
    /// non-empty, extract the cover picture as well.
    pub fn media_info(&self, locator: &str, headers: &str, picture: &str, thumbnail: &str) -> MediaInfoOutcome {
        let mut log = LogSink::new();
        let mut session = ProbeSession::new(self.backend, locator, self.open_options(headers));

        if session.open(&mut log).is_err() {
            session.dispose();
            return MediaInfoOutcome { status: -1, json: None, log: log.into_option() };
        }

        let json = metadata::to_json_string(&session, &mut log);
        let status = if picture.is_empty() {
            PictureTier::None
        } else {
            extract_picture(&mut session, Path::new(picture), thumbnail_path(thumbnail), &self.config.picture, &mut log)
        };
        session.dispose();

        info!("Media info {}: tier {}", locator, status.code());
        MediaInfoOutcome { status: status.code(), json: Some(json), log: log.into_option() }
    }

    /// Extract only the cover picture of `locator`.
    pub fn media_picture(&self, locator: &str, headers: &str, picture: &str, thumbnail: &str) -> PictureOutcome {
        let mut log = LogSink::new();
        if picture.is_empty() {
            debug!("No picture path for {}", locator);
            return PictureOutcome { tier: PictureTier::None, log: log.into_option() };
        }

        let mut session = ProbeSession::new(self.backend, locator, self.open_options(headers));
        let tier = match session.open(&mut log) {
            Ok(()) => extract_picture(&mut session, Path::new(picture), thumbnail_path(thumbnail), &self.config.picture, &mut log),
            Err(_) => PictureTier::None,
        };
        session.dispose();

        info!("Media picture {}: tier {}", locator, tier.code());
        PictureOutcome { tier, log: log.into_option() }
    }

    /// Codec catalog of the backend as JSON.
    pub fn codecs(&self) -> Value {
        available_codecs(self.backend)
    }
}

fn thumbnail_path(thumbnail: &str) -> Option<&Path> {
    if thumbnail.is_empty() {
        None
    } else {
        Some(Path::new(thumbnail))
    }
}

/// [`MediaProbe::media_info`] with default settings.
pub fn get_media_info<B: MediaBackend>(
    backend: &B,
    locator: &str,
    headers: &str,
    picture: &str,
    thumbnail: &str,
) -> MediaInfoOutcome {
    MediaProbe::new(backend, ProbeConfig::default()).media_info(locator, headers, picture, thumbnail)
}

/// [`MediaProbe::media_picture`] with default settings.
pub fn get_media_picture<B: MediaBackend>(
    backend: &B,
    locator: &str,
    headers: &str,
    picture: &str,
    thumbnail: &str,
) -> PictureOutcome {
    MediaProbe::new(backend, ProbeConfig::default()).media_picture(locator, headers, picture, thumbnail)
}

/// Audio and video codecs of the backend:
/// `[{type, coder_type, name, long_name?, hw: [..]}, ..]`.
pub fn available_codecs<B: MediaBackend>(backend: &B) -> Value {
    let entries: Vec<Value> = backend
        .codec_catalog()
        .into_iter()
        .map(|entry| {
            let mut obj = json!({
                "type": entry.media as i32,
                "coder_type": entry.role as i32,
                "name": entry.name,
            });
            if let Some(long_name) = entry.long_name {
                obj["long_name"] = Value::String(long_name);
            }
            obj["hw"] = json!(entry.hw);
            obj
        })
        .collect();

    debug!("Codec catalog: {} entries", entries.len());
    Value::Array(entries)
}

/// Palette of the image stored at `path`.
pub fn analyze_picture_color_from_path(path: &Path) -> PaletteOutcome {
    let mut log = LogSink::new();
    let palette = palette::analyze_path(path, &mut log);
    PaletteOutcome { palette, log: log.into_option() }
}

/// Palette of an encoded image held in memory.
pub fn analyze_picture_color_from_data(data: &[u8]) -> PaletteOutcome {
    let mut log = LogSink::new();
    let palette = palette::analyze_bytes(data, &mut log);
    PaletteOutcome { palette, log: log.into_option() }
}
