//! Dominant color analysis
//!
//! Exact-color histogram over a decoded still image. No quantization is
//! applied, so photographs produce long tails of single-pixel colors; the
//! palette is still well defined because ordering is total (count, then
//! packed RGB).

use image::{ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;
use tracing::debug;

use crate::error::MediaError;
use crate::log_sink::LogSink;
use crate::signature;

/// Colors strictly brighter than this are "light"
pub const LIGHT_THRESHOLD: f64 = 180.0;
/// Colors strictly darker than this are "dark"
pub const DARK_THRESHOLD: f64 = 80.0;
/// Slots per palette bucket
pub const PALETTE_SLOTS: usize = 4;

/// One histogram entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Pixels of exactly this color
    pub count: u64,
    pub brightness: f64,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, count: u64) -> Self {
        Self { r, g, b, count, brightness: brightness(r, g, b) }
    }

    /// Packed `0xRRGGBB`
    pub fn rgb(&self) -> u32 {
        pack(self.r, self.g, self.b)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "rgb": self.rgb(),
            "count": self.count,
            "brightness": self.brightness,
        })
    }
}

/// Perceived brightness (ITU-R BT.601 luma weights)
pub fn brightness(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

fn pack(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Palette derived from a color histogram.
///
/// Buckets are filled by independent scans over the sorted histogram, so a
/// color can appear in `dominant_colors` and in one of the light/dark
/// buckets at the same time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteResult {
    pub main_color: Color,
    pub light_colors: [Option<Color>; PALETTE_SLOTS],
    pub dark_colors: [Option<Color>; PALETTE_SLOTS],
    pub dominant_colors: [Option<Color>; PALETTE_SLOTS],
}

impl PaletteResult {
    /// Classify an RGB raster; `None` when it has no pixels.
    pub fn from_rgb(image: &RgbImage) -> Option<Self> {
        Self::from_colors(histogram(image.as_raw()))
    }

    /// Classify histogram entries in any order; `None` when empty.
    pub fn from_colors(mut colors: Vec<Color>) -> Option<Self> {
        colors.sort_by(|a, b| b.count.cmp(&a.count).then(a.rgb().cmp(&b.rgb())));
        let main_color = *colors.first()?;

        let take = |filter: &dyn Fn(&Color) -> bool| {
            let mut slots = [None; PALETTE_SLOTS];
            for (slot, color) in slots.iter_mut().zip(colors.iter().filter(|c| filter(c))) {
                *slot = Some(*color);
            }
            slots
        };

        Some(Self {
            main_color,
            light_colors: take(&|c: &Color| c.brightness > LIGHT_THRESHOLD),
            dark_colors: take(&|c: &Color| c.brightness < DARK_THRESHOLD),
            dominant_colors: take(&|_: &Color| true),
        })
    }

    /// `{mainColor, lightColors, darkColors, dominantColors}`, unfilled
    /// slots as `null`.
    pub fn to_json(&self) -> Value {
        let bucket = |slots: &[Option<Color>; PALETTE_SLOTS]| {
            Value::Array(
                slots
                    .iter()
                    .map(|slot| slot.as_ref().map(Color::to_json).unwrap_or(Value::Null))
                    .collect(),
            )
        };

        json!({
            "mainColor": self.main_color.to_json(),
            "lightColors": bucket(&self.light_colors),
            "darkColors": bucket(&self.dark_colors),
            "dominantColors": bucket(&self.dominant_colors),
        })
    }
}

/// Count exact colors of packed RGB8 pixels.
pub fn histogram(pixels: &[u8]) -> Vec<Color> {
    let mut counts: HashMap<u32, u64> = HashMap::new();
    for px in pixels.chunks_exact(3) {
        *counts.entry(pack(px[0], px[1], px[2])).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(key, count)| Color::new((key >> 16) as u8, (key >> 8) as u8, key as u8, count))
        .collect()
}

/// Decode an image from `reader` (format guessed from content) and classify it.
pub fn analyze_reader<R: BufRead + Seek>(reader: R, log: &mut LogSink) -> Option<PaletteResult> {
    let reader = match ImageReader::new(reader).with_guessed_format() {
        Ok(reader) => reader,
        Err(e) => {
            log.record(&MediaError::Io(e));
            return None;
        }
    };

    let Some(format) = reader.format() else {
        log.record(&MediaError::DecodeFailure("unrecognized image format".to_string()));
        return None;
    };
    debug!("Palette input format: {:?}", format);

    let image = match reader.decode() {
        Ok(image) => image.to_rgb8(),
        Err(e) => {
            log.record(&MediaError::DecodeFailure(format!("{:?}: {}", format, e)));
            return None;
        }
    };

    let (width, height) = image.dimensions();
    let result = PaletteResult::from_rgb(&image);
    match &result {
        Some(palette) => debug!(
            "Palette of {}x{}: main #{:06x} ({} px)",
            width,
            height,
            palette.main_color.rgb(),
            palette.main_color.count
        ),
        None => log.push(format!("Image has no pixels ({}x{})", width, height)),
    }
    result
}

/// Classify the image stored at `path`.
pub fn analyze_path(path: &Path, log: &mut LogSink) -> Option<PaletteResult> {
    if path.as_os_str().is_empty() {
        log.record(&MediaError::MissingInput("picture path is empty".to_string()));
        return None;
    }

    match File::open(path) {
        Ok(file) => analyze_reader(BufReader::new(file), log),
        Err(e) => {
            log.push(format!("Cannot open {}: {}", path.display(), e));
            None
        }
    }
}

/// Classify an in-memory encoded image.
pub fn analyze_bytes(data: &[u8], log: &mut LogSink) -> Option<PaletteResult> {
    if data.is_empty() {
        log.record(&MediaError::MissingInput("picture data is empty".to_string()));
        return None;
    }

    let result = analyze_reader(Cursor::new(data), log);
    if result.is_none() {
        log.push(format!("Picture data: {}", signature::describe(data)));
    }
    result
}
