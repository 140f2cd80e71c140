//! Still image transcoding
//!
//! Normalizes decoded frames into the still profile (MJPEG, YUV 4:2:0, full
//! range), optionally downscales them, and writes the encoded bytes to disk.
//! Nothing here returns an error: failures become a `false`/`None` plus a
//! [`LogSink`] entry.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::backend::{ColorRange, MediaBackend, PixelLayout, RasterFrame, RasterSpec};
use crate::error::{MediaError, Result};
use crate::log_sink::LogSink;

/// Best quality scale
pub const BEST_QSCALE: i32 = 2;
/// Worst quality scale
pub const WORST_QSCALE: i32 = 31;
/// Encoder side used when a frame reports no usable size
pub const FALLBACK_SIDE: i32 = 96;

/// The canonical still image output profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StillProfile;

impl StillProfile {
    pub const CODEC: &'static str = "mjpeg";
    pub const LAYOUT: PixelLayout = PixelLayout::Yuv420p;
    pub const RANGE: ColorRange = ColorRange::Full;

    /// Raster spec for a frame of this profile
    pub fn spec(width: i32, height: i32) -> RasterSpec {
        RasterSpec {
            width,
            height,
            layout: Self::LAYOUT,
            range: Self::RANGE,
        }
    }

    /// Frame already matches the profile's pixel layout and color range
    pub fn accepts<F: RasterFrame>(frame: &F) -> bool {
        frame.layout() == Self::LAYOUT && frame.color_range() == Self::RANGE
    }
}

/// Map a 0-100 quality percentage onto the 2 (best) .. 31 (worst) scale.
pub fn quality_to_scale(quality: i32) -> i32 {
    let quality = quality.clamp(0, 100);
    (BEST_QSCALE as f64 + (100 - quality) as f64 * 29.0 / 100.0 + 0.5) as i32
}

/// Inverse of [`quality_to_scale`], for encoders that take a 1-100 quality.
pub fn scale_to_quality(scale: i32) -> u8 {
    let scale = scale.clamp(BEST_QSCALE, WORST_QSCALE);
    let quality = 100.0 - (scale - BEST_QSCALE) as f64 * 100.0 / 29.0;
    quality.round().clamp(1.0, 100.0) as u8
}

/// Encoder dimensions for a frame, with optional clipping overrides.
///
/// A non-positive clip value keeps the frame's own size. A non-positive max side
/// falls back to [`FALLBACK_SIDE`]; a remaining non-positive side takes the
/// max side. Every correction is logged.
pub fn encoder_dimensions(
    frame_width: i32,
    frame_height: i32,
    clip_width: i32,
    clip_height: i32,
    log: &mut LogSink,
) -> (i32, i32) {
    let mut width = if clip_width > 0 { clip_width } else { frame_width };
    let mut height = if clip_height > 0 { clip_height } else { frame_height };

    let mut max_side = width.max(height);
    if max_side <= 0 {
        log.push(format!(
            "Invalid frame size {}x{}, encoding at {}px",
            width, height, FALLBACK_SIDE
        ));
        max_side = FALLBACK_SIDE;
    }
    if width <= 0 {
        log.push(format!("Invalid frame width {}, using {}", width, max_side));
        width = max_side;
    }
    if height <= 0 {
        log.push(format!("Invalid frame height {}, using {}", height, max_side));
        height = max_side;
    }

    (width, height)
}

/// Encode `frame` in the still profile and write it to `path`.
///
/// The file is closed before this returns. Returns `false` (with a log
/// entry) if encoding or writing failed.
pub fn encode_frame<B: MediaBackend>(
    backend: &B,
    frame: &B::Frame,
    path: &Path,
    clip_width: i32,
    clip_height: i32,
    qscale: i32,
    log: &mut LogSink,
) -> bool {
    let (width, height) = encoder_dimensions(frame.width(), frame.height(), clip_width, clip_height, log);
    debug!("Encoding {}x{} q{} -> {}", width, height, qscale, path.display());

    let result = backend
        .encode_still(frame, width, height, qscale)
        .map_err(|e| MediaError::EncodeFailure(format!("{}: {}", path.display(), e)))
        .and_then(|bytes| write_file(path, &bytes));

    match result {
        Ok(()) => true,
        Err(err) => {
            log.record(&err);
            false
        }
    }
}

/// Encode `frame` downscaled so its shorter side is `target_min_side`.
///
/// Frames already at or below the target are encoded unchanged, and so is
/// every frame when the target itself is not positive (with a log entry).
pub fn encode_frame_scaled<B: MediaBackend>(
    backend: &B,
    frame: &B::Frame,
    path: &Path,
    target_min_side: i32,
    qscale: i32,
    log: &mut LogSink,
) -> bool {
    let (width, height) = (frame.width(), frame.height());

    if target_min_side <= 0 {
        log.push(format!("Invalid thumbnail side {}, not scaling", target_min_side));
        return encode_frame(backend, frame, path, -1, -1, qscale, log);
    }

    let mut min_side = width.min(height);
    if min_side <= 0 {
        log.push(format!("Invalid frame size {}x{}, not scaling", width, height));
        min_side = -1;
    }

    let factor = target_min_side as f64 / min_side as f64;
    if factor <= 0.0 || factor >= 1.0 {
        return encode_frame(backend, frame, path, -1, -1, qscale, log);
    }

    let target_width = (width as f64 * factor) as i32;
    let target_height = (height as f64 * factor) as i32;
    if target_width <= 0 || target_height <= 0 {
        log.push(format!(
            "Invalid scaled size {}x{} (factor {:.4})",
            target_width, target_height, factor
        ));
        return false;
    }

    debug!("Scaling {}x{} -> {}x{}", width, height, target_width, target_height);
    match backend.rescale(frame, &StillProfile::spec(target_width, target_height)) {
        Ok(scaled) => encode_frame(backend, &scaled, path, -1, -1, qscale, log),
        Err(e) => {
            log.record(&MediaError::ConvertFailure(e.to_string()));
            false
        }
    }
}

/// Same-size conversion into `layout` / `range`.
pub fn convert_pixel_format<B: MediaBackend>(
    backend: &B,
    frame: &B::Frame,
    layout: PixelLayout,
    range: ColorRange,
    log: &mut LogSink,
) -> Option<B::Frame> {
    let spec = RasterSpec {
        width: frame.width(),
        height: frame.height(),
        layout,
        range,
    };
    debug!("Converting {:?} -> {:?}", frame.layout(), spec.layout);

    match backend.rescale(frame, &spec) {
        Ok(converted) => Some(converted),
        Err(e) => {
            log.record(&MediaError::ConvertFailure(e.to_string()));
            None
        }
    }
}

/// Write `bytes` to `path`; the file is closed when this returns.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let annotate = |e: std::io::Error| {
        MediaError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
    };

    let mut file = File::create(path).map_err(annotate)?;
    file.write_all(bytes).map_err(annotate)?;
    file.flush().map_err(annotate)?;
    Ok(())
}
