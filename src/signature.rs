//! Image signature detection
//!
//! Containers regularly declare the wrong codec for embedded pictures (a PNG
//! cover tagged as MJPEG, a JPEG written into a `.png`). When the declared
//! decoder fails, the first packet's leading bytes are matched against a
//! fixed table to find the real encoding.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum packet size before any signature is trusted.
pub const MIN_SIGNATURE_LEN: usize = 8;

/// Still image codecs the signature table can re-identify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageCodec {
    Mjpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
}

impl ImageCodec {
    /// Short codec name, as a demuxer would report it
    pub fn name(&self) -> &'static str {
        match self {
            ImageCodec::Mjpeg => "mjpeg",
            ImageCodec::Png => "png",
            ImageCodec::Gif => "gif",
            ImageCodec::Bmp => "bmp",
            ImageCodec::Tiff => "tiff",
        }
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            ImageCodec::Mjpeg => "Motion JPEG",
            ImageCodec::Png => "PNG (Portable Network Graphics) image",
            ImageCodec::Gif => "CompuServe GIF (Graphics Interchange Format)",
            ImageCodec::Bmp => "BMP (Windows and OS/2 bitmap)",
            ImageCodec::Tiff => "TIFF image",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mjpeg" | "jpeg" | "jpg" => Some(ImageCodec::Mjpeg),
            "png" => Some(ImageCodec::Png),
            "gif" => Some(ImageCodec::Gif),
            "bmp" => Some(ImageCodec::Bmp),
            "tiff" | "tif" => Some(ImageCodec::Tiff),
            _ => None,
        }
    }
}

/// One row of the signature table.
#[derive(Debug, Clone, Copy)]
pub struct SignatureEntry {
    pub prefix: &'static [u8],
    pub codec: ImageCodec,
    pub label: &'static str,
}

impl SignatureEntry {
    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        data.starts_with(self.prefix)
    }
}

/// Evaluated in order, first match wins.
pub const SIGNATURES: &[SignatureEntry] = &[
    SignatureEntry { prefix: b"\xFF\xD8\xFF", codec: ImageCodec::Mjpeg, label: "JPEG" },
    SignatureEntry { prefix: b"\x89PNG\r\n\x1A\n", codec: ImageCodec::Png, label: "PNG" },
    SignatureEntry { prefix: b"GIF8", codec: ImageCodec::Gif, label: "GIF" },
    SignatureEntry { prefix: b"BM", codec: ImageCodec::Bmp, label: "BMP" },
    SignatureEntry { prefix: b"II*\x00", codec: ImageCodec::Tiff, label: "TIFF (little endian)" },
    SignatureEntry { prefix: b"MM\x00*", codec: ImageCodec::Tiff, label: "TIFF (big endian)" },
];

/// Find the table entry matching `data`, if any.
///
/// Buffers shorter than [`MIN_SIGNATURE_LEN`] never match, whatever they
/// start with.
pub fn lookup(data: &[u8]) -> Option<&'static SignatureEntry> {
    if data.len() < MIN_SIGNATURE_LEN {
        return None;
    }

    let entry = SIGNATURES.iter().find(|entry| entry.matches(data))?;
    debug!("Signature match: {} -> {}", entry.label, entry.codec.name());
    Some(entry)
}

/// Codec indicated by the buffer's signature.
pub fn detect(data: &[u8]) -> Option<ImageCodec> {
    lookup(data).map(|entry| entry.codec)
}

/// Best-effort MIME description of an arbitrary buffer, for log messages.
pub fn describe(data: &[u8]) -> String {
    match infer::get(data) {
        Some(kind) => kind.mime_type().to_string(),
        None => format!("unknown ({} bytes)", data.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(prefix: &[u8]) -> Vec<u8> {
        let mut data = prefix.to_vec();
        data.resize(16, 0);
        data
    }

    #[test]
    fn test_jpeg_prefix() {
        assert_eq!(detect(&padded(&[0xFF, 0xD8, 0xFF])), Some(ImageCodec::Mjpeg));
    }

    #[test]
    fn test_short_buffer_never_matches() {
        assert_eq!(detect(&[0xFF, 0xD8, 0xFF]), None);
        assert_eq!(detect(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0]), None);
        assert_eq!(detect(b"\x89PNG\r\n\x1A"), None);
        assert_eq!(detect(&[]), None);
    }

    #[test]
    fn test_all_table_entries() {
        assert_eq!(detect(b"\x89PNG\r\n\x1A\n\0\0\0\rIHDR"), Some(ImageCodec::Png));
        assert_eq!(detect(&padded(b"GIF89a")), Some(ImageCodec::Gif));
        assert_eq!(detect(&padded(b"BM")), Some(ImageCodec::Bmp));
        assert_eq!(detect(&padded(b"II*\x00")), Some(ImageCodec::Tiff));
        assert_eq!(detect(&padded(b"MM\x00*")), Some(ImageCodec::Tiff));
    }

    #[test]
    fn test_table_order_and_labels() {
        let labels: Vec<&str> = SIGNATURES.iter().map(|e| e.label).collect();
        assert_eq!(labels[0], "JPEG");
        assert_eq!(labels[1], "PNG");
        assert_eq!(lookup(&padded(b"MM\x00*")).map(|e| e.label), Some("TIFF (big endian)"));
    }

    #[test]
    fn test_unknown_data() {
        assert_eq!(detect(b"RIFF\0\0\0\0WEBPVP8 "), None);
        assert_eq!(detect(&[0u8; 32]), None);
    }

    #[test]
    fn test_codec_names() {
        for entry in SIGNATURES {
            assert_eq!(ImageCodec::from_name(entry.codec.name()), Some(entry.codec));
        }
        assert_eq!(ImageCodec::from_name("JPG"), Some(ImageCodec::Mjpeg));
        assert_eq!(ImageCodec::from_name("h264"), None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&padded(&[0xFF, 0xD8, 0xFF])), "image/jpeg");
        assert!(describe(&[1, 2, 3]).starts_with("unknown"));
    }
}
