//! Cover Picture Extraction
//!
//! Finds one representative still for a container and writes it as a
//! full-size image plus an optional thumbnail:
//!
//! 1. Only the first video stream in container order is considered.
//! 2. An attached picture (album art) is written verbatim, no decode needed.
//!    The thumbnail is then decoded from that same packet.
//! 3. Otherwise the stream is decoded and the first frame wins.
//!
//! Containers lie about picture codecs often enough that a failed decode
//! gets exactly one more attempt with the codec named by the first packet's
//! magic bytes (see [`signature`](crate::signature)).

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::backend::{DecoderChoice, MediaBackend, PacketData};
use crate::descriptor::StreamDescriptor;
use crate::error::MediaError;
use crate::log_sink::LogSink;
use crate::probe::ProbeSession;
use crate::signature::{self, ImageCodec};
use crate::transcode::{
    convert_pixel_format, encode_frame, encode_frame_scaled, write_file, StillProfile, BEST_QSCALE,
};

/// How much of the requested output was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PictureTier {
    None = 0,
    /// Full-size picture only
    Full = 1,
    /// Full-size picture and thumbnail
    FullAndThumbnail = 2,
}

impl PictureTier {
    /// Numeric tier as reported across the C boundary
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Output settings for extracted pictures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PictureConfig {
    /// Quality scale of the full-size picture (2 = best, 31 = worst)
    pub full_qscale: i32,
    /// Quality scale of the thumbnail
    pub thumb_qscale: i32,
    /// Shorter side of the thumbnail in pixels
    pub thumb_min_side: i32,
}

impl Default for PictureConfig {
    fn default() -> Self {
        Self {
            full_qscale: BEST_QSCALE,
            thumb_qscale: 8,
            thumb_min_side: 96,
        }
    }
}

/// Extraction progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverState {
    NoImage,
    AttachedPicFound,
    NeedDecode,
    Decoded,
    DecodeFailed,
    Retried(ImageCodec),
    Exhausted,
}

/// Outcome of asking the policy for another decode attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Retry with the decoder forced to this codec
    Retry(ImageCodec),
    /// No packet was available to inspect
    NoPacket,
    /// The packet matched no known signature
    NoSignature,
    /// The signature names the codec that just failed
    SameCodec(ImageCodec),
    /// The single retry has already been used
    Spent,
}

/// Declared codec first, then at most one signature-guided retry.
#[derive(Debug, Clone, Copy)]
pub struct DecodePolicy {
    declared: Option<ImageCodec>,
    retried: bool,
}

impl DecodePolicy {
    /// Policy for a stream whose container declares `codec_name`.
    pub fn new(codec_name: Option<&str>) -> Self {
        Self {
            declared: codec_name.and_then(ImageCodec::from_name),
            retried: false,
        }
    }

    /// Decide what follows a failed attempt.
    pub fn after_failure(&mut self, first_packet: Option<&[u8]>) -> Fallback {
        if self.retried {
            return Fallback::Spent;
        }
        self.retried = true;

        let Some(data) = first_packet else {
            return Fallback::NoPacket;
        };
        match signature::detect(data) {
            None => Fallback::NoSignature,
            Some(codec) if Some(codec) == self.declared => Fallback::SameCodec(codec),
            Some(codec) => Fallback::Retry(codec),
        }
    }
}

/// Write the cover of the session's container to `picture`, and a
/// downscaled copy to `thumbnail` when one is given.
pub fn extract_picture<B: MediaBackend>(
    session: &mut ProbeSession<'_, B>,
    picture: &Path,
    thumbnail: Option<&Path>,
    config: &PictureConfig,
    log: &mut LogSink,
) -> PictureTier {
    extract(session, picture, thumbnail, config, log).0
}

fn extract<B: MediaBackend>(
    session: &mut ProbeSession<'_, B>,
    picture: &Path,
    thumbnail: Option<&Path>,
    config: &PictureConfig,
    log: &mut LogSink,
) -> (PictureTier, Vec<CoverState>) {
    if picture.as_os_str().is_empty() {
        log.record(&MediaError::MissingInput("picture output path is empty".to_string()));
        return (PictureTier::None, vec![CoverState::NoImage]);
    }
    let thumbnail = thumbnail.filter(|p| !p.as_os_str().is_empty());

    let Some(format) = session.describe() else {
        log.push(format!("No open container to extract a picture from: {}", session.locator()));
        return (PictureTier::None, vec![CoverState::NoImage]);
    };
    let Some(stream) = format.first_video_stream() else {
        debug!("No video stream in {}", session.locator());
        return (PictureTier::None, vec![CoverState::NoImage]);
    };

    let mut extraction = Extraction::new(session, stream);
    let tier = extraction.run(picture, thumbnail, config, log);
    (tier, extraction.trail)
}

/// A decode attempt that did not produce a frame
enum AttemptError {
    /// Decoder lookup, open, send or receive failed; a fallback may help
    Codec(MediaError),
    /// Input ran out first
    EndOfStream(MediaError),
}

struct Extraction<'s, 'b, B: MediaBackend> {
    session: &'s mut ProbeSession<'b, B>,
    backend: &'b B,
    stream: usize,
    codec_name: Option<String>,
    attached_pic: bool,
    /// Packets come from the container rather than from `pending`
    from_container: bool,
    pending: Option<B::Packet>,
    /// Packets read from the stream so far, replayed in order on a retry;
    /// the first one drives the signature check
    consumed: Vec<B::Packet>,
    trail: Vec<CoverState>,
}

impl<'s, 'b, B: MediaBackend> Extraction<'s, 'b, B> {
    fn new(session: &'s mut ProbeSession<'b, B>, stream: &StreamDescriptor) -> Self {
        let backend = session.backend();
        Self {
            session,
            backend,
            stream: stream.index,
            codec_name: stream.codec_name.clone(),
            attached_pic: stream.attached_pic,
            from_container: true,
            pending: None,
            consumed: Vec::new(),
            trail: vec![CoverState::NoImage],
        }
    }

    fn enter(&mut self, state: CoverState) {
        debug!("Cover stream {}: {:?}", self.stream, state);
        self.trail.push(state);
    }

    fn run(
        &mut self,
        picture: &Path,
        thumbnail: Option<&Path>,
        config: &PictureConfig,
        log: &mut LogSink,
    ) -> PictureTier {
        if self.attached_pic {
            let packet = self
                .session
                .input()
                .and_then(|input| self.backend.attached_picture(input, self.stream));
            match packet {
                Some(packet) => {
                    self.enter(CoverState::AttachedPicFound);
                    return self.from_attached(packet, picture, thumbnail, config, log);
                }
                None => log.push(format!(
                    "Stream {} is flagged as attached picture but carries no data",
                    self.stream
                )),
            }
        }

        self.enter(CoverState::NeedDecode);
        self.from_container_frames(picture, thumbnail, config, log)
    }

    fn from_attached(
        &mut self,
        packet: B::Packet,
        picture: &Path,
        thumbnail: Option<&Path>,
        config: &PictureConfig,
        log: &mut LogSink,
    ) -> PictureTier {
        if let Err(err) = write_file(picture, packet.data()) {
            log.record(&err);
            return PictureTier::None;
        }
        debug!(
            "Wrote attached picture: {} bytes, {}",
            packet.data().len(),
            signature::describe(packet.data())
        );

        let Some(thumbnail) = thumbnail else {
            return PictureTier::Full;
        };

        self.from_container = false;
        self.pending = Some(packet);
        let frame = self.decode(log).and_then(|frame| self.normalize(frame, log));

        match frame {
            Some(frame)
                if encode_frame_scaled(
                    self.backend,
                    &frame,
                    thumbnail,
                    config.thumb_min_side,
                    config.thumb_qscale,
                    log,
                ) =>
            {
                PictureTier::FullAndThumbnail
            }
            _ => PictureTier::Full,
        }
    }

    fn from_container_frames(
        &mut self,
        picture: &Path,
        thumbnail: Option<&Path>,
        config: &PictureConfig,
        log: &mut LogSink,
    ) -> PictureTier {
        let Some(frame) = self.decode(log).and_then(|frame| self.normalize(frame, log)) else {
            return PictureTier::None;
        };

        if !encode_frame(self.backend, &frame, picture, -1, -1, config.full_qscale, log) {
            return PictureTier::None;
        }

        match thumbnail {
            Some(thumbnail)
                if encode_frame_scaled(
                    self.backend,
                    &frame,
                    thumbnail,
                    config.thumb_min_side,
                    config.thumb_qscale,
                    log,
                ) =>
            {
                PictureTier::FullAndThumbnail
            }
            _ => PictureTier::Full,
        }
    }

    /// Bring a decoded frame into the still profile's pixel layout.
    fn normalize(&self, frame: B::Frame, log: &mut LogSink) -> Option<B::Frame> {
        if StillProfile::accepts(&frame) {
            return Some(frame);
        }
        convert_pixel_format(self.backend, &frame, StillProfile::LAYOUT, StillProfile::RANGE, log)
    }

    /// Decode the first frame, falling back once on a signature match.
    fn decode(&mut self, log: &mut LogSink) -> Option<B::Frame> {
        let mut policy = DecodePolicy::new(self.codec_name.as_deref());
        let mut choice = DecoderChoice::Declared;

        loop {
            match self.attempt(choice, log) {
                Ok(frame) => {
                    self.enter(CoverState::Decoded);
                    return Some(frame);
                }
                Err(AttemptError::EndOfStream(err)) => {
                    log.record(&err);
                    self.enter(CoverState::Exhausted);
                    return None;
                }
                Err(AttemptError::Codec(err)) => {
                    log.record(&err);
                    self.enter(CoverState::DecodeFailed);

                    // The decoder may have failed before anything was read
                    if self.consumed.is_empty() {
                        self.next_packet(log);
                    }
                    let first = self.consumed.first().map(|p| p.data());

                    match policy.after_failure(first) {
                        Fallback::Retry(codec) => {
                            log.push(format!(
                                "Retrying stream {} with the {} decoder (packet signature)",
                                self.stream,
                                codec.name()
                            ));
                            self.enter(CoverState::Retried(codec));
                            choice = DecoderChoice::Forced(codec);
                        }
                        other => {
                            debug!("No decoder fallback for stream {}: {:?}", self.stream, other);
                            self.enter(CoverState::Exhausted);
                            return None;
                        }
                    }
                }
            }
        }
    }

    fn attempt(&mut self, choice: DecoderChoice, log: &mut LogSink) -> Result<B::Frame, AttemptError> {
        let stream = self.stream;
        let codec_err = move |e: crate::error::BackendError| {
            AttemptError::Codec(MediaError::DecodeFailure(format!("stream {}: {}", stream, e)))
        };

        let mut decoder = match self.session.input() {
            Some(input) => self.backend.open_decoder(input, stream, choice).map_err(codec_err)?,
            None => {
                return Err(AttemptError::EndOfStream(MediaError::DecodeFailure(
                    "container is closed".to_string(),
                )))
            }
        };
        debug!("Decoder open for stream {}: {:?}", stream, choice);

        // A retry starts over from every packet the failed attempt consumed
        for packet in self.consumed.clone() {
            self.backend.send_packet(&mut decoder, &packet).map_err(codec_err)?;
            if let Some(frame) = self.backend.receive_frame(&mut decoder).map_err(codec_err)? {
                return Ok(frame);
            }
        }

        while let Some(packet) = self.next_packet(log) {
            self.backend.send_packet(&mut decoder, &packet).map_err(codec_err)?;
            if let Some(frame) = self.backend.receive_frame(&mut decoder).map_err(codec_err)? {
                return Ok(frame);
            }
        }

        self.backend.send_eof(&mut decoder).map_err(codec_err)?;
        match self.backend.receive_frame(&mut decoder).map_err(codec_err)? {
            Some(frame) => Ok(frame),
            None => Err(AttemptError::EndOfStream(MediaError::DecodeFailure(format!(
                "stream {}: end of stream before a frame was decoded",
                stream
            )))),
        }
    }

    /// Next packet of the candidate stream; other streams are skipped.
    fn next_packet(&mut self, log: &mut LogSink) -> Option<B::Packet> {
        let packet = if self.from_container {
            let input = self.session.input_mut()?;
            loop {
                match self.backend.read_packet(input) {
                    Ok(Some(packet)) if packet.stream_index() == self.stream => break packet,
                    Ok(Some(_)) => continue,
                    Ok(None) => return None,
                    Err(e) => {
                        log.push(format!("Read failed on stream {}: {}", self.stream, e));
                        return None;
                    }
                }
            }
        } else {
            self.pending.take()?
        };

        self.consumed.push(packet.clone());
        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ColorRange, PixelLayout};
    use crate::probe::OpenOptions;
    use crate::testing::{DecodeScript, FakeBackend, FakePacket, JPEG_BYTES, PNG_BYTES};
    use tempfile::TempDir;

    struct Run {
        tier: PictureTier,
        trail: Vec<CoverState>,
        log: LogSink,
        dir: TempDir,
    }

    impl Run {
        fn read(&self, name: &str) -> Option<Vec<u8>> {
            std::fs::read(self.dir.path().join(name)).ok()
        }
    }

    fn run(backend: &FakeBackend, with_thumbnail: bool) -> Run {
        let dir = TempDir::new().unwrap();
        let picture = dir.path().join("full.jpg");
        let thumbnail = dir.path().join("thumb.jpg");
        let mut log = LogSink::new();
        let mut session = ProbeSession::open_with(backend, "media", OpenOptions::default(), &mut log).unwrap();

        let thumb = if with_thumbnail { Some(thumbnail.as_path()) } else { None };
        let (tier, trail) = extract(&mut session, &picture, thumb, &PictureConfig::default(), &mut log);
        Run { tier, trail, log, dir }
    }

    #[test]
    fn test_attached_picture_written_verbatim() {
        let backend = FakeBackend::audio_with_cover();
        let result = run(&backend, false);

        assert_eq!(result.tier, PictureTier::Full);
        assert_eq!(result.read("full.jpg").unwrap(), JPEG_BYTES);
        assert_eq!(backend.count_calls("open_decoder"), 0);
        assert!(result.log.is_empty());
        assert!(result.trail.contains(&CoverState::AttachedPicFound));
    }

    #[test]
    fn test_attached_picture_with_thumbnail() {
        let backend = FakeBackend::audio_with_cover();
        let result = run(&backend, true);

        assert_eq!(result.tier, PictureTier::FullAndThumbnail);
        assert_eq!(result.read("full.jpg").unwrap(), JPEG_BYTES);
        assert_eq!(result.read("thumb.jpg").unwrap(), b"JPEG 96x96 q8");
        assert_eq!(
            result.trail,
            vec![CoverState::NoImage, CoverState::AttachedPicFound, CoverState::Decoded]
        );
    }

    #[test]
    fn test_mislabeled_cover_retried_by_signature() {
        let mut backend = FakeBackend::audio_with_cover();
        backend.attached = Some(FakePacket { stream: 1, data: PNG_BYTES.to_vec() });
        backend.declared = DecodeScript::ReceiveFails;
        backend.forced_ok = vec![ImageCodec::Png];
        let result = run(&backend, true);

        assert_eq!(result.tier, PictureTier::FullAndThumbnail);
        assert_eq!(backend.count_calls("open_decoder"), 2);
        assert!(backend.calls().contains(&"open_decoder Forced(Png)".to_string()));
        assert!(result.log.as_str().contains("Decode failed"));
        assert!(result.trail.contains(&CoverState::Retried(ImageCodec::Png)));
    }

    #[test]
    fn test_signature_matching_declared_codec_not_retried() {
        let mut backend = FakeBackend::audio_with_cover();
        backend.declared = DecodeScript::ReceiveFails;
        backend.forced_ok = vec![ImageCodec::Mjpeg];
        let result = run(&backend, true);

        assert_eq!(result.tier, PictureTier::Full);
        assert_eq!(backend.count_calls("open_decoder"), 1);
        assert_eq!(result.trail.last(), Some(&CoverState::Exhausted));
    }

    #[test]
    fn test_at_most_one_retry() {
        let mut backend = FakeBackend::audio_with_cover();
        backend.attached = Some(FakePacket { stream: 1, data: PNG_BYTES.to_vec() });
        backend.declared = DecodeScript::NotFound;
        let result = run(&backend, true);

        assert_eq!(result.tier, PictureTier::Full);
        assert_eq!(backend.count_calls("open_decoder"), 2);
        assert_eq!(result.trail.last(), Some(&CoverState::Exhausted));
        assert!(result.read("full.jpg").is_some());
        assert!(result.read("thumb.jpg").is_none());
    }

    #[test]
    fn test_video_first_frame() {
        let backend = FakeBackend::video_clip();
        let result = run(&backend, true);

        assert_eq!(result.tier, PictureTier::FullAndThumbnail);
        assert_eq!(result.read("full.jpg").unwrap(), b"JPEG 1920x1080 q2");
        assert_eq!(result.read("thumb.jpg").unwrap(), b"JPEG 170x96 q8");
        // Audio packets are never fed to the video decoder
        assert_eq!(backend.count_calls("send_packet"), 1);
        assert!(result.log.is_empty());
    }

    #[test]
    fn test_limited_range_frame_converted_to_full() {
        let backend = FakeBackend::video_clip();
        assert_eq!(backend.frame.range, ColorRange::Limited);
        let result = run(&backend, false);

        assert_eq!(result.tier, PictureTier::Full);
        let calls = backend.calls();
        let rescale = calls.iter().position(|c| c == "rescale 1920x1080").unwrap();
        let encode = calls.iter().position(|c| c == "encode 1920x1080 q2").unwrap();
        assert!(rescale < encode);
    }

    #[test]
    fn test_full_range_frame_encoded_as_is() {
        let mut backend = FakeBackend::video_clip();
        backend.frame.range = ColorRange::Full;
        let result = run(&backend, false);

        assert_eq!(result.tier, PictureTier::Full);
        assert_eq!(backend.count_calls("rescale"), 0);
    }

    #[test]
    fn test_video_frame_converted_to_still_layout() {
        let mut backend = FakeBackend::video_clip();
        backend.frame.layout = PixelLayout::Rgb24;
        let result = run(&backend, false);

        assert_eq!(result.tier, PictureTier::Full);
        assert!(backend.calls().contains(&"rescale 1920x1080".to_string()));
    }

    #[test]
    fn test_conversion_failure_is_tier_zero() {
        let mut backend = FakeBackend::video_clip();
        backend.frame.layout = PixelLayout::Other("p010le".to_string());
        backend.frame.range = ColorRange::Limited;
        backend.fail_rescale = true;
        let result = run(&backend, true);

        assert_eq!(result.tier, PictureTier::None);
        assert!(result.read("full.jpg").is_none());
    }

    #[test]
    fn test_end_of_stream_without_frame() {
        let mut backend = FakeBackend::video_clip();
        backend.declared = DecodeScript::NeverOutputs;
        let result = run(&backend, true);

        assert_eq!(result.tier, PictureTier::None);
        assert_eq!(backend.count_calls("open_decoder"), 1);
        assert!(result.log.as_str().contains("end of stream"));
    }

    #[test]
    fn test_unrecognized_packet_not_retried() {
        let mut backend = FakeBackend::video_clip();
        backend.declared = DecodeScript::NotFound;
        let result = run(&backend, true);

        assert_eq!(result.tier, PictureTier::None);
        assert_eq!(backend.count_calls("open_decoder"), 1);
        assert!(!result.log.is_empty());
    }

    #[test]
    fn test_retry_feeds_retained_first_packet() {
        let mut backend = FakeBackend::video_clip();
        backend.packets[1].data = JPEG_BYTES.to_vec();
        backend.declared = DecodeScript::NotFound;
        backend.forced_ok = vec![ImageCodec::Mjpeg];
        let result = run(&backend, false);

        assert_eq!(result.tier, PictureTier::Full);
        assert_eq!(backend.count_calls("send_packet"), 1);
        assert!(backend.calls().contains(&format!("send_packet {}", JPEG_BYTES.len())));
    }

    #[test]
    fn test_retry_replays_every_consumed_packet() {
        let mut backend = FakeBackend::video_clip();
        backend.packets[1].data = JPEG_BYTES.to_vec();
        backend.declared = DecodeScript::ReceiveFailsLate;
        backend.forced_ok = vec![ImageCodec::Mjpeg];
        let result = run(&backend, false);

        assert_eq!(result.tier, PictureTier::Full);
        let calls = backend.calls();
        let retry = calls.iter().position(|c| c == "open_decoder Forced(Mjpeg)").unwrap();
        let replayed: Vec<&String> = calls[retry..].iter().filter(|c| c.starts_with("send_packet")).collect();
        assert_eq!(replayed[0], &format!("send_packet {}", JPEG_BYTES.len()));
        assert_eq!(backend.count_calls("send_packet"), 3);
    }

    #[test]
    fn test_no_video_stream() {
        let backend = FakeBackend::audio_only();
        let result = run(&backend, true);

        assert_eq!(result.tier, PictureTier::None);
        assert!(result.log.is_empty());
        assert_eq!(result.trail, vec![CoverState::NoImage]);
    }

    #[test]
    fn test_empty_picture_path() {
        let backend = FakeBackend::audio_with_cover();
        let mut log = LogSink::new();
        let mut session = ProbeSession::open_with(&backend, "media", OpenOptions::default(), &mut log).unwrap();

        let tier = extract_picture(&mut session, Path::new(""), None, &PictureConfig::default(), &mut log);
        assert_eq!(tier, PictureTier::None);
        assert!(log.as_str().contains("Missing input"));
    }

    #[test]
    fn test_policy_transitions() {
        let mut policy = DecodePolicy::new(Some("mjpeg"));
        assert_eq!(policy.after_failure(Some(PNG_BYTES)), Fallback::Retry(ImageCodec::Png));
        assert_eq!(policy.after_failure(Some(PNG_BYTES)), Fallback::Spent);

        let mut policy = DecodePolicy::new(Some("mjpeg"));
        assert_eq!(policy.after_failure(Some(JPEG_BYTES)), Fallback::SameCodec(ImageCodec::Mjpeg));

        let mut policy = DecodePolicy::new(Some("h264"));
        assert_eq!(policy.after_failure(Some(&JPEG_BYTES[..4])), Fallback::NoSignature);

        let mut policy = DecodePolicy::new(None);
        assert_eq!(policy.after_failure(None), Fallback::NoPacket);
    }
}
