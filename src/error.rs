use thiserror::Error;

/// Recoverable failures of the probe / thumbnail pipeline.
///
/// None of these cross the public entry points as errors: they are turned
/// into a [`LogSink`](crate::LogSink) entry plus a degraded return value.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Cannot open {locator}: {reason}")]
    OpenFailure { locator: String, reason: String },

    #[error("Cannot read stream info of {locator}: {reason}")]
    ProbeFailure { locator: String, reason: String },

    #[error("Decode failed: {0}")]
    DecodeFailure(String),

    #[error("Pixel format conversion failed: {0}")]
    ConvertFailure(String),

    #[error("Still image encode failed: {0}")]
    EncodeFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Error reported by a [`MediaBackend`](crate::MediaBackend) primitive.
///
/// The message is already human readable (FFmpeg codes are mapped through
/// `av_strerror`), so callers only ever format it into a log entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("decoder not found: {0}")]
    DecoderNotFound(String),

    #[error("encoder not found: {0}")]
    EncoderNotFound(String),

    #[error("{op} failed: {message}")]
    Call { op: &'static str, message: String },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl BackendError {
    pub fn call(op: &'static str, message: impl Into<String>) -> Self {
        BackendError::Call { op, message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
