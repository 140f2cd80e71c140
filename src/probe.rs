//! Container probing
//!
//! A [`ProbeSession`] owns one opened resource (local path or network URL)
//! for the duration of a single call. Opening runs two independently
//! fallible phases, "open" and "find stream info"; either failure is logged
//! and leaves the session safely disposable.

use std::time::Duration;
use tracing::debug;

use crate::backend::{MediaBackend, OptionDict};
use crate::descriptor::FormatDescriptor;
use crate::error::{MediaError, Result};
use crate::log_sink::LogSink;

/// Browser-like user agent for hosts that reject library defaults.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.6261.95 Safari/537.36";

/// Options applied when opening a resource
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Network I/O timeout
    pub timeout: Duration,
    pub tls_verify: bool,
    pub max_redirects: u32,
    pub follow_redirects: bool,
    /// Upper bound on the time spent analyzing streams
    pub analyze_duration: Duration,
    /// Upper bound on the bytes read while probing
    pub probe_size: u64,
    /// Raw HTTP header block ("Key: value\r\n...")
    pub headers: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            tls_verify: false,
            max_redirects: 5,
            follow_redirects: true,
            analyze_duration: Duration::from_secs(1),
            probe_size: 5_000_000,  // 5 MB
            headers: None,
            user_agent: None,
        }
    }
}

impl OpenOptions {
    /// Defaults plus a raw header block; an empty block means no headers.
    pub fn with_headers(headers: &str) -> Self {
        Self {
            headers: if headers.is_empty() { None } else { Some(headers.to_string()) },
            ..Default::default()
        }
    }

    /// Backend option dictionary (times in microseconds).
    pub fn to_dict(&self) -> OptionDict {
        let flag = |b: bool| if b { "1" } else { "0" };

        let mut dict = OptionDict::new();
        dict.set("timeout", self.timeout.as_micros().to_string());
        dict.set("tls_verify", flag(self.tls_verify));
        dict.set("verify", flag(self.tls_verify));
        dict.set("max_redirects", self.max_redirects.to_string());
        dict.set("follow_redirects", flag(self.follow_redirects));
        dict.set("chunked_post", "0");
        dict.set("analyzeduration", self.analyze_duration.as_micros().to_string());
        dict.set("probesize", self.probe_size.to_string());
        if let Some(headers) = self.headers.as_deref().filter(|h| !h.is_empty()) {
            dict.set("headers", headers);
        }
        if let Some(agent) = self.user_agent.as_deref() {
            dict.set("user_agent", agent);
        }
        dict
    }
}

/// One opened media resource.
///
/// The container handle and the option dictionary are acquired together
/// and released together by [`dispose`](ProbeSession::dispose), which is
/// idempotent and also runs on drop.
pub struct ProbeSession<'b, B: MediaBackend> {
    backend: &'b B,
    locator: String,
    options: OpenOptions,
    input: Option<B::Input>,
    dict: Option<OptionDict>,
}

impl<'b, B: MediaBackend> ProbeSession<'b, B> {
    /// Session for `locator`; nothing is opened yet.
    pub fn new(backend: &'b B, locator: &str, options: OpenOptions) -> Self {
        Self {
            backend,
            locator: locator.to_string(),
            options,
            input: None,
            dict: None,
        }
    }

    /// Create and open in one step.
    pub fn open_with(
        backend: &'b B,
        locator: &str,
        options: OpenOptions,
        log: &mut LogSink,
    ) -> Result<Self> {
        let mut session = Self::new(backend, locator, options);
        session.open(log)?;
        Ok(session)
    }

    /// Open the resource and discover its streams. No retry is attempted.
    pub fn open(&mut self, log: &mut LogSink) -> Result<()> {
        let result = self.try_open();
        if let Err(err) = &result {
            log.record(err);
        }
        result
    }

    fn try_open(&mut self) -> Result<()> {
        if self.locator.is_empty() {
            return Err(MediaError::MissingInput("media locator is empty".to_string()));
        }

        // Re-opening replaces whatever a previous attempt left behind
        self.dispose();

        let dict = self.options.to_dict();
        debug!("Opening {} ({} options)", self.locator, dict.len());

        let input = self
            .backend
            .open_input(&self.locator, &dict)
            .map_err(|e| MediaError::OpenFailure {
                locator: self.locator.clone(),
                reason: e.to_string(),
            })?;
        self.input = Some(input);
        self.dict = Some(dict);

        debug!("Finding stream info: {}", self.locator);
        if let Some(input) = self.input.as_mut() {
            self.backend
                .find_stream_info(input)
                .map_err(|e| MediaError::ProbeFailure {
                    locator: self.locator.clone(),
                    reason: e.to_string(),
                })?;
        }

        debug!("Opened {}", self.locator);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.input.is_some()
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn backend(&self) -> &'b B {
        self.backend
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Option dictionary used for the current open, if any
    pub fn option_dict(&self) -> Option<&OptionDict> {
        self.dict.as_ref()
    }

    /// Snapshot of the container, `None` when nothing is open
    pub fn describe(&self) -> Option<FormatDescriptor> {
        self.input.as_ref().map(|input| self.backend.describe(input))
    }

    pub fn input(&self) -> Option<&B::Input> {
        self.input.as_ref()
    }

    pub fn input_mut(&mut self) -> Option<&mut B::Input> {
        self.input.as_mut()
    }

    /// Release the container handle and the option dictionary.
    pub fn dispose(&mut self) {
        if self.input.take().is_some() {
            debug!("Closed {}", self.locator);
        }
        self.dict = None;
    }
}

impl<B: MediaBackend> Drop for ProbeSession<'_, B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[test]
    fn test_default_options_dict() {
        let dict = OpenOptions::default().to_dict();
        assert_eq!(dict.get("timeout"), Some("30000000"));
        assert_eq!(dict.get("tls_verify"), Some("0"));
        assert_eq!(dict.get("max_redirects"), Some("5"));
        assert_eq!(dict.get("follow_redirects"), Some("1"));
        assert_eq!(dict.get("analyzeduration"), Some("1000000"));
        assert_eq!(dict.get("probesize"), Some("5000000"));
        assert_eq!(dict.get("headers"), None);
        assert_eq!(dict.get("user_agent"), None);
    }

    #[test]
    fn test_headers_passed_through() {
        let dict = OpenOptions::with_headers("Referer: x\r\n").to_dict();
        assert_eq!(dict.get("headers"), Some("Referer: x\r\n"));
        assert_eq!(OpenOptions::with_headers("").headers, None);

        let options = OpenOptions {
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            ..Default::default()
        };
        assert_eq!(options.to_dict().get("user_agent"), Some(DEFAULT_USER_AGENT));
    }

    #[test]
    fn test_empty_locator_never_touches_backend() {
        let backend = FakeBackend::audio_with_cover();
        let mut log = LogSink::new();
        let mut session = ProbeSession::new(&backend, "", OpenOptions::default());

        let err = session.open(&mut log).unwrap_err();
        assert!(matches!(err, MediaError::MissingInput(_)));
        assert!(!log.is_empty());
        assert!(!session.is_open());
        assert!(session.option_dict().is_none());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_open_failure_logged_with_locator() {
        let mut backend = FakeBackend::audio_with_cover();
        backend.fail_open = Some("Connection refused".to_string());
        let mut log = LogSink::new();

        let result = ProbeSession::open_with(&backend, "http://host/a.mp3", OpenOptions::default(), &mut log);
        assert!(matches!(result, Err(MediaError::OpenFailure { .. })));
        assert!(log.as_str().contains("http://host/a.mp3"));
        assert!(log.as_str().contains("Connection refused"));
    }

    #[test]
    fn test_probe_failure_leaves_session_disposable() {
        let mut backend = FakeBackend::audio_with_cover();
        backend.fail_probe = Some("Invalid data found".to_string());
        let mut log = LogSink::new();
        let mut session = ProbeSession::new(&backend, "song.mp3", OpenOptions::default());

        assert!(matches!(session.open(&mut log), Err(MediaError::ProbeFailure { .. })));
        assert_eq!(log.len(), 1);
        session.dispose();
        session.dispose();
        assert!(!session.is_open());
        assert!(session.option_dict().is_none());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let backend = FakeBackend::audio_with_cover();
        let mut log = LogSink::new();
        let mut session = ProbeSession::open_with(&backend, "song.mp3", OpenOptions::default(), &mut log).unwrap();
        assert!(session.is_open());
        assert!(session.describe().is_some());

        session.dispose();
        session.dispose();
        assert!(!session.is_open());
        assert!(session.describe().is_none());
        assert!(log.is_empty());
        assert_eq!(backend.live_inputs(), 0);
    }
}
