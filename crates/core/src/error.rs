//! Unified error types for revisit.
//!
//! Every variant renders as `CODE: detail` so logs and the CLI can report a
//! stable code alongside the human message.

/// Unified error type for fetch, cache and decode operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid request parameters (e.g., unsafe cache id, unknown charset).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Locator could not be parsed.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Connection, DNS, protocol or local I/O failure while retrieving.
    #[error("TRANSPORT_ERROR: {0}")]
    Transport(String),

    /// No transport handles the locator's scheme.
    #[error("UNSUPPORTED_PROTOCOL: {0}")]
    UnsupportedProtocol(String),

    /// Response status is not in the caller's success allowlist.
    #[error("STATUS_CODE: got status {0}")]
    StatusCode(u16),

    /// Response body exceeds the configured limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Format-specific parse failure.
    #[error("DECODE_FAILED: {format}: {message}")]
    Decode { format: String, message: String },

    /// No decoder is registered for the format tag.
    #[error("DECODER_UNAVAILABLE: {0}")]
    DecoderUnavailable(String),

    /// Caller-supplied preprocess/postprocess hook failed.
    #[error("HOOK_FAILED: {stage} hook {name}: {message}")]
    Hook { stage: &'static str, name: String, message: String },

    /// Cache record could not be persisted. Logged, never returned from a fetch.
    #[error("CACHE_WRITE: {0}")]
    CacheWrite(String),

    /// Cache record could not be parsed. Treated as a cache miss.
    #[error("CACHE_CORRUPT: {0}")]
    CacheCorrupt(String),
}

impl Error {
    /// The bare error code, without the detail message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::UnsupportedProtocol(_) => "UNSUPPORTED_PROTOCOL",
            Error::StatusCode(_) => "STATUS_CODE",
            Error::FetchTooLarge(_) => "FETCH_TOO_LARGE",
            Error::Decode { .. } => "DECODE_FAILED",
            Error::DecoderUnavailable(_) => "DECODER_UNAVAILABLE",
            Error::Hook { .. } => "HOOK_FAILED",
            Error::CacheWrite(_) => "CACHE_WRITE",
            Error::CacheCorrupt(_) => "CACHE_CORRUPT",
        }
    }
}
