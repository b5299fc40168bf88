//! Protocol transports behind one retrieval interface.
//!
//! ### Schemes
//! - `http` / `https`: reqwest client; 304 is reported as-is, status-code
//!   redirects are followed up to `max_redirects`.
//! - `ftp`: blocking FTP session on the blocking pool; a modification time not
//!   newer than the caller's validator is reported as 304.
//! - `file`: local filesystem; a synthesized etag of size, inode and mtime is
//!   compared before the file is read.
//!
//! Every transport answers with the same [`Response`] shape. Not-modified is
//! always status 304 with an empty body, whatever the scheme.

pub mod file;
pub mod ftp;
pub mod http;

use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use reqwest::Method;
use revisit_core::{AppConfig, CacheRecord, Error};
use serde::Serialize;
use url::Url;

pub use file::FileTransport;
pub use ftp::FtpTransport;
pub use http::HttpTransport;

/// Status reported by every transport when the resource is unchanged.
pub const NOT_MODIFIED: u16 = 304;

/// A boxed stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Configuration shared by the standard transports.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User agent string (default: "revisit/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of status-code redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Maximum buffered body size in bytes (default: 50MB)
    pub max_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for TransportConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            max_bytes: config.max_bytes,
        }
    }
}

/// Whether the caller wants the body buffered or as a lazy stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    Buffered,
    Stream,
}

/// Validators for a conditional request. At most one is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditional {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Conditional {
    /// Prefer the prior etag, fall back to the prior modification time.
    pub fn from_record(record: &CacheRecord) -> Self {
        if let Some(etag) = record.etag.as_ref().filter(|e| !e.is_empty()) {
            Self { etag: Some(etag.clone()), last_modified: None }
        } else if let Some(modified) = record.last_modified.as_ref().filter(|m| !m.is_empty()) {
            Self { etag: None, last_modified: Some(modified.clone()) }
        } else {
            Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// One retrieval as seen by a transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: Url,
    pub method: Method,
    pub body: Option<Bytes>,
    /// Caller header overrides, applied before the conditional headers.
    pub headers: Vec<(String, String)>,
    pub conditional: Conditional,
    pub mode: BodyMode,
}

impl TransportRequest {
    /// A plain GET for `url` with no validators.
    pub fn get(url: Url, mode: BodyMode) -> Self {
        Self { url, method: Method::GET, body: None, headers: Vec::new(), conditional: Conditional::default(), mode }
    }

    /// Same request aimed at another URL.
    pub fn retarget(&self, url: Url) -> Self {
        Self { url, ..self.clone() }
    }
}

/// Response metadata, shared with hooks and streaming callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseMeta {
    /// Final URL of the response (after any redirects)
    pub url: Url,
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    /// All response headers with textual values, lowercased names.
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    /// Metadata with only a URL and status.
    pub fn new(url: Url, status: u16) -> Self {
        Self {
            url,
            status,
            etag: None,
            last_modified: None,
            content_length: None,
            content_type: None,
            headers: Vec::new(),
        }
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == NOT_MODIFIED
    }

    /// Whether the body is an HTML document.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let ct = ct.to_ascii_lowercase();
                ct.starts_with("text/html") || ct.starts_with("application/xhtml+xml")
            })
            .unwrap_or(false)
    }

    /// Look up a header by name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Rebuild the synthesized header list from the typed fields.
    pub(crate) fn with_synthesized_headers(mut self) -> Self {
        let mut headers = Vec::new();
        if let Some(etag) = &self.etag {
            headers.push(("etag".to_string(), etag.clone()));
        }
        if let Some(modified) = &self.last_modified {
            headers.push(("last-modified".to_string(), modified.clone()));
        }
        if let Some(len) = self.content_length {
            headers.push(("content-length".to_string(), len.to_string()));
        }
        if let Some(ct) = &self.content_type {
            headers.push(("content-type".to_string(), ct.clone()));
        }
        self.headers = headers;
        self
    }
}

/// Response body: fully buffered or a lazy stream.
pub enum Body {
    Buffered(Bytes),
    Stream(ByteStream),
}

impl Body {
    pub fn empty() -> Self {
        Body::Buffered(Bytes::new())
    }

    /// Buffered bytes, if this body was buffered.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Buffered(bytes) => Some(bytes),
            Body::Stream(_) => None,
        }
    }

    /// Turn any body into a stream; buffered bodies become a single chunk.
    pub fn into_stream(self) -> ByteStream {
        match self {
            Body::Stream(stream) => stream,
            Body::Buffered(bytes) if bytes.is_empty() => Box::pin(futures_util::stream::empty()),
            Body::Buffered(bytes) => Box::pin(futures_util::stream::once(async move { Ok(bytes) })),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Normalized response from any transport.
#[derive(Debug)]
pub struct Response {
    pub meta: ResponseMeta,
    pub body: Body,
}

impl Response {
    /// A 304 response carrying the given metadata.
    pub fn not_modified(meta: ResponseMeta) -> Self {
        Self { meta: ResponseMeta { status: NOT_MODIFIED, ..meta }, body: Body::empty() }
    }
}

/// A retrieval protocol.
#[async_trait]
pub trait Transport: Send + Sync {
    /// URL schemes this transport handles.
    fn schemes(&self) -> &[&'static str];

    /// Retrieve the resource described by `request`.
    async fn retrieve(&self, request: &TransportRequest) -> Result<Response, Error>;
}

/// Dispatches each request to the transport registered for its scheme.
#[derive(Clone, Default)]
pub struct SchemeRouter {
    transports: Vec<Arc<dyn Transport>>,
}

impl SchemeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the network, file-transfer and local filesystem transports.
    pub fn standard(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::new()
            .with(Arc::new(HttpTransport::new(config.clone())?))
            .with(Arc::new(FtpTransport::new(config)))
            .with(Arc::new(FileTransport::new(config.max_bytes))))
    }

    /// Register a transport. Later registrations win for shared schemes.
    pub fn with(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(0, transport);
        self
    }

    /// The transport handling `scheme`, if any.
    pub fn route(&self, scheme: &str) -> Option<&Arc<dyn Transport>> {
        self.transports
            .iter()
            .find(|t| t.schemes().iter().any(|s| s.eq_ignore_ascii_case(scheme)))
    }
}

#[async_trait]
impl Transport for SchemeRouter {
    fn schemes(&self) -> &[&'static str] {
        &[]
    }

    async fn retrieve(&self, request: &TransportRequest) -> Result<Response, Error> {
        let scheme = request.url.scheme();
        let transport = self
            .route(scheme)
            .ok_or_else(|| Error::UnsupportedProtocol(scheme.to_string()))?;
        transport.retrieve(request).await
    }
}

/// Guess a content type from a path's extension.
pub fn guess_content_type(path: &str) -> String {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "xhtml" => "application/xhtml+xml",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "json" => "application/json",
        "ndjson" | "jsonl" => "application/x-ndjson",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "pdf" => "application/pdf",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Format a timestamp as an HTTP date (RFC 7231 IMF-fixdate).
pub fn http_date(time: impl Into<DateTime<Utc>>) -> String {
    time.into().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date back into a timestamp.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Milliseconds since the epoch for a filesystem timestamp.
pub(crate) fn epoch_millis(time: SystemTime) -> u128 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub(crate) fn too_large(len: u64, max_bytes: usize) -> Error {
    Error::FetchTooLarge(format!("{len} bytes exceeds {max_bytes}"))
}
