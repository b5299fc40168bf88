//! Immutable fetch request and its builder.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use encoding_rs::Encoding;
use reqwest::Method;
use revisit_core::{Error, fingerprint, hash_bytes};
use serde::Serialize;
use url::Url;

use super::url::canonicalize;
use crate::decode::{Format, FormatOptions};
use crate::hook::{Postprocess, Preprocess};
use crate::transport::{BodyMode, Conditional, TransportRequest};

/// Default success-status allowlist.
pub const DEFAULT_SUCCESS_CODES: &[u16] = &[200];

/// One fetch, fully specified.
///
/// Built once per call through [`FetchRequest::builder`] and never mutated.
#[derive(Clone)]
pub struct FetchRequest {
    url: Url,
    method: Method,
    body: Option<Bytes>,
    headers: Vec<(String, String)>,
    success_codes: Vec<u16>,
    cache: bool,
    cache_id: String,
    format: Option<Format>,
    format_options: Option<FormatOptions>,
    preprocess: Option<Arc<dyn Preprocess>>,
    postprocess: Option<Arc<dyn Postprocess>>,
    cooldown: Option<Duration>,
    size_only: bool,
    meta_redirects: bool,
    charset: Option<&'static Encoding>,
    stream: bool,
}

impl FetchRequest {
    pub fn builder(locator: impl Into<String>) -> FetchRequestBuilder {
        FetchRequestBuilder::new(locator)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn success_codes(&self) -> &[u16] {
        &self.success_codes
    }

    pub fn is_success(&self, status: u16) -> bool {
        self.success_codes.contains(&status)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache
    }

    /// Explicit identifier, or the fingerprint of the whole request.
    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Options for the decoder: explicit ones, else the format's defaults.
    pub fn format_options(&self) -> Option<FormatOptions> {
        self.format_options
            .clone()
            .or_else(|| self.format.map(FormatOptions::for_format))
    }

    pub fn preprocess(&self) -> Option<&Arc<dyn Preprocess>> {
        self.preprocess.as_ref()
    }

    pub fn postprocess(&self) -> Option<&Arc<dyn Postprocess>> {
        self.postprocess.as_ref()
    }

    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    pub fn size_only(&self) -> bool {
        self.size_only
    }

    pub fn meta_redirects(&self) -> bool {
        self.meta_redirects
    }

    pub fn charset(&self) -> Option<&'static Encoding> {
        self.charset
    }

    pub fn stream(&self) -> bool {
        self.stream
    }

    /// The transport-level request for this fetch.
    pub fn transport_request(&self, conditional: Conditional, mode: BodyMode) -> TransportRequest {
        TransportRequest {
            url: self.url.clone(),
            method: self.method.clone(),
            body: self.body.clone(),
            headers: self.headers.clone(),
            conditional,
            mode,
        }
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("cache_id", &self.cache_id)
            .field("format", &self.format)
            .field("preprocess", &self.preprocess.as_ref().map(|h| h.name()))
            .field("postprocess", &self.postprocess.as_ref().map(|h| h.name()))
            .field("cooldown", &self.cooldown)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// Every field that identifies a request, in the form that gets fingerprinted.
#[derive(Serialize)]
struct RequestSpec<'a> {
    url: &'a str,
    method: &'a str,
    body: Option<String>,
    headers: &'a [(String, String)],
    success_codes: &'a [u16],
    cache: bool,
    format: Option<Format>,
    format_options: Option<&'a FormatOptions>,
    preprocess: Option<&'a str>,
    postprocess: Option<&'a str>,
    cooldown_ms: Option<u64>,
    size_only: bool,
    meta_redirects: bool,
    charset: Option<&'a str>,
    stream: bool,
}

/// Builder for [`FetchRequest`]; every field but the locator has a default.
#[derive(Clone)]
pub struct FetchRequestBuilder {
    locator: String,
    method: String,
    body: Option<Bytes>,
    headers: Vec<(String, String)>,
    success_codes: Vec<u16>,
    cache: bool,
    cache_id: Option<String>,
    format: Option<Format>,
    format_options: Option<FormatOptions>,
    preprocess: Option<Arc<dyn Preprocess>>,
    postprocess: Option<Arc<dyn Postprocess>>,
    cooldown: Option<Duration>,
    size_only: bool,
    meta_redirects: bool,
    charset: Option<String>,
    stream: bool,
}

impl FetchRequestBuilder {
    fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            method: Method::GET.to_string(),
            body: None,
            headers: Vec::new(),
            success_codes: DEFAULT_SUCCESS_CODES.to_vec(),
            cache: true,
            cache_id: None,
            format: None,
            format_options: None,
            preprocess: None,
            postprocess: None,
            cooldown: None,
            size_only: false,
            meta_redirects: false,
            charset: None,
            stream: false,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header override. Conditional headers still take precedence.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the success-status allowlist.
    pub fn success_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.success_codes = codes.into_iter().collect();
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    pub fn cache_id(mut self, id: impl Into<String>) -> Self {
        self.cache_id = Some(id.into());
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn format_options(mut self, options: FormatOptions) -> Self {
        self.format_options = Some(options);
        self
    }

    pub fn preprocess(mut self, hook: impl Preprocess + 'static) -> Self {
        self.preprocess = Some(Arc::new(hook));
        self
    }

    pub fn postprocess(mut self, hook: impl Postprocess + 'static) -> Self {
        self.postprocess = Some(Arc::new(hook));
        self
    }

    /// Minimum interval since the last evaluation before retrieving again.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Treat an unchanged content length as unchanged content.
    pub fn size_only(mut self, enabled: bool) -> Self {
        self.size_only = enabled;
        self
    }

    /// Follow HTML meta-refresh redirects (buffered mode only).
    pub fn meta_redirects(mut self, enabled: bool) -> Self {
        self.meta_redirects = enabled;
        self
    }

    /// Transcode the body from this charset label to UTF-8.
    pub fn charset(mut self, label: impl Into<String>) -> Self {
        self.charset = Some(label.into());
        self
    }

    pub fn stream(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }

    pub fn build(self) -> Result<FetchRequest, Error> {
        let url = canonicalize(&self.locator)?;

        let method = Method::from_bytes(self.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method: {:?}", self.method)))?;

        if self.success_codes.is_empty() {
            return Err(Error::InvalidInput("success status allowlist is empty".into()));
        }

        let charset = match &self.charset {
            Some(label) => Some(
                Encoding::for_label(label.trim().as_bytes())
                    .ok_or_else(|| Error::InvalidInput(format!("unknown charset: {label}")))?,
            ),
            None => None,
        };

        if let Some(id) = &self.cache_id {
            validate_cache_id(id)?;
        }

        let cooldown_ms = self.cooldown.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        let cache_id = match self.cache_id {
            Some(id) => id,
            None => fingerprint(&RequestSpec {
                url: url.as_str(),
                method: method.as_str(),
                body: self.body.as_deref().map(hash_bytes),
                headers: &self.headers,
                success_codes: &self.success_codes,
                cache: self.cache,
                format: self.format,
                format_options: self.format_options.as_ref(),
                preprocess: self.preprocess.as_ref().map(|h| h.name()),
                postprocess: self.postprocess.as_ref().map(|h| h.name()),
                cooldown_ms,
                size_only: self.size_only,
                meta_redirects: self.meta_redirects,
                charset: charset.map(|c| c.name()),
                stream: self.stream,
            })?,
        };

        Ok(FetchRequest {
            url,
            method,
            body: self.body,
            headers: self.headers,
            success_codes: self.success_codes,
            cache: self.cache,
            cache_id,
            format: self.format,
            format_options: self.format_options,
            preprocess: self.preprocess,
            postprocess: self.postprocess,
            cooldown: self.cooldown,
            size_only: self.size_only,
            meta_redirects: self.meta_redirects,
            charset,
            stream: self.stream,
        })
    }
}

/// Explicit identifiers name a file in the cache directory.
fn validate_cache_id(id: &str) -> Result<(), Error> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid { Ok(()) } else { Err(Error::InvalidInput(format!("unsafe cache id: {id:?}"))) }
}
