//! Conditional fetch pipeline.
//!
//! ### States
//! 1. Load the prior cache record (absent on first fetch or corruption).
//! 2. Cooldown: skip entirely when the last evaluation is too recent.
//! 3. Conditional headers from the prior record's etag or modification time.
//! 4. Retrieve (following meta-refresh redirects when asked), then check for
//!    not-modified, a client-side etag match, the status allowlist and the
//!    size-only heuristic.
//! 5. Preprocess and hash the raw bytes; stop when the raw hash is unchanged.
//! 6. Decode by format tag.
//! 7. Postprocess and hash the value; stop when the processed hash is unchanged.
//! 8. Write the new record and return the value.
//!
//! ### Cache writes
//! - Changed: full record replace.
//! - Cache hit (step 4): the prior record's timestamp is advanced.
//! - No change (steps 5 and 7): the record is left as it was.
//!
//! Writes are best-effort: a failed write is logged and the fetch result is
//! still returned. Fetches for the same cache identifier are not serialized
//! against each other; the last write wins.
//!
//! ### Streaming
//! Steps 1 to 4 only. A record holding validators and size (no hashes) is
//! written before the stream is handed out, so the caller cannot observe a
//! byte before the record exists.

pub mod outcome;
pub mod redirect;
pub mod request;
pub mod stream;
pub mod url;

use std::sync::Arc;

use bytes::Bytes;
use revisit_core::{AppConfig, CacheRecord, CacheStore, Error, hash_bytes};
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::decode::{Content, DecoderRegistry, FormatOptions};
use crate::transport::{
    Body, BodyMode, Conditional, Response, ResponseMeta, SchemeRouter, Transport, TransportConfig, TransportRequest,
};

pub use outcome::{FetchOutcome, Payload, UnchangedReason};
pub use redirect::{MAX_META_REDIRECTS, find_meta_refresh};
pub use request::{FetchRequest, FetchRequestBuilder};
pub use stream::FetchStream;
pub use url::{UrlError, canonicalize};

/// The conditional fetch controller.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    store: CacheStore,
    decoders: DecoderRegistry,
    permits: Arc<Semaphore>,
}

impl Fetcher {
    /// Fetcher with the standard transports, the configured cache directory
    /// and every compiled-in decoder.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let transport = SchemeRouter::standard(&TransportConfig::from(config))?;
        let store = CacheStore::open(&config.cache_dir).await?;
        Ok(Self::new(Arc::new(transport), store, config.max_concurrency))
    }

    pub fn new(transport: Arc<dyn Transport>, store: CacheStore, max_concurrency: usize) -> Self {
        Self {
            transport,
            store,
            decoders: DecoderRegistry::with_defaults(),
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Replace the decoder registry.
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    /// Fetch in the mode the request asks for.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome<Payload>, Error> {
        if request.stream() {
            Ok(self.fetch_stream(request).await?.map(Payload::Stream))
        } else {
            Ok(self.fetch_content(request).await?.map(Payload::Content))
        }
    }

    /// Buffered fetch: retrieve, decode and postprocess.
    pub async fn fetch_content(&self, request: &FetchRequest) -> Result<FetchOutcome<Content>, Error> {
        let _permit = self.acquire().await?;
        let cache_id = request.cache_id();

        let prior = self.store.load(cache_id).await;
        if let Some(reason) = check_cooldown(request, prior.as_ref()) {
            return Ok(FetchOutcome::Unchanged(reason));
        }

        let transport_request = request.transport_request(conditional(request, prior.as_ref()), BodyMode::Buffered);
        let mut response = self.transport.retrieve(&transport_request).await?;
        if request.meta_redirects() {
            response = redirect::resolve(self.transport.as_ref(), &transport_request, response).await?;
        }

        let compared = prior.as_ref().filter(|_| request.cache_enabled());
        if let Some(reason) = evaluate(request, compared, &response.meta)? {
            self.touch(cache_id, prior.as_ref()).await;
            return Ok(FetchOutcome::Unchanged(reason));
        }

        let Response { meta, body } = response;
        let bytes = match body {
            Body::Buffered(bytes) => bytes,
            Body::Stream(chunks) => stream::collect(chunks).await?,
        };
        let bytes = match request.charset() {
            Some(encoding) => transcode(encoding, &bytes),
            None => bytes,
        };

        let bytes = match request.preprocess() {
            Some(hook) => hook.apply(bytes, &meta).await.map_err(|e| Error::Hook {
                stage: "preprocess",
                name: hook.name().to_string(),
                message: e.to_string(),
            })?,
            None => bytes,
        };

        let raw_hash = hash_bytes(&bytes);
        if compared.is_some_and(|record| record.raw_hash.as_deref() == Some(raw_hash.as_str())) {
            tracing::debug!(cache_id, "raw content unchanged");
            return Ok(FetchOutcome::Unchanged(UnchangedReason::NoChange));
        }

        let content = self.decode(request, bytes)?;

        let content = match request.postprocess() {
            Some(hook) => hook.apply(content, &meta).await.map_err(|e| Error::Hook {
                stage: "postprocess",
                name: hook.name().to_string(),
                message: e.to_string(),
            })?,
            None => content,
        };

        let processed_hash = content.fingerprint()?;
        if compared.is_some_and(|record| record.processed_hash.as_deref() == Some(processed_hash.as_str())) {
            tracing::debug!(cache_id, "processed content unchanged");
            return Ok(FetchOutcome::Unchanged(UnchangedReason::NoChange));
        }

        let record = CacheRecord {
            raw_hash: Some(raw_hash),
            processed_hash: Some(processed_hash),
            ..observed(&meta)
        };
        self.persist(cache_id, &record).await;

        tracing::info!(cache_id, url = %meta.url, kind = content.kind(), "content changed");
        Ok(FetchOutcome::Changed(content))
    }

    /// Streaming fetch: the body is handed out unread.
    pub async fn fetch_stream(&self, request: &FetchRequest) -> Result<FetchOutcome<FetchStream>, Error> {
        let _permit = self.acquire().await?;
        let cache_id = request.cache_id();

        let prior = self.store.load(cache_id).await;
        if let Some(reason) = check_cooldown(request, prior.as_ref()) {
            return Ok(FetchOutcome::Unchanged(reason));
        }

        let transport_request = request.transport_request(conditional(request, prior.as_ref()), BodyMode::Stream);
        let response = self.transport.retrieve(&transport_request).await?;

        let compared = prior.as_ref().filter(|_| request.cache_enabled());
        if let Some(reason) = evaluate(request, compared, &response.meta)? {
            self.touch(cache_id, prior.as_ref()).await;
            return Ok(FetchOutcome::Unchanged(reason));
        }

        let Response { meta, body } = response;
        self.persist(cache_id, &observed(&meta)).await;

        tracing::info!(cache_id, url = %meta.url, "streaming changed content");
        Ok(FetchOutcome::Changed(FetchStream::new(meta, body.into_stream())))
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, Error> {
        self.permits
            .acquire()
            .await
            .map_err(|_| Error::Transport("fetcher is shut down".into()))
    }

    fn decode(&self, request: &FetchRequest, bytes: Bytes) -> Result<Content, Error> {
        let Some(format) = request.format() else {
            return Ok(match request.charset() {
                Some(_) => Content::Text(String::from_utf8_lossy(&bytes).into_owned()),
                None => Content::Bytes(bytes),
            });
        };

        let decoder = self.decoders.get(format).inspect_err(|e| {
            tracing::warn!(format = %format, error = %e, "no decoder available");
        })?;
        let options = request.format_options().unwrap_or_else(|| FormatOptions::for_format(format));
        decoder.decode(&bytes, &options).inspect_err(|e| {
            tracing::debug!(format = %format, error = %e, "decode failed");
        })
    }

    async fn touch(&self, cache_id: &str, prior: Option<&CacheRecord>) {
        if let Some(prior) = prior {
            self.persist(cache_id, &prior.touched()).await;
        }
    }

    async fn persist(&self, cache_id: &str, record: &CacheRecord) {
        if let Err(e) = self.store.save(cache_id, record).await {
            tracing::warn!(cache_id, error = %e, "cache write failed");
        }
    }
}

fn check_cooldown(request: &FetchRequest, prior: Option<&CacheRecord>) -> Option<UnchangedReason> {
    let cooldown = request.cooldown()?;
    let age = prior?.age_ms();
    if age < i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX) {
        tracing::debug!(cache_id = request.cache_id(), age_ms = age, "within cooldown");
        return Some(UnchangedReason::Cooldown);
    }
    None
}

fn conditional(request: &FetchRequest, prior: Option<&CacheRecord>) -> Conditional {
    match prior {
        Some(record) if request.cache_enabled() => Conditional::from_record(record),
        _ => Conditional::default(),
    }
}

/// Response checks before the body is looked at.
///
/// `prior` is only passed when caching is enabled.
fn evaluate(
    request: &FetchRequest, prior: Option<&CacheRecord>, meta: &ResponseMeta,
) -> Result<Option<UnchangedReason>, Error> {
    let cache_id = request.cache_id();

    if meta.is_not_modified() {
        tracing::debug!(cache_id, "not modified");
        return Ok(Some(UnchangedReason::CacheHit));
    }

    if let Some(record) = prior
        && record.etag.is_some()
        && record.etag == meta.etag
    {
        tracing::debug!(cache_id, "etag matches prior record");
        return Ok(Some(UnchangedReason::CacheHit));
    }

    if !request.is_success(meta.status) {
        return Err(Error::StatusCode(meta.status));
    }

    if request.size_only()
        && let Some(record) = prior
        && record.content_length.is_some()
        && record.content_length == meta.content_length
    {
        tracing::debug!(cache_id, size = meta.content_length, "size unchanged");
        return Ok(Some(UnchangedReason::CacheHit));
    }

    Ok(None)
}

/// Record stamped now, carrying the validators and size the transport reported.
fn observed(meta: &ResponseMeta) -> CacheRecord {
    CacheRecord {
        etag: meta.etag.clone(),
        last_modified: meta.last_modified.clone(),
        content_length: meta.content_length,
        ..CacheRecord::now()
    }
}

fn transcode(encoding: &'static encoding_rs::Encoding, bytes: &[u8]) -> Bytes {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(charset = encoding.name(), "malformed input replaced while transcoding");
    }
    Bytes::from(text.into_owned())
}
