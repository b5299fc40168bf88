//! Stream handle returned by streaming fetches.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use revisit_core::Error;

use crate::transport::{ByteStream, ResponseMeta};

/// Response metadata plus a body stream that has not been polled yet.
///
/// Nothing is read from the transport until the caller polls; by then the
/// cache record for this fetch has already been written.
pub struct FetchStream {
    meta: ResponseMeta,
    inner: ByteStream,
}

impl FetchStream {
    pub(crate) fn new(meta: ResponseMeta, inner: ByteStream) -> Self {
        Self { meta, inner }
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    pub fn into_inner(self) -> (ResponseMeta, ByteStream) {
        (self.meta, self.inner)
    }

    /// Drain the stream into one buffer.
    pub async fn collect_bytes(self) -> Result<Bytes, Error> {
        collect(self.inner).await
    }
}

/// Drain a body stream into one buffer.
pub(crate) async fn collect(mut stream: ByteStream) -> Result<Bytes, Error> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

impl Stream for FetchStream {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for FetchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStream").field("meta", &self.meta).finish_non_exhaustive()
    }
}
