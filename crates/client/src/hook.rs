//! Caller-supplied transformation hooks.
//!
//! A preprocess hook sees the raw body before the raw hash is taken; a
//! postprocess hook sees the decoded value before the processed hash is
//! taken. Both may be asynchronous and both abort the fetch on error.
//!
//! Each hook has a stable `name()`, which takes part in the derived cache
//! identifier: swapping a hook for a differently named one is a new resource
//! as far as the cache is concerned.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::Bytes;

use crate::decode::Content;
use crate::transport::ResponseMeta;

/// Error type hooks report; wrapped into `Error::Hook` by the controller.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Preprocess: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, body: Bytes, meta: &ResponseMeta) -> Result<Bytes, HookError>;
}

#[async_trait]
pub trait Postprocess: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, content: Content, meta: &ResponseMeta) -> Result<Content, HookError>;
}

/// Adapter turning a closure into a [`Preprocess`] hook.
pub struct FnPreprocess<F, Fut> {
    name: String,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> Preprocess for FnPreprocess<F, Fut>
where
    F: Fn(Bytes, ResponseMeta) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Bytes, HookError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, body: Bytes, meta: &ResponseMeta) -> Result<Bytes, HookError> {
        (self.f)(body, meta.clone()).await
    }
}

/// Adapter turning a closure into a [`Postprocess`] hook.
pub struct FnPostprocess<F, Fut> {
    name: String,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> Postprocess for FnPostprocess<F, Fut>
where
    F: Fn(Content, ResponseMeta) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Content, HookError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, content: Content, meta: &ResponseMeta) -> Result<Content, HookError> {
        (self.f)(content, meta.clone()).await
    }
}

/// Named preprocess hook from an async closure.
pub fn preprocess_fn<F, Fut>(name: impl Into<String>, f: F) -> FnPreprocess<F, Fut>
where
    F: Fn(Bytes, ResponseMeta) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Bytes, HookError>> + Send,
{
    FnPreprocess { name: name.into(), f, _fut: PhantomData }
}

/// Named postprocess hook from an async closure.
pub fn postprocess_fn<F, Fut>(name: impl Into<String>, f: F) -> FnPostprocess<F, Fut>
where
    F: Fn(Content, ResponseMeta) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Content, HookError>> + Send,
{
    FnPostprocess { name: name.into(), f, _fut: PhantomData }
}
