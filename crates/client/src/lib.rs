//! Client code for revisit.
//!
//! This crate provides the protocol transports, the decoder registry, the
//! hook interfaces and the conditional fetch controller built on the cache
//! store from `revisit-core`.

pub mod decode;
pub mod fetch;
pub mod hook;
pub mod transport;

pub use decode::{Content, Decoder, DecoderRegistry, Format, FormatOptions, MarkupDoc};
pub use fetch::{
    FetchOutcome, FetchRequest, FetchRequestBuilder, FetchStream, Fetcher, Payload, UnchangedReason, canonicalize,
};
pub use hook::{HookError, Postprocess, Preprocess, postprocess_fn, preprocess_fn};
pub use transport::{
    Body, BodyMode, Response, ResponseMeta, SchemeRouter, Transport, TransportConfig, TransportRequest,
};
