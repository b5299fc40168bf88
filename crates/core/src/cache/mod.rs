//! Persistent per-resource metadata cache.
//!
//! This module provides:
//!
//! - `CacheRecord`, the on-disk record of one resource's last evaluation
//! - `CacheStore`, a flat directory holding one record file per identifier
//! - Canonical fingerprinting (SHA-256 over RFC 8785 JSON) used for cache
//!   identifiers and content hashes

pub mod hash;
pub mod record;
pub mod store;

pub use crate::Error;

pub use hash::{fingerprint, hash_bytes};
pub use record::CacheRecord;
pub use store::CacheStore;
