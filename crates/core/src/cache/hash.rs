//! Canonical fingerprints for request specs and content.
//!
//! Structured values are serialized to RFC 8785 canonical JSON before
//! hashing, so key order and number formatting never change the digest.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::Error;

/// SHA-256 of raw bytes as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Canonical serialization of a structured value.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    serde_json_canonicalizer::to_vec(value).map_err(|e| Error::InvalidInput(format!("cannot canonicalize value: {e}")))
}

/// Deterministic fingerprint of a structured value.
///
/// Identical structured input always yields the identical 64-character hex
/// digest, regardless of map insertion order.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String, Error> {
    Ok(hash_bytes(&canonical_bytes(value)?))
}
