//! Core types and shared functionality for revisit.
//!
//! This crate provides:
//! - File-per-resource cache store and record format
//! - Canonical fingerprint utility
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheRecord, CacheStore, fingerprint, hash_bytes};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
