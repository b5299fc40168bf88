//! Per-resource cache record.
//!
//! On disk each record is a JSON object with the fields `last`, `hash`,
//! `hashp`, `modified`, `etag` and `size`. Absent values are omitted rather
//! than written as `null`, and `false` from older writers reads as absent.

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Metadata about the last evaluation of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Epoch milliseconds of the last successful evaluation.
    #[serde(rename = "last")]
    pub last_fetched_at: i64,

    /// Hash of the retrieved (possibly preprocessed) bytes.
    #[serde(rename = "hash", default, skip_serializing_if = "Option::is_none")]
    pub raw_hash: Option<String>,

    /// Hash of the decoded and postprocessed value.
    #[serde(rename = "hashp", default, skip_serializing_if = "Option::is_none")]
    pub processed_hash: Option<String>,

    #[serde(
        rename = "modified",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_or_false"
    )]
    pub last_modified: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "string_or_false")]
    pub etag: Option<String>,

    /// Last observed body size in bytes.
    #[serde(rename = "size", default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
}

impl CacheRecord {
    /// A record stamped with the current time and nothing else.
    pub fn now() -> Self {
        Self { last_fetched_at: Utc::now().timestamp_millis(), ..Default::default() }
    }

    /// Timestamp of the last evaluation, if representable.
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.last_fetched_at)
    }

    /// Milliseconds elapsed since the last evaluation. Negative when the
    /// record is from the future (clock skew); saturates on absurd stamps.
    pub fn age_ms(&self) -> i64 {
        Utc::now().timestamp_millis().saturating_sub(self.last_fetched_at)
    }

    /// Copy of this record with the timestamp advanced to now.
    pub fn touched(&self) -> Self {
        Self { last_fetched_at: Utc::now().timestamp_millis(), ..self.clone() }
    }
}

fn string_or_false<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Validator {
        Text(String),
        Flag(IgnoredAny),
    }

    Ok(match Option::<Validator>::deserialize(deserializer)? {
        Some(Validator::Text(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}
