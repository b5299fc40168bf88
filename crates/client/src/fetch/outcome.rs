//! Fetch results.

use serde::Serialize;

use super::stream::FetchStream;
use crate::decode::Content;

/// Why a fetch produced nothing new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnchangedReason {
    /// The transport (or a validator/size heuristic) reported not-modified.
    CacheHit,
    /// Content was retrieved but hashed the same as last time.
    NoChange,
    /// Skipped: the last evaluation is more recent than the cooldown.
    Cooldown,
}

impl UnchangedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnchangedReason::CacheHit => "cache-hit",
            UnchangedReason::NoChange => "no-change",
            UnchangedReason::Cooldown => "cooldown",
        }
    }
}

impl std::fmt::Display for UnchangedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful fetch. Failures are the `Err` arm of the result.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    Changed(T),
    Unchanged(UnchangedReason),
}

impl<T> FetchOutcome<T> {
    pub fn is_changed(&self) -> bool {
        matches!(self, FetchOutcome::Changed(_))
    }

    pub fn reason(&self) -> Option<UnchangedReason> {
        match self {
            FetchOutcome::Changed(_) => None,
            FetchOutcome::Unchanged(reason) => Some(*reason),
        }
    }

    pub fn into_changed(self) -> Option<T> {
        match self {
            FetchOutcome::Changed(value) => Some(value),
            FetchOutcome::Unchanged(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Changed(value) => FetchOutcome::Changed(f(value)),
            FetchOutcome::Unchanged(reason) => FetchOutcome::Unchanged(reason),
        }
    }
}

/// What a changed fetch carries, by mode.
#[derive(Debug)]
pub enum Payload {
    Content(Content),
    Stream(FetchStream),
}
