//! Decoder capability registry.
//!
//! ### Format tags
//! - Tabular text: `csv`, `tsv`, `ssv` (feature `tabular`)
//! - Spreadsheet: `xlsx` (feature `xlsx`)
//! - Structured text: `json`, `yaml` (feature `yaml`), `xml` (feature `xml`)
//! - Markup document: `html`
//! - Binary document: `pdf`
//! - Config-like: `toml` (feature `toml`)
//! - Structured list: `ndjson`
//!
//! ### Optional capabilities
//! The registry only holds decoders whose backend is compiled in. Asking for
//! any other tag yields `DecoderUnavailable`, a normal and checkable state;
//! `pdf` has no built-in backend, and callers can register their own for it
//! or for any tag whose feature is disabled.

pub mod markup;
#[cfg(feature = "xlsx")]
pub mod sheet;
pub mod structured;
#[cfg(feature = "tabular")]
pub mod tabular;
#[cfg(feature = "xml")]
pub mod xml;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use revisit_core::{Error, fingerprint, hash_bytes};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub use markup::MarkupDoc;

/// Decode format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Csv,
    Tsv,
    Ssv,
    Xlsx,
    Json,
    Yaml,
    Xml,
    Html,
    Pdf,
    Toml,
    Ndjson,
}

impl Format {
    pub const ALL: [Format; 11] = [
        Format::Csv,
        Format::Tsv,
        Format::Ssv,
        Format::Xlsx,
        Format::Json,
        Format::Yaml,
        Format::Xml,
        Format::Html,
        Format::Pdf,
        Format::Toml,
        Format::Ndjson,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Tsv => "tsv",
            Format::Ssv => "ssv",
            Format::Xlsx => "xlsx",
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Xml => "xml",
            Format::Html => "html",
            Format::Pdf => "pdf",
            Format::Toml => "toml",
            Format::Ndjson => "ndjson",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        match tag.as_str() {
            "yml" => Ok(Format::Yaml),
            "htm" => Ok(Format::Html),
            "jsonl" => Ok(Format::Ndjson),
            _ => Format::ALL
                .into_iter()
                .find(|f| f.as_str() == tag)
                .ok_or_else(|| Error::InvalidInput(format!("unknown format tag: {s}"))),
        }
    }
}

/// Per-format decoding options. Only the tabular decoders read them today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: Option<u8>,
    /// First row holds column names.
    pub header: bool,
}

impl FormatOptions {
    /// Defaults for a format tag.
    pub fn for_format(format: Format) -> Self {
        let delimiter = match format {
            Format::Tsv => b'\t',
            Format::Ssv => b';',
            _ => b',',
        };
        Self { delimiter, quote: b'"', escape: Some(b'\\'), header: true }
    }
}

/// A retrieved value after decoding and postprocessing.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Undecoded bytes (no format tag, no charset).
    Bytes(Bytes),
    /// Transcoded text (charset set, no format tag).
    Text(String),
    /// Structured data from any structured decoder.
    Json(serde_json::Value),
    /// Parsed markup document.
    Markup(MarkupDoc),
}

impl Content {
    pub fn kind(&self) -> &'static str {
        match self {
            Content::Bytes(_) => "bytes",
            Content::Text(_) => "text",
            Content::Json(_) => "json",
            Content::Markup(_) => "markup",
        }
    }

    /// Processed-content hash.
    ///
    /// Bytes are hashed as-is; other values go through the canonical
    /// fingerprint, so source formatting that decodes to the same value
    /// yields the same hash.
    pub fn fingerprint(&self) -> Result<String, Error> {
        match self {
            Content::Bytes(bytes) => Ok(hash_bytes(bytes)),
            Content::Text(text) => fingerprint(&json!({ "text": text })),
            Content::Json(value) => fingerprint(&json!({ "json": value })),
            Content::Markup(doc) => fingerprint(&json!({ "html": doc.html() })),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Content::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A decoder for one family of formats.
///
/// Implementations must be pure with respect to their input.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8], options: &FormatOptions) -> Result<Content, Error>;
}

/// Mapping from format tag to the decoder available for it.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<Format, Arc<dyn Decoder>>,
}

impl DecoderRegistry {
    /// An empty registry; every format is unavailable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every decoder compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Format::Json, Arc::new(structured::JsonDecoder));
        registry.register(Format::Ndjson, Arc::new(structured::NdjsonDecoder));
        registry.register(Format::Html, Arc::new(markup::HtmlDecoder));

        #[cfg(feature = "yaml")]
        registry.register(Format::Yaml, Arc::new(structured::YamlDecoder));

        #[cfg(feature = "toml")]
        registry.register(Format::Toml, Arc::new(structured::TomlDecoder));

        #[cfg(feature = "xml")]
        registry.register(Format::Xml, Arc::new(xml::XmlDecoder));

        #[cfg(feature = "xlsx")]
        registry.register(Format::Xlsx, Arc::new(sheet::XlsxDecoder));

        #[cfg(feature = "tabular")]
        for format in [Format::Csv, Format::Tsv, Format::Ssv] {
            registry.register(format, Arc::new(tabular::TabularDecoder::new(format)));
        }

        registry
    }

    /// Register (or replace) the decoder for a format.
    pub fn register(&mut self, format: Format, decoder: Arc<dyn Decoder>) -> &mut Self {
        self.decoders.insert(format, decoder);
        self
    }

    pub fn is_available(&self, format: Format) -> bool {
        self.decoders.contains_key(&format)
    }

    /// Formats with a registered decoder, in tag order.
    pub fn available(&self) -> Vec<Format> {
        Format::ALL.into_iter().filter(|f| self.is_available(*f)).collect()
    }

    /// The decoder for `format`, or `DecoderUnavailable`.
    pub fn get(&self, format: Format) -> Result<Arc<dyn Decoder>, Error> {
        self.decoders
            .get(&format)
            .cloned()
            .ok_or_else(|| Error::DecoderUnavailable(format.to_string()))
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("available", &self.available())
            .finish()
    }
}

pub(crate) fn decode_error(format: Format, message: impl fmt::Display) -> Error {
    Error::Decode { format: format.to_string(), message: message.to_string() }
}

pub(crate) fn utf8(format: Format, bytes: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(bytes).map_err(|e| decode_error(format, e))
}
