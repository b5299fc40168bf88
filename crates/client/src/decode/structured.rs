//! Structured-text and structured-list decoders.
//!
//! Everything decodes to a `serde_json::Value` so the processed hash is
//! computed over one canonical value model whatever the source syntax.

use serde_json::Value;

use super::{Content, Decoder, Format, FormatOptions, decode_error};
use revisit_core::Error;

pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, bytes: &[u8], _options: &FormatOptions) -> Result<Content, Error> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| decode_error(Format::Json, e))?;
        Ok(Content::Json(value))
    }
}

/// One JSON value per line; blank lines are skipped.
pub struct NdjsonDecoder;

impl Decoder for NdjsonDecoder {
    fn decode(&self, bytes: &[u8], _options: &FormatOptions) -> Result<Content, Error> {
        let items = serde_json::Deserializer::from_slice(bytes)
            .into_iter::<Value>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| decode_error(Format::Ndjson, e))?;
        Ok(Content::Json(Value::Array(items)))
    }
}

#[cfg(feature = "yaml")]
pub struct YamlDecoder;

#[cfg(feature = "yaml")]
impl Decoder for YamlDecoder {
    fn decode(&self, bytes: &[u8], _options: &FormatOptions) -> Result<Content, Error> {
        let value: Value = serde_yaml::from_slice(bytes).map_err(|e| decode_error(Format::Yaml, e))?;
        Ok(Content::Json(value))
    }
}

#[cfg(feature = "toml")]
pub struct TomlDecoder;

#[cfg(feature = "toml")]
impl Decoder for TomlDecoder {
    fn decode(&self, bytes: &[u8], _options: &FormatOptions) -> Result<Content, Error> {
        let source = super::utf8(Format::Toml, bytes)?;
        let table: toml::Table = source.parse().map_err(|e| decode_error(Format::Toml, e))?;
        let value = serde_json::to_value(table).map_err(|e| decode_error(Format::Toml, e))?;
        Ok(Content::Json(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(format: Format) -> FormatOptions {
        FormatOptions::for_format(format)
    }

    #[test]
    fn test_json() {
        let content = JsonDecoder.decode(br#"{"a": [1, 2]}"#, &options(Format::Json)).unwrap();
        assert_eq!(content, Content::Json(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_json_failure() {
        let result = JsonDecoder.decode(b"{not json", &options(Format::Json));
        assert!(matches!(result, Err(Error::Decode { format, .. }) if format == "json"));
    }

    #[test]
    fn test_ndjson() {
        let content = NdjsonDecoder
            .decode(b"{\"id\":1}\n\n{\"id\":2}\n", &options(Format::Ndjson))
            .unwrap();
        assert_eq!(content, Content::Json(json!([{"id": 1}, {"id": 2}])));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_yaml() {
        let content = YamlDecoder
            .decode(b"name: revisit\ntags:\n  - a\n  - b\n", &options(Format::Yaml))
            .unwrap();
        assert_eq!(content, Content::Json(json!({"name": "revisit", "tags": ["a", "b"]})));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml() {
        let content = TomlDecoder
            .decode(b"[server]\nport = 8080\n", &options(Format::Toml))
            .unwrap();
        assert_eq!(content, Content::Json(json!({"server": {"port": 8080}})));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_failure() {
        let result = TomlDecoder.decode(b"= nope", &options(Format::Toml));
        assert!(matches!(result, Err(Error::Decode { format, .. }) if format == "toml"));
    }
}
