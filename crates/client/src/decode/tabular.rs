//! Delimited text (csv, tsv, ssv).

use serde_json::{Map, Value};

use super::{Content, Decoder, Format, FormatOptions, decode_error};
use revisit_core::Error;

pub struct TabularDecoder {
    format: Format,
}

impl TabularDecoder {
    pub fn new(format: Format) -> Self {
        Self { format }
    }
}

impl Decoder for TabularDecoder {
    /// With a header row each record becomes an object keyed by column name;
    /// without one, an array of fields. Ragged rows are accepted.
    fn decode(&self, bytes: &[u8], options: &FormatOptions) -> Result<Content, Error> {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(options.delimiter)
            .quote(options.quote)
            .has_headers(options.header)
            .flexible(true);
        match options.escape {
            Some(escape) => builder.escape(Some(escape)).double_quote(false),
            None => builder.escape(None).double_quote(true),
        };
        let mut reader = builder.from_reader(bytes);

        let headers = if options.header {
            Some(reader.headers().map_err(|e| decode_error(self.format, e))?.clone())
        } else {
            None
        };

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| decode_error(self.format, e))?;
            let row = match &headers {
                Some(headers) => {
                    let fields: Map<String, Value> = headers
                        .iter()
                        .zip(record.iter())
                        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                        .collect();
                    Value::Object(fields)
                }
                None => Value::Array(record.iter().map(|v| Value::String(v.to_string())).collect()),
            };
            rows.push(row);
        }

        Ok(Content::Json(Value::Array(rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_with_header() {
        let decoder = TabularDecoder::new(Format::Csv);
        let content = decoder
            .decode(b"name,qty\napple,3\n\"pear, green\",5\n", &FormatOptions::for_format(Format::Csv))
            .unwrap();
        assert_eq!(
            content,
            Content::Json(json!([
                {"name": "apple", "qty": "3"},
                {"name": "pear, green", "qty": "5"},
            ]))
        );
    }

    #[test]
    fn test_tsv_without_header() {
        let decoder = TabularDecoder::new(Format::Tsv);
        let options = FormatOptions { header: false, ..FormatOptions::for_format(Format::Tsv) };
        let content = decoder.decode(b"a\tb\n1\t2\n", &options).unwrap();
        assert_eq!(content, Content::Json(json!([["a", "b"], ["1", "2"]])));
    }

    #[test]
    fn test_ssv_escape() {
        let decoder = TabularDecoder::new(Format::Ssv);
        let content = decoder
            .decode(b"k;v\nx;\"say \\\"hi\\\"\"\n", &FormatOptions::for_format(Format::Ssv))
            .unwrap();
        assert_eq!(content, Content::Json(json!([{"k": "x", "v": "say \"hi\""}])));
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let decoder = TabularDecoder::new(Format::Csv);
        let result = decoder.decode(b"h\n\xff\xfe\n", &FormatOptions::for_format(Format::Csv));
        assert!(matches!(result, Err(Error::Decode { format, .. }) if format == "csv"));
    }
}
