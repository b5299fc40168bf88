//! Spreadsheet decoder.
//!
//! A workbook decodes to an object mapping each sheet name to its rows, each
//! row an array of cell values. Dates render as `YYYY-MM-DD`, or with a time
//! part when one is present.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use chrono::Timelike;
use serde_json::{Map, Number, Value};

use super::{Content, Decoder, Format, FormatOptions, decode_error};
use revisit_core::Error;

pub struct XlsxDecoder;

impl Decoder for XlsxDecoder {
    fn decode(&self, bytes: &[u8], _options: &FormatOptions) -> Result<Content, Error> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec())).map_err(|e| decode_error(Format::Xlsx, e))?;

        let mut sheets = Map::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| decode_error(Format::Xlsx, e))?;
            let rows = range
                .rows()
                .map(|row| Value::Array(row.iter().map(cell_value).collect()))
                .collect();
            sheets.insert(name, Value::Array(rows));
        }
        Ok(Content::Json(Value::Object(sheets)))
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(n) => Value::from(*n),
        Data::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(dt) if dt.time().num_seconds_from_midnight() == 0 => Value::String(dt.format("%Y-%m-%d").to_string()),
            Some(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => Number::from_f64(dt.as_f64()).map_or(Value::Null, Value::Number),
        },
        Data::Error(e) => Value::String(format!("{e:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_values() {
        assert_eq!(cell_value(&Data::Empty), Value::Null);
        assert_eq!(cell_value(&Data::Int(3)), json!(3));
        assert_eq!(cell_value(&Data::Float(1.5)), json!(1.5));
        assert_eq!(cell_value(&Data::Float(f64::NAN)), Value::Null);
        assert_eq!(cell_value(&Data::Bool(true)), json!(true));
        assert_eq!(cell_value(&Data::String("x".into())), json!("x"));
        assert_eq!(cell_value(&Data::DateTimeIso("2024-01-02".into())), json!("2024-01-02"));
    }

    #[test]
    fn test_not_a_workbook() {
        let result = XlsxDecoder.decode(b"plain text", &FormatOptions::for_format(Format::Xlsx));
        assert!(matches!(result, Err(Error::Decode { format, .. }) if format == "xlsx"));
    }
}
