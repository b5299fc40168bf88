//! XML decoder.
//!
//! Documents become a JSON tree keyed by the root element name. Each element
//! maps to its text when it has neither attributes nor children; otherwise to
//! an object holding attributes under `$`, text under `_` and every child
//! element name mapped to an array of occurrences.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

use super::{Content, Decoder, Format, FormatOptions, decode_error};
use revisit_core::Error;

pub struct XmlDecoder;

#[derive(Default)]
struct Element {
    name: String,
    attrs: Map<String, Value>,
    text: String,
    children: Map<String, Value>,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, Error> {
        let mut attrs = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| decode_error(Format::Xml, e))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|e| decode_error(Format::Xml, e))?;
            attrs.insert(key, Value::String(value.into_owned()));
        }
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        Ok(Self { name, attrs, ..Default::default() })
    }

    fn push_child(&mut self, name: String, value: Value) {
        match self.children.entry(name).or_insert_with(|| Value::Array(Vec::new())) {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![value]),
        }
    }

    fn finish(self) -> (String, Value) {
        let text = self.text.trim().to_string();
        if self.attrs.is_empty() && self.children.is_empty() {
            return (self.name, Value::String(text));
        }

        let mut object = Map::new();
        if !self.attrs.is_empty() {
            object.insert("$".into(), Value::Object(self.attrs));
        }
        if !text.is_empty() {
            object.insert("_".into(), Value::String(text));
        }
        object.extend(self.children);
        (self.name, Value::Object(object))
    }
}

impl Decoder for XmlDecoder {
    fn decode(&self, bytes: &[u8], _options: &FormatOptions) -> Result<Content, Error> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<(String, Value)> = None;

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| decode_error(Format::Xml, e))?;
            match event {
                Event::Start(start) => stack.push(Element::open(&start)?),
                Event::Empty(start) => {
                    let (name, value) = Element::open(&start)?.finish();
                    attach(&mut stack, &mut root, name, value)?;
                }
                Event::End(_) => {
                    let Some(element) = stack.pop() else {
                        return Err(decode_error(Format::Xml, "unexpected closing tag"));
                    };
                    let (name, value) = element.finish();
                    attach(&mut stack, &mut root, name, value)?;
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        let text = text.unescape().map_err(|e| decode_error(Format::Xml, e))?;
                        top.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(decode_error(Format::Xml, format!("unclosed element <{}>", open.name)));
        }
        let (name, value) = root.ok_or_else(|| decode_error(Format::Xml, "no root element"))?;
        let mut document = Map::new();
        document.insert(name, value);
        Ok(Content::Json(Value::Object(document)))
    }
}

fn attach(
    stack: &mut [Element], root: &mut Option<(String, Value)>, name: String, value: Value,
) -> Result<(), Error> {
    match stack.last_mut() {
        Some(parent) => parent.push_child(name, value),
        None if root.is_none() => *root = Some((name, value)),
        None => return Err(decode_error(Format::Xml, "multiple root elements")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(source: &str) -> Result<Content, Error> {
        XmlDecoder.decode(source.as_bytes(), &FormatOptions::for_format(Format::Xml))
    }

    #[test]
    fn test_text_only_elements() {
        let content = decode("<feed><title>News</title><title>More</title></feed>").unwrap();
        assert_eq!(content, Content::Json(json!({"feed": {"title": ["News", "More"]}})));
    }

    #[test]
    fn test_attributes_and_text() {
        let content = decode(r#"<?xml version="1.0"?><item id="7" kind="a &amp; b">body</item>"#).unwrap();
        assert_eq!(content, Content::Json(json!({"item": {"$": {"id": "7", "kind": "a & b"}, "_": "body"}})));
    }

    #[test]
    fn test_empty_and_cdata() {
        let content = decode("<root><empty/><raw><![CDATA[<b>x</b>]]></raw></root>").unwrap();
        assert_eq!(content, Content::Json(json!({"root": {"empty": [""], "raw": ["<b>x</b>"]}})));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(decode("<a><b></a>"), Err(Error::Decode { format, .. }) if format == "xml"));
        assert!(matches!(decode("<a>"), Err(Error::Decode { .. })));
        assert!(matches!(decode(""), Err(Error::Decode { .. })));
    }
}
