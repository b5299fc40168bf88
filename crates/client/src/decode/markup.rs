//! Markup document decoding.

use scraper::{Html, Selector};

use super::{Content, Decoder, Format, FormatOptions, utf8};
use revisit_core::Error;

/// A parsed HTML document.
///
/// Holds the re-serialized document rather than the parse tree (which is not
/// `Send`); queries parse on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupDoc {
    html: String,
}

impl MarkupDoc {
    pub fn parse(source: &str) -> Self {
        Self { html: Html::parse_document(source).html() }
    }

    /// Serialized document after parser normalization.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    /// Outer HTML of every element matching a CSS selector.
    pub fn select(&self, css: &str) -> Result<Vec<String>, Error> {
        let selector = parse_selector(css)?;
        Ok(self.document().select(&selector).map(|el| el.html()).collect())
    }

    /// Whitespace-joined text of every element matching a CSS selector.
    pub fn select_text(&self, css: &str) -> Result<Vec<String>, Error> {
        let selector = parse_selector(css)?;
        Ok(self
            .document()
            .select(&selector)
            .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
            .collect())
    }

    pub fn title(&self) -> Option<String> {
        self.select_text("title")
            .ok()
            .and_then(|titles| titles.into_iter().find(|t| !t.is_empty()))
    }
}

fn parse_selector(css: &str) -> Result<Selector, Error> {
    Selector::parse(css).map_err(|e| Error::InvalidInput(format!("invalid selector {css:?}: {e}")))
}

pub struct HtmlDecoder;

impl Decoder for HtmlDecoder {
    fn decode(&self, bytes: &[u8], _options: &FormatOptions) -> Result<Content, Error> {
        let source = utf8(Format::Html, bytes)?;
        Ok(Content::Markup(MarkupDoc::parse(source)))
    }
}
