//! In-content (HTML meta-refresh) redirect following.

use scraper::{Html, Selector};
use url::Url;

use crate::transport::{Response, Transport, TransportRequest};
use revisit_core::Error;

/// Maximum number of meta-refresh hops followed for one fetch.
pub const MAX_META_REDIRECTS: usize = 5;

/// Find a refresh directive in an HTML document and resolve its target
/// against `base`.
///
/// Accepts `N; url=target`, `N;URL='target'` and `N, target`. A directive
/// without a target (plain reload) yields `None`.
pub fn find_meta_refresh(html: &str, base: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("meta[http-equiv][content]").ok()?;

    document
        .select(&selector)
        .filter(|el| {
            el.value()
                .attr("http-equiv")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("refresh"))
        })
        .filter_map(|el| el.value().attr("content"))
        .find_map(|content| refresh_target(content).and_then(|target| base.join(target).ok()))
}

fn refresh_target(content: &str) -> Option<&str> {
    let (_, rest) = content.split_once([';', ','])?;
    let rest = rest.trim();
    let rest = match rest.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("url") => {
            let after = rest[3..].trim_start();
            after.strip_prefix('=').map(str::trim_start).unwrap_or(rest)
        }
        _ => rest,
    };
    let target = rest.trim_matches(|c| c == '\'' || c == '"').trim();
    (!target.is_empty()).then_some(target)
}

/// Whether a response is eligible for meta-refresh scanning.
fn is_refreshable(response: &Response) -> bool {
    matches!(response.meta.url.scheme(), "http" | "https") && response.meta.status == 200 && response.meta.is_html()
}

/// Follow meta-refresh redirects starting from `first`, re-issuing `request`
/// against each new target.
///
/// Stops at a self-referencing target or after [`MAX_META_REDIRECTS`] hops,
/// returning the last response either way.
pub async fn resolve(transport: &dyn Transport, request: &TransportRequest, first: Response) -> Result<Response, Error> {
    let mut current = first;

    for hop in 1..=MAX_META_REDIRECTS {
        if !is_refreshable(&current) {
            break;
        }
        let Some(body) = current.body.as_bytes() else { break };
        let Some(target) = find_meta_refresh(&String::from_utf8_lossy(body), &current.meta.url) else {
            break;
        };
        if target == current.meta.url {
            tracing::debug!(url = %target, "meta refresh points at itself, stopping");
            break;
        }

        tracing::debug!(from = %current.meta.url, to = %target, hop, "following meta refresh");
        current = transport.retrieve(&request.retarget(target)).await?;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Body, BodyMode, ResponseMeta};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    fn base() -> Url {
        Url::parse("https://example.com/dir/page.html").unwrap()
    }

    #[test]
    fn test_find_meta_refresh_forms() {
        let cases = [
            (r#"<meta http-equiv="refresh" content="0; url=/next">"#, "https://example.com/next"),
            (r#"<meta http-equiv="Refresh" content="5;URL='other.html'">"#, "https://example.com/dir/other.html"),
            (r#"<meta http-equiv="REFRESH" content="0, https://elsewhere.org/">"#, "https://elsewhere.org/"),
            (r#"<meta http-equiv="refresh" content="1; url = &quot;a.html&quot;">"#, "https://example.com/dir/a.html"),
        ];
        for (html, expected) in cases {
            assert_eq!(find_meta_refresh(html, &base()).unwrap().as_str(), expected, "{html}");
        }
    }

    #[test]
    fn test_find_meta_refresh_none() {
        assert!(find_meta_refresh(r#"<meta http-equiv="refresh" content="30">"#, &base()).is_none());
        assert!(find_meta_refresh(r#"<meta name="refresh" content="0; url=/x">"#, &base()).is_none());
        assert!(find_meta_refresh("<p>plain</p>", &base()).is_none());
    }

    /// Serves `/page{n}` documents that each refresh to `/page{n+1}`.
    struct Chain {
        served: Mutex<Vec<String>>,
        self_loop: bool,
    }

    #[async_trait]
    impl Transport for Chain {
        fn schemes(&self) -> &[&'static str] {
            &["https"]
        }

        async fn retrieve(&self, request: &TransportRequest) -> Result<Response, Error> {
            self.served.lock().unwrap().push(request.url.path().to_string());
            Ok(page(&request.url, self.self_loop))
        }
    }

    fn page(url: &Url, self_loop: bool) -> Response {
        let n: usize = url.path().trim_start_matches("/page").parse().unwrap();
        let target = if self_loop { url.path().to_string() } else { format!("/page{}", n + 1) };
        let html = format!(r#"<html><head><meta http-equiv="refresh" content="0; url={target}"></head></html>"#);
        let meta = ResponseMeta { content_type: Some("text/html".into()), ..ResponseMeta::new(url.clone(), 200) };
        Response { meta, body: Body::Buffered(Bytes::from(html)) }
    }

    #[tokio::test]
    async fn test_chain_is_bounded() {
        let transport = Chain { served: Mutex::new(Vec::new()), self_loop: false };
        let url = Url::parse("https://example.com/page0").unwrap();
        let request = TransportRequest::get(url.clone(), BodyMode::Buffered);

        let last = resolve(&transport, &request, page(&url, false)).await.unwrap();

        assert_eq!(last.meta.url.path(), "/page5");
        assert_eq!(*transport.served.lock().unwrap(), vec!["/page1", "/page2", "/page3", "/page4", "/page5"]);
    }

    #[tokio::test]
    async fn test_self_loop_stops_immediately() {
        let transport = Chain { served: Mutex::new(Vec::new()), self_loop: true };
        let url = Url::parse("https://example.com/page0").unwrap();
        let request = TransportRequest::get(url.clone(), BodyMode::Buffered);

        let last = resolve(&transport, &request, page(&url, true)).await.unwrap();

        assert_eq!(last.meta.url.path(), "/page0");
        assert!(transport.served.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_html_is_not_scanned() {
        let transport = Chain { served: Mutex::new(Vec::new()), self_loop: false };
        let url = Url::parse("https://example.com/page0").unwrap();
        let mut first = page(&url, false);
        first.meta.content_type = Some("text/plain".into());

        let last = resolve(&transport, &TransportRequest::get(url, BodyMode::Buffered), first).await.unwrap();
        assert_eq!(last.meta.url.path(), "/page0");
        assert!(transport.served.lock().unwrap().is_empty());
    }
}
