//! Network transport over reqwest.

use std::time::Instant;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use revisit_core::Error;

use super::{Body, NOT_MODIFIED, Response, ResponseMeta, Transport, TransportConfig, TransportRequest, too_large};

/// HTTP/HTTPS transport.
pub struct HttpTransport {
    http: Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

/// Caller overrides first, then the conditional headers, so validators win.
fn request_headers(request: &TransportRequest) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();

    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidInput(format!("invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }

    if let Some(etag) = &request.conditional.etag {
        let value = HeaderValue::from_str(etag).map_err(|e| Error::InvalidInput(format!("invalid etag: {e}")))?;
        headers.insert(header::IF_NONE_MATCH, value);
    } else if let Some(modified) = &request.conditional.last_modified {
        let value = HeaderValue::from_str(modified)
            .map_err(|e| Error::InvalidInput(format!("invalid last-modified: {e}")))?;
        headers.insert(header::IF_MODIFIED_SINCE, value);
    }

    Ok(headers)
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn response_meta(response: &reqwest::Response) -> ResponseMeta {
    let headers = response.headers();
    ResponseMeta {
        url: response.url().clone(),
        status: response.status().as_u16(),
        etag: header_str(headers, header::ETAG),
        last_modified: header_str(headers, header::LAST_MODIFIED),
        content_length: header_str(headers, header::CONTENT_LENGTH).and_then(|s| s.trim().parse().ok()),
        content_type: header_str(headers, header::CONTENT_TYPE),
        headers: headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn schemes(&self) -> &[&'static str] {
        &["http", "https"]
    }

    async fn retrieve(&self, request: &TransportRequest) -> Result<Response, Error> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request_headers(request)?);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Transport(format!("timeout: {}", e))
            } else {
                Error::Transport(format!("network error: {}", e))
            }
        })?;

        let mut meta = response_meta(&response);

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!(url = %request.url, "not modified");
            return Ok(Response { meta: ResponseMeta { status: NOT_MODIFIED, ..meta }, body: Body::empty() });
        }

        if let Some(len) = meta.content_length
            && len as usize > self.config.max_bytes
        {
            return Err(too_large(len, self.config.max_bytes));
        }

        let body = match request.mode {
            super::BodyMode::Buffered => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Error::Transport(format!("failed to read response: {}", e)))?;

                if bytes.len() > self.config.max_bytes {
                    return Err(too_large(bytes.len() as u64, self.config.max_bytes));
                }
                if meta.content_length.is_none() {
                    meta.content_length = Some(bytes.len() as u64);
                }
                Body::Buffered(bytes)
            }
            super::BodyMode::Stream => {
                let stream = response
                    .bytes_stream()
                    .map_err(|e| Error::Transport(format!("failed to read response: {}", e)));
                Body::Stream(Box::pin(stream))
            }
        };

        tracing::debug!(
            "fetched {} -> {} in {}ms (status {})",
            request.url,
            meta.url,
            start.elapsed().as_millis(),
            meta.status
        );

        Ok(Response { meta, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BodyMode, Conditional};
    use futures_util::StreamExt;
    use httpmock::prelude::*;
    use url::Url;

    fn transport() -> HttpTransport {
        HttpTransport::new(TransportConfig::default()).unwrap()
    }

    #[test]
    fn test_request_headers_conditional_wins() {
        let mut request = TransportRequest::get(Url::parse("https://example.com").unwrap(), BodyMode::Buffered);
        request.headers = vec![("If-None-Match".into(), "\"stale\"".into()), ("X-Token".into(), "abc".into())];
        request.conditional = Conditional { etag: Some("\"fresh\"".into()), last_modified: None };

        let headers = request_headers(&request).unwrap();
        assert_eq!(headers.get(header::IF_NONE_MATCH).unwrap(), "\"fresh\"");
        assert_eq!(headers.get("x-token").unwrap(), "abc");
        assert!(headers.get(header::IF_MODIFIED_SINCE).is_none());
    }

    #[test]
    fn test_request_headers_invalid_name() {
        let mut request = TransportRequest::get(Url::parse("https://example.com").unwrap(), BodyMode::Buffered);
        request.headers = vec![("bad header".into(), "x".into())];
        assert!(matches!(request_headers(&request), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_retrieve_buffered() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/data.json");
                then.status(200)
                    .header("etag", "\"v1\"")
                    .header("content-type", "application/json")
                    .body(r#"{"a":1}"#);
            })
            .await;

        let url = Url::parse(&server.url("/data.json")).unwrap();
        let response = transport()
            .retrieve(&TransportRequest::get(url, BodyMode::Buffered))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.meta.status, 200);
        assert_eq!(response.meta.etag.as_deref(), Some("\"v1\""));
        assert_eq!(response.meta.content_length, Some(7));
        assert_eq!(response.body.as_bytes().unwrap().as_ref(), br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_retrieve_sends_if_none_match() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/page").header("if-none-match", "\"v1\"");
                then.status(304);
            })
            .await;

        let url = Url::parse(&server.url("/page")).unwrap();
        let mut request = TransportRequest::get(url, BodyMode::Buffered);
        request.conditional = Conditional { etag: Some("\"v1\"".into()), last_modified: None };

        let response = transport().retrieve(&request).await.unwrap();
        mock.assert_async().await;
        assert!(response.meta.is_not_modified());
    }

    #[tokio::test]
    async fn test_retrieve_post_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/search").body("q=rust");
                then.status(201).body("ok");
            })
            .await;

        let url = Url::parse(&server.url("/search")).unwrap();
        let mut request = TransportRequest::get(url, BodyMode::Buffered);
        request.method = reqwest::Method::POST;
        request.body = Some(bytes::Bytes::from_static(b"q=rust"));

        let response = transport().retrieve(&request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(response.meta.status, 201);
    }

    #[tokio::test]
    async fn test_retrieve_too_large() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/big");
                then.status(200).body("0123456789");
            })
            .await;

        let config = TransportConfig { max_bytes: 4, ..Default::default() };
        let url = Url::parse(&server.url("/big")).unwrap();
        let result = HttpTransport::new(config)
            .unwrap()
            .retrieve(&TransportRequest::get(url, BodyMode::Buffered))
            .await;
        assert!(matches!(result, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_retrieve_stream() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/stream");
                then.status(200).body("streamed body");
            })
            .await;

        let url = Url::parse(&server.url("/stream")).unwrap();
        let response = transport()
            .retrieve(&TransportRequest::get(url, BodyMode::Stream))
            .await
            .unwrap();

        let Body::Stream(mut stream) = response.body else { panic!("expected stream body") };
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"streamed body");
    }
}
