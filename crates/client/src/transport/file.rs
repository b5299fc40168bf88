//! Local filesystem transport.
//!
//! The etag is synthesized from size, inode and modification time, so an
//! unchanged file is detected from a single `stat` without reading content.

use std::fs::Metadata;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use revisit_core::Error;
use tokio::io::AsyncReadExt;

use super::{
    Body, BodyMode, Response, ResponseMeta, Transport, TransportRequest, epoch_millis, guess_content_type, http_date,
    too_large,
};

const READ_CHUNK: usize = 64 * 1024;

/// `file://` transport.
pub struct FileTransport {
    max_bytes: usize,
}

impl FileTransport {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[cfg(unix)]
fn inode(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode(_metadata: &Metadata) -> u64 {
    0
}

/// Compact weak etag from the stat tuple (size, inode, mtime).
pub fn file_etag(metadata: &Metadata) -> String {
    let mtime = metadata.modified().map(epoch_millis).unwrap_or(0);
    format!("W/\"{:x}-{:x}-{:x}\"", metadata.len(), inode(metadata), mtime)
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    Error::Transport(format!("{}: {e}", path.display()))
}

#[async_trait]
impl Transport for FileTransport {
    fn schemes(&self) -> &[&'static str] {
        &["file"]
    }

    async fn retrieve(&self, request: &TransportRequest) -> Result<Response, Error> {
        let path = request
            .url
            .to_file_path()
            .map_err(|_| Error::InvalidUrl(format!("not a local file path: {}", request.url)))?;

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| io_error(&path, e))?;
        if metadata.is_dir() {
            return Err(Error::Transport(format!("{} is a directory", path.display())));
        }

        let meta = ResponseMeta {
            etag: Some(file_etag(&metadata)),
            last_modified: metadata.modified().ok().map(http_date),
            content_length: Some(metadata.len()),
            content_type: Some(guess_content_type(&path.to_string_lossy())),
            ..ResponseMeta::new(request.url.clone(), 200)
        }
        .with_synthesized_headers();

        if request.conditional.etag.is_some() && request.conditional.etag == meta.etag {
            tracing::debug!(path = %path.display(), "file unchanged since last stat");
            return Ok(Response::not_modified(meta));
        }

        let body = match request.mode {
            BodyMode::Buffered => {
                if metadata.len() > self.max_bytes as u64 {
                    return Err(too_large(metadata.len(), self.max_bytes));
                }
                let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))?;
                Body::Buffered(Bytes::from(bytes))
            }
            BodyMode::Stream => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| io_error(&path, e))?;
                let stream = futures_util::stream::try_unfold((file, path), |(mut file, path)| async move {
                    let mut buf = vec![0u8; READ_CHUNK];
                    let n = match file.read(&mut buf).await {
                        Ok(n) => n,
                        Err(e) => return Err(io_error(&path, e)),
                    };
                    if n == 0 {
                        return Ok(None);
                    }
                    buf.truncate(n);
                    Ok(Some((Bytes::from(buf), (file, path))))
                });
                Body::Stream(Box::pin(stream))
            }
        };

        Ok(Response { meta, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Conditional;
    use futures_util::StreamExt;
    use url::Url;

    fn file_url(path: &Path) -> Url {
        Url::from_file_path(path).unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let transport = FileTransport::new(1024);
        let response = transport
            .retrieve(&TransportRequest::get(file_url(&path), BodyMode::Buffered))
            .await
            .unwrap();

        assert_eq!(response.meta.status, 200);
        assert_eq!(response.meta.content_length, Some(8));
        assert_eq!(response.meta.content_type.as_deref(), Some("text/csv"));
        assert!(response.meta.etag.as_deref().unwrap().starts_with("W/\"8-"));
        assert!(response.meta.last_modified.is_some());
        assert_eq!(response.meta.header("content-length"), Some("8"));
        assert_eq!(response.body.as_bytes().unwrap().as_ref(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_matching_etag_is_not_modified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<p>hi</p>").unwrap();

        let transport = FileTransport::new(1024);
        let first = transport
            .retrieve(&TransportRequest::get(file_url(&path), BodyMode::Buffered))
            .await
            .unwrap();

        let mut request = TransportRequest::get(file_url(&path), BodyMode::Buffered);
        request.conditional = Conditional { etag: first.meta.etag.clone(), last_modified: None };
        let second = transport.retrieve(&request).await.unwrap();

        assert!(second.meta.is_not_modified());
        assert!(second.body.as_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_size_change_changes_etag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.txt");
        std::fs::write(&path, "a").unwrap();
        let before = file_etag(&std::fs::metadata(&path).unwrap());
        std::fs::write(&path, "ab").unwrap();
        let after = file_etag(&std::fs::metadata(&path).unwrap());
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(1024);
        let request = TransportRequest::get(file_url(&dir.path().join("absent")), BodyMode::Buffered);
        assert!(matches!(transport.retrieve(&request).await, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![0u8; 32]).unwrap();
        let transport = FileTransport::new(16);
        let request = TransportRequest::get(file_url(&path), BodyMode::Buffered);
        assert!(matches!(transport.retrieve(&request).await, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_stream_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        let content = "x".repeat(READ_CHUNK + 10);
        std::fs::write(&path, &content).unwrap();

        let transport = FileTransport::new(16);
        let response = transport
            .retrieve(&TransportRequest::get(file_url(&path), BodyMode::Stream))
            .await
            .unwrap();

        let mut stream = response.body.into_stream();
        let mut total = 0;
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            total += chunk.unwrap().len();
            chunks += 1;
        }
        assert_eq!(total, content.len());
        assert!(chunks >= 2);
    }
}
