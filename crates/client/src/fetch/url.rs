//! Locator canonicalization for consistent cache identifiers.

use std::path::Path;

use url::Url;

/// Error type for locator canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty locator")]
    Empty,

    #[error("invalid locator: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for revisit_core::Error {
    fn from(e: UrlError) -> Self {
        revisit_core::Error::InvalidUrl(e.to_string())
    }
}

fn looks_like_path(input: &str) -> bool {
    input.starts_with('/') || input.starts_with("./") || input.starts_with("../") || Path::new(input).is_absolute()
}

/// Canonicalize a locator string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Filesystem paths become `file://` URLs (relative to the working directory)
/// 3. Default scheme to https:// if missing
/// 4. Lowercase the host
/// 5. Remove fragment (#...)
/// 6. Keep query string intact (do not reorder)
///
/// The scheme is not checked here; transport dispatch decides what is supported.
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    if !trimmed.contains("://") && looks_like_path(trimmed) {
        let path = Path::new(trimmed);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| UrlError::InvalidUrl(e.to_string()))?
                .join(path)
        };
        return Url::from_file_path(&absolute)
            .map_err(|_| UrlError::InvalidUrl(format!("not a usable file path: {}", absolute.display())));
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}
