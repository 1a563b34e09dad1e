//! Data sources: random-access readers for archives and whole-file fetching
//! for animation sources.

mod http;
mod local;
mod memory;
mod uri;

pub use http::HttpFetcher;
pub use local::LocalFileReader;
pub use memory::MemoryReader;
pub use uri::{InvalidUri, SourceUri};

use async_trait::async_trait;
use thiserror::Error;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP request failed with status: {0}")]
    Status(reqwest::StatusCode),
    #[error("gave up after {0} attempts")]
    RetriesExhausted(u32),
}

impl FetchError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status(status) => status.is_server_error() || status.as_u16() == 429,
            FetchError::RetriesExhausted(_) => true,
        }
    }
}

/// Whole-file transport for animation and archive sources.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, uri: &SourceUri) -> Result<Vec<u8>, FetchError>;
}

/// Default transport: local paths through `tokio::fs`, remote URLs through
/// [`HttpFetcher`].
pub struct Transport {
    http: HttpFetcher,
}

impl Transport {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &HttpFetcher {
        &self.http
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(HttpFetcher::default())
    }
}

#[async_trait]
impl Fetch for Transport {
    async fn fetch(&self, uri: &SourceUri) -> Result<Vec<u8>, FetchError> {
        match uri {
            SourceUri::Local(path) => Ok(tokio::fs::read(path).await?),
            SourceUri::Remote(url) => self.http.get(url.as_str()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_reads_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        std::fs::write(&path, b"{\"v\":1}").unwrap();

        let data = Transport::default()
            .fetch(&SourceUri::Local(path))
            .await
            .unwrap();
        assert_eq!(data, b"{\"v\":1}");
    }

    #[tokio::test]
    async fn missing_local_file_is_not_transient() {
        let dir = tempfile::tempdir().unwrap();
        let err = Transport::default()
            .fetch(&SourceUri::Local(dir.path().join("nope.json")))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(FetchError::Status(reqwest::StatusCode::BAD_GATEWAY).is_transient());
        assert!(!FetchError::Status(reqwest::StatusCode::NOT_FOUND).is_transient());
    }
}
