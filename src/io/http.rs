use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::FetchError;

/// Whole-body HTTP downloader with retry on transient connection failures.
pub struct HttpFetcher {
    client: Client,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpFetcher {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_RETRY: u32 = 3;

    pub fn new(timeout: Duration, max_retry: u32) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, max_retry))
    }

    pub fn with_client(client: Client, max_retry: u32) -> Self {
        Self {
            client,
            transferred_bytes: AtomicU64::new(0),
            max_retry: max_retry.max(1),
        }
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// GET `url` and return its body.
    ///
    /// Timeouts and connection failures are retried with a linear back-off;
    /// any other error, or a non-success status, fails immediately.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut retry_count = 0;

        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        return Err(FetchError::Status(resp.status()));
                    }
                    let bytes = resp.bytes().await?;
                    self.transferred_bytes
                        .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    return Ok(bytes.to_vec());
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        return Err(FetchError::RetriesExhausted(retry_count));
                    }
                    tracing::warn!(
                        "connection error, retry {}/{}: {}",
                        retry_count,
                        self.max_retry,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(retry_count))).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        let client = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(client, Self::DEFAULT_MAX_RETRY)
    }
}
