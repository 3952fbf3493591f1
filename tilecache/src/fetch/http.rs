//! HTTP client abstraction for testability.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;

use super::FetchError;

/// Default upper bound for a single upstream request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for HTTP POST operations.
///
/// This abstraction allows dependency injection and easier testing by
/// enabling mock HTTP clients in tests.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an HTTP POST request with the given body.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    /// * `body` - The request body
    ///
    /// # Returns
    ///
    /// The response body as bytes, or an error.
    fn post(&self, url: &str, body: String) -> BoxFuture<'_, Result<Bytes, FetchError>>;
}

/// Real HTTP client implementation using reqwest.
///
/// The timeout applies to the whole request; a request that exceeds it fails
/// with `FetchError::Unavailable`.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a new client with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Creates a new client with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    fn post(&self, url: &str, body: String) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        let url = url.to_owned();
        Box::pin(async move {
            let response = self
                .client
                .post(&url)
                .body(body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        FetchError::Unavailable(format!("request to {url} timed out"))
                    } else {
                        FetchError::Unavailable(format!("request failed: {e}"))
                    }
                })?;

            if !response.status().is_success() {
                return Err(FetchError::Unavailable(format!(
                    "HTTP {} from {}",
                    response.status(),
                    url
                )));
            }

            response
                .bytes()
                .await
                .map_err(|e| FetchError::Unavailable(format!("failed to read response: {e}")))
        })
    }
}
