//! Thin request helper shared by adapters and the downloader.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::retry::{RetryConfig, with_retry};

use super::error::{SourceError, snippet};
use super::rate_limit::ApiRateLimiter;

/// Wraps an [`HttpTransport`] with optional pacing and transient-error retry.
#[derive(Clone)]
pub struct SourceClient {
    transport: Arc<dyn HttpTransport>,
    limiter: Option<ApiRateLimiter>,
    retry: RetryConfig,
}

impl SourceClient {
    /// A client that neither paces nor retries.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            limiter: None,
            retry: RetryConfig::disabled(),
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: ApiRateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Send a request and return the response whatever its status.
    ///
    /// Only transport failures are errors here.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SourceError> {
        if let Some(limiter) = &self.limiter {
            limiter.wait().await;
        }
        let url = request.url.clone();
        self.transport
            .send(request)
            .await
            .map_err(|source| SourceError::Http { url, source })
    }

    /// Send a request and require a 2xx answer, retrying transient failures.
    pub async fn send_ok(&self, request: HttpRequest) -> Result<HttpResponse, SourceError> {
        with_retry(
            || {
                let request = request.clone();
                async move {
                    let response = self.send(request.clone()).await?;
                    if response.is_success() {
                        Ok(response)
                    } else {
                        Err(SourceError::Status {
                            url: request.url,
                            status: response.status,
                            snippet: snippet(&response.text()),
                        })
                    }
                }
            },
            self.retry.clone(),
            SourceError::is_transient,
            &request.url,
            None,
        )
        .await
    }

    /// GET `url` and return its body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        Ok(self.send_ok(HttpRequest::get(url)).await?.text())
    }

    /// Decode a JSON body, reporting a snippet on failure.
    pub fn decode_json<T: DeserializeOwned>(
        url: &str,
        response: &HttpResponse,
    ) -> Result<T, SourceError> {
        serde_json::from_slice(&response.body).map_err(|e| {
            SourceError::malformed(url, format!("{e}; body: {}", snippet(&response.text())))
        })
    }
}

impl std::fmt::Debug for SourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceClient")
            .field("limiter", &self.limiter)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
