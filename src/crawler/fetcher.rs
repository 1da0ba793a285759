//! HTTP fetcher implementation
//!
//! Every request of a crawl, pages and images alike, goes through one
//! `Fetcher`:
//! - the URL is checked against the allowed domain first
//! - a permit of the global semaphore is held while the request is in flight
//! - each permit holder waits `request_delay` before sending
//! - transient failures are retried with exponential backoff
//! - no new request starts once the crawl is cancelled

use crate::config::Config;
use crate::url::DomainGuard;
use crate::FetchError;
use reqwest::{redirect::Policy, Client, Response};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Maximum number of redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// Retry schedule for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,

    /// Wait before the first retry; doubled for every further one
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are followed only while they stay on the allowed domain; a
/// redirect leaving it is returned to the caller unfollowed.
///
/// # Example
///
/// ```no_run
/// use gallery_harvest::config::load_config;
/// use gallery_harvest::crawler::build_http_client;
/// use std::path::Path;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let guard = DomainGuard::new(&config.crawler.allowed_domain);
    let timeout = config.crawler.timeout();

    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if !guard.is_allowed(attempt.url()) {
                attempt.stop()
            } else {
                attempt.follow()
            }
        }))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Shared, rate-limited HTTP access for one crawl
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    guard: DomainGuard,
    limiter: Arc<Semaphore>,
    request_delay: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Fetcher {
    /// Creates a fetcher with its own client and concurrency limiter
    pub fn new(config: &Config, cancel: CancellationToken) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        let crawler = &config.crawler;

        Ok(Self {
            client,
            guard: DomainGuard::new(&crawler.allowed_domain),
            limiter: Arc::new(Semaphore::new(crawler.max_concurrent_requests.max(1) as usize)),
            request_delay: crawler.request_delay(),
            retry: RetryPolicy {
                max_retries: crawler.max_retries,
                backoff: crawler.retry_backoff(),
            },
            cancel,
        })
    }

    pub fn guard(&self) -> &DomainGuard {
        &self.guard
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetches a page and decodes it as text
    pub async fn fetch_text(&self, url: &Url) -> Result<String, FetchError> {
        self.fetch_with(url, read_text).await
    }

    /// Fetches a binary body, failing with `TooLarge` beyond `limit` bytes
    pub async fn fetch_bytes(&self, url: &Url, limit: u64) -> Result<Vec<u8>, FetchError> {
        self.fetch_with(url, move |response| read_bytes(response, limit))
            .await
    }

    async fn fetch_with<T, F, Fut>(&self, url: &Url, read: F) -> Result<T, FetchError>
    where
        F: Fn(Response) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.guard.check(url)?;

        let mut retry = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled {
                    url: url.to_string(),
                });
            }

            match self.attempt(url, &read).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry);
                    retry += 1;
                    tracing::warn!(
                        "{} (retry {}/{} in {:?})",
                        e,
                        retry,
                        self.retry.max_retries,
                        delay
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(FetchError::Cancelled { url: url.to_string() });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<T, F, Fut>(&self, url: &Url, read: &F) -> Result<T, FetchError>
    where
        F: Fn(Response) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled {
                url: url.to_string(),
            })?;

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                url: url.to_string(),
            });
        }

        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if status.is_redirection() {
            // Only left unfollowed when the target is off-domain
            let target = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| response.url().join(location).ok())
                .map(|target| target.to_string())
                .unwrap_or_else(|| url.to_string());
            return Err(FetchError::DomainRejected { url: target });
        }

        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        read(response).await
    }
}

async fn read_text(response: Response) -> Result<String, FetchError> {
    let url = response.url().clone();
    response.text().await.map_err(|e| classify_error(&url, e))
}

async fn read_bytes(mut response: Response, limit: u64) -> Result<Vec<u8>, FetchError> {
    let url = response.url().clone();
    let too_large = || FetchError::TooLarge {
        url: url.to_string(),
        limit,
    };

    if response.content_length().is_some_and(|len| len > limit) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| classify_error(&url, e))?
    {
        if body.len() as u64 + chunk.len() as u64 > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

fn classify_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
