use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::{Result, ScienceError};

/// Publisher sites often refuse non-browser agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub fn build_client(user_agent: &str, timeout: Duration, proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .gzip(true)
        .timeout(timeout);
    if let Some(proxy_url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }
    Ok(builder.build()?)
}

// ─── RateLimitedClient ────────────────────────────────────────────────────────

pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    max_retries: u32,
    backoff: Duration,
    max_retry_after: Duration,
}

impl RateLimitedClient {
    pub fn new(
        min_interval: Duration,
        max_retries: u32,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(user_agent, timeout, None)?,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            max_retries,
            backoff: Duration::from_secs(2),
            max_retry_after: Duration::from_secs(30),
        })
    }

    /// Base delay for transient failures and the upper bound applied to
    /// server-supplied `Retry-After` values.
    pub fn with_backoff(mut self, backoff: Duration, max_retry_after: Duration) -> Self {
        self.backoff = backoff;
        self.max_retry_after = max_retry_after;
        self
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, headers: HeaderMap) -> Result<T> {
        let resp = self
            .send_with_retry(url, || self.client.get(url).headers(headers.clone()))
            .await?;
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }

    pub async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        headers: HeaderMap,
    ) -> Result<R> {
        let resp = self
            .send_with_retry(url, || {
                self.client.post(url).headers(headers.clone()).json(body)
            })
            .await?;
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }

    /// Retries network failures, 429 and 5xx up to `max_retries` times.
    /// Any other non-success status is returned immediately.
    async fn send_with_retry<F>(&self, url: &str, request: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            let wait = match request().send().await {
                Ok(r) if r.status().is_success() => return Ok(r),
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = retry_after_secs(r.headers());
                    if attempt >= self.max_retries {
                        return Err(ScienceError::RateLimit(
                            url.to_string(),
                            retry_after.unwrap_or(0),
                        ));
                    }
                    retry_after
                        .map(Duration::from_secs)
                        .unwrap_or(self.backoff)
                        .min(self.max_retry_after)
                }
                Ok(r) if r.status().is_server_error() && attempt < self.max_retries => {
                    self.backoff * 2u32.pow(attempt)
                }
                Ok(r) => {
                    return Err(ScienceError::Status {
                        url: url.to_string(),
                        status: r.status().as_u16(),
                    });
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(ScienceError::Http(e));
                    }
                    self.backoff * 2u32.pow(attempt)
                }
            };
            tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, url, "retrying request");
            sleep(wait).await;
            attempt += 1;
        }
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}
