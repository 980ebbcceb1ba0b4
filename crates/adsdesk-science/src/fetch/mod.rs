//! Full-text retrieval over an ordered list of delivery paths.

pub mod html;
pub mod relay;
pub mod sniff;

use std::sync::Arc;
use std::time::Duration;

use adsdesk_core::{OptionsConfig, ProxyConfig};
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::error::{Result, ScienceError};
use crate::http::{BROWSER_USER_AGENT, build_client};
use crate::record::{CanonicalRecord, DeliveryPath, DocumentLocation, LinkKind};

pub use relay::{Relay, RelaySession, SshRelay};
use sniff::Verdict;

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A verified PDF, consumed once by the reconciler.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub path: DeliveryPath,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchAttempt {
    pub path: DeliveryPath,
    pub url: Option<String>,
    pub reason: String,
}

/// Every path failed. Not an error: the entry is still stored without a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentUnavailable {
    pub attempts: Vec<FetchAttempt>,
}

impl DocumentUnavailable {
    /// Distinct paths tried, in order.
    pub fn attempted_paths(&self) -> Vec<DeliveryPath> {
        let mut paths = Vec::new();
        for attempt in &self.attempts {
            if !paths.contains(&attempt.path) {
                paths.push(attempt.path);
            }
        }
        paths
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(FetchedDocument),
    Unavailable(DocumentUnavailable),
}

struct Body {
    bytes: Vec<u8>,
    content_type: Option<String>,
    url: Url,
}

pub struct DocumentFetcher {
    client: reqwest::Client,
    policy: Vec<DeliveryPath>,
    attempt_timeout: Duration,
    relay: Option<Arc<dyn Relay>>,
}

impl DocumentFetcher {
    pub fn new(attempt_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(BROWSER_USER_AGENT, attempt_timeout, None)?,
            policy: DeliveryPath::DEFAULT_POLICY.to_vec(),
            attempt_timeout,
            relay: None,
        })
    }

    pub fn from_config(options: &OptionsConfig, proxy: &ProxyConfig) -> Result<Self> {
        let fetcher = Self::new(Duration::from_secs(options.fetch_timeout_secs))?;
        Ok(match SshRelay::from_config(proxy) {
            Some(relay) => fetcher.with_relay(Arc::new(relay)),
            None => fetcher,
        })
    }

    pub fn with_policy(mut self, policy: Vec<DeliveryPath>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_relay(mut self, relay: Arc<dyn Relay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Tries each policy path in order and returns the first verified PDF.
    ///
    /// `ProxiedGateway` is skipped entirely when no relay is configured, and
    /// the relay is only contacted if the record advertises gateway links.
    pub async fn fetch(&self, record: &CanonicalRecord) -> FetchOutcome {
        let mut attempts = Vec::new();
        let mut tunnel: Option<(RelaySession, reqwest::Client)> = None;

        for &path in &self.policy {
            if path == DeliveryPath::ProxiedGateway && self.relay.is_none() {
                tracing::debug!(key = %record.dedup_key, "no proxy relay configured, skipping {path}");
                continue;
            }

            let locations = record.locations_for(path);
            if locations.is_empty() {
                attempts.push(FetchAttempt {
                    path,
                    url: None,
                    reason: "no link advertised".to_string(),
                });
                continue;
            }

            let client = if path == DeliveryPath::ProxiedGateway {
                match self.tunnel_client(&mut tunnel).await {
                    Ok(client) => client,
                    Err(e) => {
                        tracing::warn!(key = %record.dedup_key, error = %e, "proxy relay unavailable");
                        attempts.push(FetchAttempt {
                            path,
                            url: None,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                }
            } else {
                self.client.clone()
            };

            for location in locations {
                tracing::debug!(key = %record.dedup_key, %path, url = %location.url, "fetch attempt");
                let result = tokio::time::timeout(self.attempt_timeout, self.try_location(&client, location)).await;
                let reason = match result {
                    Ok(Ok(body)) => {
                        tracing::info!(
                            key = %record.dedup_key,
                            %path,
                            url = %body.url,
                            bytes = body.bytes.len(),
                            "document fetched"
                        );
                        return FetchOutcome::Fetched(FetchedDocument {
                            bytes: body.bytes,
                            content_type: PDF_CONTENT_TYPE.to_string(),
                            path,
                            source_url: body.url.to_string(),
                        });
                    }
                    Ok(Err(reason)) => reason,
                    Err(_) => format!("timed out after {}s", self.attempt_timeout.as_secs_f32()),
                };
                tracing::warn!(key = %record.dedup_key, %path, url = %location.url, %reason, "fetch attempt failed");
                attempts.push(FetchAttempt {
                    path,
                    url: Some(location.url.clone()),
                    reason,
                });
            }
        }

        FetchOutcome::Unavailable(DocumentUnavailable { attempts })
    }

    async fn tunnel_client(
        &self,
        tunnel: &mut Option<(RelaySession, reqwest::Client)>,
    ) -> Result<reqwest::Client> {
        if let Some((_, client)) = tunnel.as_ref() {
            return Ok(client.clone());
        }
        let Some(relay) = self.relay.as_ref() else {
            return Err(ScienceError::Relay("no relay configured".to_string()));
        };
        let session = relay.connect().await?;
        let client = build_client(BROWSER_USER_AGENT, self.attempt_timeout, Some(session.proxy_url()))?;
        *tunnel = Some((session, client.clone()));
        Ok(client)
    }

    async fn try_location(
        &self,
        client: &reqwest::Client,
        location: &DocumentLocation,
    ) -> std::result::Result<Body, String> {
        let body = get(client, &location.url).await?;
        match sniff::sniff(&body.bytes, body.content_type.as_deref()) {
            Verdict::Pdf => Ok(body),
            Verdict::Html if location.kind == LinkKind::Html => {
                let page = String::from_utf8_lossy(&body.bytes);
                let pdf_url = html::derive_pdf_url(&body.url, &page)
                    .ok_or_else(|| format!("no PDF link on landing page {}", body.url))?;
                tracing::debug!(page = %body.url, pdf = %pdf_url, "following PDF link from landing page");

                let pdf = get(client, pdf_url.as_str()).await?;
                match sniff::sniff(&pdf.bytes, pdf.content_type.as_deref()) {
                    Verdict::Pdf => Ok(pdf),
                    Verdict::Html => Err(format!("{pdf_url} returned an HTML page, not a PDF")),
                    Verdict::Other(desc) => Err(format!("{pdf_url}: {desc}")),
                }
            }
            Verdict::Html => Err("HTML page instead of PDF".to_string()),
            Verdict::Other(desc) => Err(desc),
        }
    }
}

async fn get(client: &reqwest::Client, url: &str) -> std::result::Result<Body, String> {
    let resp = client.get(url).send().await.map_err(describe_error)?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status().as_u16()));
    }
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let url = resp.url().clone();
    let bytes = resp.bytes().await.map_err(describe_error)?.to_vec();
    Ok(Body {
        bytes,
        content_type,
        url,
    })
}

fn describe_error(err: reqwest::Error) -> String {
    if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
