use std::time::Duration;

use adsdesk_core::AdsConfig;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::error::{Result, ScienceError, Unavailable};
use crate::http::RateLimitedClient;
use crate::identifiers::Identifier;
use crate::record::{Candidate, CanonicalRecord};

use super::normalize::{self, ADS_LINK_GATEWAY};
use super::types::{ExportRequest, ExportResponse, SEARCH_FIELDS, SearchResponse};

const USER_AGENT: &str = "adsdesk/0.1";
const DEFAULT_BASE_URL: &str = "https://api.adsabs.harvard.edu/v1";
/// Rows requested per search; enough to list candidates for an ambiguous query.
const MAX_ROWS: usize = 10;

/// Client for the NASA ADS search and export APIs.
pub struct AdsClient {
    client: RateLimitedClient,
    base_url: String,
    gateway_url: String,
    token: Option<String>,
}

impl AdsClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_params(DEFAULT_BASE_URL, ADS_LINK_GATEWAY, token, Duration::from_secs(30))
    }

    pub fn from_config(config: &AdsConfig, token: Option<String>) -> Result<Self> {
        Self::with_params(
            &config.base_url,
            ADS_LINK_GATEWAY,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_params(
        base_url: &str,
        gateway_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        // One retry at most: hammering a throttled ADS only extends the throttle.
        let client = RateLimitedClient::new(Duration::from_millis(100), 1, USER_AGENT, timeout)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests(server_url: &str, token: Option<&str>) -> Self {
        let mut client = Self::with_params(
            server_url,
            &format!("{server_url}/link_gateway"),
            token.map(ToOwned::to_owned),
            Duration::from_secs(5),
        )
        .unwrap();
        client.client = RateLimitedClient::new(Duration::ZERO, 1, USER_AGENT, Duration::from_secs(5))
            .unwrap()
            .with_backoff(Duration::ZERO, Duration::ZERO);
        client
    }

    /// Resolves `id` to exactly one canonical record.
    pub async fn resolve(&self, id: &Identifier) -> Result<CanonicalRecord> {
        let query = id.ads_query();
        if query.trim().is_empty() {
            return Err(ScienceError::NotFound(id.to_string()));
        }
        let headers = self.auth_headers()?;

        let url = format!(
            "{}/search/query?q={}&fl={}&rows={MAX_ROWS}",
            self.base_url,
            urlencoding::encode(&query),
            SEARCH_FIELDS.join(",")
        );
        tracing::debug!(%id, query = %query, "querying ADS");
        let response: SearchResponse = self
            .client
            .get_json(&url, headers.clone())
            .await
            .map_err(service_error)?;

        let mut docs = response.response.docs;
        match docs.len() {
            0 => return Err(ScienceError::NotFound(id.to_string())),
            1 => {}
            n => {
                tracing::info!(%id, matches = n, total = response.response.num_found, "ambiguous ADS query");
                let candidates = docs
                    .iter()
                    .map(|doc| Candidate {
                        bibcode: doc.bibcode.clone().unwrap_or_default(),
                        title: normalize::strip_markup(&doc.title()),
                        year: doc.year(),
                    })
                    .collect();
                return Err(ScienceError::Ambiguous {
                    query: id.to_string(),
                    candidates,
                });
            }
        }
        let doc = docs.remove(0);

        let citation = match doc.bibcode.as_deref() {
            Some(bibcode) => self.export_bibtex(bibcode, headers).await?,
            None => String::new(),
        };

        let record = normalize::into_record(&doc, &citation, &self.gateway_url);
        tracing::info!(%id, key = %record.dedup_key, title = %record.title, "resolved");
        Ok(record)
    }

    /// BibTeX for one bibcode from `/export/bibtex`.
    pub async fn export_bibtex(&self, bibcode: &str, headers: HeaderMap) -> Result<String> {
        let url = format!("{}/export/bibtex", self.base_url);
        let body = ExportRequest {
            bibcode: vec![bibcode],
        };
        let response: ExportResponse = self
            .client
            .post_json(&url, &body, headers)
            .await
            .map_err(service_error)?;
        Ok(response.export.trim().to_string())
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self.token.as_deref().ok_or_else(|| ScienceError::ServiceUnavailable {
            kind: Unavailable::Credentials,
            cause: "no ADS API token configured (set ads.token, ADS_DEV_KEY or ~/.ads/dev_key)"
                .to_string(),
        })?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(|_| {
            ScienceError::ServiceUnavailable {
                kind: Unavailable::Credentials,
                cause: "ADS API token contains invalid characters".to_string(),
            }
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}

/// Folds transport, auth and throttling failures into `ServiceUnavailable`.
fn service_error(err: ScienceError) -> ScienceError {
    let (kind, cause) = match err {
        ScienceError::Status { status: 401 | 403, .. } => (
            Unavailable::Credentials,
            "ADS rejected the API token (HTTP 401/403)".to_string(),
        ),
        ScienceError::RateLimit(_, retry_after) => (
            Unavailable::RateLimited,
            format!("ADS rate limit exceeded, retry after {retry_after}s"),
        ),
        ScienceError::Status { status, url } => (Unavailable::Transport, format!("HTTP {status} from {url}")),
        ScienceError::Http(e) => (Unavailable::Transport, e.to_string()),
        ScienceError::Parse(msg) => (Unavailable::Transport, format!("malformed ADS response: {msg}")),
        other => return other,
    };
    ScienceError::ServiceUnavailable { kind, cause }
}
