use std::fmt;

use adsdesk_core::CoreError;
use thiserror::Error;

use crate::record::Candidate;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid bibcode: {0}")]
    InvalidBibcode(String),

    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid arXiv ID: {0}")]
    InvalidArxivId(String),

    #[error("no ADS record matches {0}")]
    NotFound(String),

    #[error("{query} matches {} ADS records", candidates.len())]
    Ambiguous {
        query: String,
        candidates: Vec<Candidate>,
    },

    #[error("ADS unavailable: {cause}")]
    ServiceUnavailable { kind: Unavailable, cause: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("relay error: {0}")]
    Relay(String),

    #[error(transparent)]
    Collection(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, ScienceError>;

/// Why ADS could not answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    /// Missing, malformed or rejected API token.
    Credentials,
    RateLimited,
    Transport,
}

/// How far a single identifier got through the pipeline before failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Resolve,
    Reconcile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Resolve => f.write_str("resolve"),
            Stage::Reconcile => f.write_str("reconcile"),
        }
    }
}

/// Failure of one identifier, carrying the raw input so the user can retry it.
#[derive(Debug, Error)]
#[error("{input}: {stage} failed: {source}")]
pub struct PipelineError {
    pub input: String,
    pub stage: Stage,
    #[source]
    pub source: ScienceError,
}

impl PipelineError {
    pub fn new(input: impl Into<String>, stage: Stage, source: ScienceError) -> Self {
        Self {
            input: input.into(),
            stage,
            source,
        }
    }

    /// True for transport and throttling failures; a bad token is not one.
    pub fn is_network(&self) -> bool {
        matches!(
            self.source,
            ScienceError::ServiceUnavailable {
                kind: Unavailable::Transport | Unavailable::RateLimited,
                ..
            } | ScienceError::Http(_)
        )
    }
}
