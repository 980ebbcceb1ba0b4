use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

// New format: YYMM.NNNN or YYMM.NNNNN (with optional version)
static NEW_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4}\.\d{4,5})(v(\d+))?$").unwrap());

// Old format: category/YYMMNNN
static OLD_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z\-]+(?:\.[A-Za-z]{2})?/\d{7})(v(\d+))?$").unwrap()
});

static ARXIV_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.|export\.)?arxiv\.org/(?:abs|pdf)/(.+?)(?:\.pdf)?/?$").unwrap()
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArxivId {
    pub raw: String,
    pub id: String,
    pub version: Option<u32>,
    pub abs_url: String,
    pub pdf_url: String,
    pub category: Option<String>,
}

impl ArxivId {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let stripped = if let Some(caps) = ARXIV_URL.captures(input) {
            caps.get(1).map_or(input, |m| m.as_str())
        } else if let Some(s) = input.strip_prefix("arXiv:") {
            s
        } else if let Some(s) = input.strip_prefix("arxiv:") {
            s
        } else {
            input
        };

        let (full_id, version, category) = if let Some(caps) = NEW_FORMAT.captures(stripped) {
            (caps[1].to_string(), caps.get(3), None)
        } else if let Some(caps) = OLD_FORMAT.captures(stripped) {
            let full_id = caps[1].to_string();
            let category = full_id.split('/').next().map(ToOwned::to_owned);
            (full_id, caps.get(3), category)
        } else {
            return Err(ScienceError::InvalidArxivId(input.to_string()));
        };

        Ok(Self {
            raw: input.to_string(),
            abs_url: format!("https://arxiv.org/abs/{full_id}"),
            pdf_url: format!("https://arxiv.org/pdf/{full_id}"),
            version: version.and_then(|v| v.as_str().parse().ok()),
            id: full_id,
            category,
        })
    }
}
