use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

// YYYY JJJJJ VVVV M PPPP A
static BIBCODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})([A-Za-z][A-Za-z0-9&.]{4})([A-Za-z0-9.]{4})([A-Za-z0-9.])([A-Za-z0-9.]{4})([A-Za-z.])$",
    )
    .unwrap()
});

static ADS_ABS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:ui\.)?adsabs\.harvard\.edu/(?:#)?abs/([^/?#]+)").unwrap()
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bibcode {
    pub raw: String,
    pub code: String,
    pub year: i32,
    pub journal: String,
}

impl Bibcode {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let decoded;
        let stripped = match ADS_ABS_URL.captures(input).and_then(|caps| caps.get(1)) {
            Some(code) => {
                decoded = urlencoding::decode(code.as_str())
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| code.as_str().to_string());
                decoded.as_str()
            }
            None => input,
        };

        let caps = BIBCODE
            .captures(stripped)
            .ok_or_else(|| ScienceError::InvalidBibcode(input.to_string()))?;
        let year = caps[1]
            .parse::<i32>()
            .map_err(|_| ScienceError::InvalidBibcode(input.to_string()))?;

        Ok(Self {
            raw: input.to_string(),
            code: stripped.to_string(),
            year,
            journal: caps[2].trim_end_matches('.').to_string(),
        })
    }
}
