use std::fmt;

use serde::{Deserialize, Serialize};

/// Version tag of the composite dedup-key policy. Changing the policy must
/// bump this, otherwise previously stored keys stop matching.
pub const COMPOSITE_KEY_POLICY: &str = "ck1";

const TITLE_STOPWORDS: &[&str] = &[
    "a", "an", "the", "on", "of", "in", "for", "and", "to", "with", "at", "by", "from",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryPath {
    /// Full-text link advertised directly by ADS (arXiv e-print, ADS scan, author copy).
    Direct,
    /// Publisher link through the ADS link gateway.
    Gateway,
    /// Gateway links retried through the SSH relay.
    ProxiedGateway,
}

impl DeliveryPath {
    pub const DEFAULT_POLICY: [DeliveryPath; 3] = [
        DeliveryPath::Direct,
        DeliveryPath::Gateway,
        DeliveryPath::ProxiedGateway,
    ];

    /// Which advertised locations this path draws from.
    pub fn location_source(self) -> DeliveryPath {
        match self {
            DeliveryPath::ProxiedGateway => DeliveryPath::Gateway,
            other => other,
        }
    }
}

impl fmt::Display for DeliveryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPath::Direct => f.write_str("direct"),
            DeliveryPath::Gateway => f.write_str("gateway"),
            DeliveryPath::ProxiedGateway => f.write_str("proxied-gateway"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Pdf,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLocation {
    pub path: DeliveryPath,
    pub kind: LinkKind,
    pub url: String,
    /// ADS esource name, e.g. `EPRINT_PDF`.
    pub source: String,
}

/// Normalized ADS record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub dedup_key: String,
    pub bibcode: Option<String>,
    #[serde(default)]
    pub alternate_bibcodes: Vec<String>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub year: Option<i32>,
    pub abstract_text: Option<String>,
    pub citation: String,
    #[serde(default)]
    pub locations: Vec<DocumentLocation>,
    pub open_access: Option<bool>,
}

impl CanonicalRecord {
    pub fn first_author(&self) -> Option<&str> {
        self.authors.first().map(String::as_str)
    }

    pub fn locations_for(&self, path: DeliveryPath) -> Vec<&DocumentLocation> {
        let source = path.location_source();
        self.locations.iter().filter(|loc| loc.path == source).collect()
    }

    /// URLs stored on the collection entry: DOI resolver, arXiv abstract,
    /// then every advertised location.
    pub fn linked_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        if let Some(doi) = &self.doi {
            urls.push(format!("https://doi.org/{doi}"));
        }
        if let Some(arxiv) = &self.arxiv_id {
            urls.push(format!("https://arxiv.org/abs/{arxiv}"));
        }
        for loc in &self.locations {
            if !urls.contains(&loc.url) {
                urls.push(loc.url.clone());
            }
        }
        urls
    }
}

/// One of several records matched by an ambiguous query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub bibcode: String,
    pub title: String,
    pub year: Option<i32>,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} ({year}) {}", self.bibcode, self.title),
            None => write!(f, "{} {}", self.bibcode, self.title),
        }
    }
}

// ─── Dedup keys ───────────────────────────────────────────────────────────────

/// The bibcode when ADS returned one, otherwise the composite key.
pub fn dedup_key(bibcode: Option<&str>, first_author: Option<&str>, year: Option<i32>, title: &str) -> String {
    match bibcode.map(str::trim).filter(|b| !b.is_empty()) {
        Some(bibcode) => bibcode.to_string(),
        None => composite_key(first_author, year, title),
    }
}

/// `ck1:<surname>:<year>:<first significant title word>`, ASCII-folded and
/// lower-cased. Missing parts become `_` (year `nd`).
pub fn composite_key(first_author: Option<&str>, year: Option<i32>, title: &str) -> String {
    let surname = first_author
        .map(author_surname)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "_".to_string());
    let year = year.map_or_else(|| "nd".to_string(), |y| y.to_string());
    let word = normalize_title(title)
        .split_whitespace()
        .find(|w| !TITLE_STOPWORDS.contains(w))
        .unwrap_or("_")
        .to_string();
    format!("{COMPOSITE_KEY_POLICY}:{surname}:{year}:{word}")
}

/// Folded, lower-cased surname of an author written as `Last, First` or
/// `First Last`.
pub fn author_surname(author: &str) -> String {
    let author = author.trim();
    let last = match author.split_once(',') {
        Some((last, _)) => last,
        None => author.rsplit(' ').next().unwrap_or(author),
    };
    fold_ascii(last)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

pub fn normalize_title(title: &str) -> String {
    let cleaned: String = fold_ascii(title)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn title_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_title(a), normalize_title(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Lower-cases and maps common Latin diacritics to ASCII.
pub fn fold_ascii(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars().flat_map(char::to_lowercase) {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => out.push('a'),
            'æ' => out.push_str("ae"),
            'ç' | 'ć' | 'č' => out.push('c'),
            'ď' | 'đ' => out.push('d'),
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ě' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' | 'ī' => out.push('i'),
            'ł' => out.push('l'),
            'ñ' | 'ń' | 'ň' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => out.push('o'),
            'œ' => out.push_str("oe"),
            'ř' => out.push('r'),
            'ś' | 'š' | 'ş' => out.push('s'),
            'ß' => out.push_str("ss"),
            'ť' => out.push('t'),
            'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'ź' | 'ż' | 'ž' => out.push('z'),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bibcode_wins_over_composite() {
        assert_eq!(
            dedup_key(Some("2013ARA&A..51..105C"), Some("Conroy, C."), Some(2013), "Modeling"),
            "2013ARA&A..51..105C"
        );
        assert_eq!(
            dedup_key(Some("  "), Some("Conroy, C."), Some(2013), "Modeling"),
            "ck1:conroy:2013:modeling"
        );
    }

    #[test]
    fn composite_key_skips_stopwords_and_folds() {
        assert_eq!(
            composite_key(Some("Schödel, Rainer"), Some(2002), "The Orbit of a Star"),
            "ck1:schodel:2002:orbit"
        );
        assert_eq!(
            composite_key(Some("Jane van der Berg"), Some(2021), "On Dust"),
            "ck1:berg:2021:dust"
        );
    }

    #[test]
    fn composite_key_is_deterministic_across_variants() {
        let a = composite_key(Some("Smith, J."), Some(2020), "Dark-Matter Halos");
        let b = composite_key(Some("Smith, John"), Some(2020), "  dark matter halos ");
        assert_eq!(a, b);
        assert_eq!(a, "ck1:smith:2020:dark");
    }

    #[test]
    fn composite_key_placeholders() {
        assert_eq!(composite_key(None, None, ""), "ck1:_:nd:_");
    }

    #[test]
    fn title_similarity_ignores_punctuation_and_case() {
        assert!(title_similarity("Dark Matter Halos!", "dark matter halos") > 0.99);
        assert!(title_similarity("Dark Matter Halos", "Stellar Populations") < 0.5);
        assert_eq!(title_similarity("", "x"), 0.0);
    }

    #[test]
    fn proxied_gateway_reuses_gateway_locations() {
        let record = CanonicalRecord {
            dedup_key: "k".into(),
            bibcode: None,
            alternate_bibcodes: vec![],
            doi: Some("10.1/x".into()),
            arxiv_id: None,
            title: "t".into(),
            authors: vec![],
            venue: None,
            year: None,
            abstract_text: None,
            citation: String::new(),
            locations: vec![DocumentLocation {
                path: DeliveryPath::Gateway,
                kind: LinkKind::Pdf,
                url: "https://gw/PUB_PDF".into(),
                source: "PUB_PDF".into(),
            }],
            open_access: None,
        };
        assert_eq!(record.locations_for(DeliveryPath::ProxiedGateway).len(), 1);
        assert!(record.locations_for(DeliveryPath::Direct).is_empty());
        assert_eq!(record.linked_urls(), vec!["https://doi.org/10.1/x", "https://gw/PUB_PDF"]);
    }
}
