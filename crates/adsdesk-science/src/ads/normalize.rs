use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::Html;

use crate::record::{self, CanonicalRecord, DeliveryPath, DocumentLocation, LinkKind, fold_ascii};

use super::types::AdsDoc;

pub const ADS_LINK_GATEWAY: &str = "https://ui.adsabs.harvard.edu/link_gateway";

/// Known full-text esources in fetch priority order.
const ESOURCES: &[(&str, DeliveryPath, LinkKind)] = &[
    ("EPRINT_PDF", DeliveryPath::Direct, LinkKind::Pdf),
    ("ADS_PDF", DeliveryPath::Direct, LinkKind::Pdf),
    ("AUTHOR_PDF", DeliveryPath::Direct, LinkKind::Pdf),
    ("PUB_PDF", DeliveryPath::Gateway, LinkKind::Pdf),
    ("PUB_HTML", DeliveryPath::Gateway, LinkKind::Html),
];

static ESCAPED_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([%&#_$])").unwrap());

static UNESCAPED_TILDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[^\\])~").unwrap());

static COMMAND_WITH_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:emph|textit|textbf|textrm|textsc|mathrm|mathit|mathbf|rm|it|bf|text)\s*\{([^{}]*)\}")
        .unwrap()
});

static COMMAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([A-Za-z]+)\s?").unwrap());

static LATEX_SYMBOLS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("sim", "~"),
        ("approx", "≈"),
        ("pm", "±"),
        ("times", "×"),
        ("odot", "☉"),
        ("sun", "☉"),
        ("oplus", "⊕"),
        ("lesssim", "≲"),
        ("gtrsim", "≳"),
        ("le", "≤"),
        ("leq", "≤"),
        ("ge", "≥"),
        ("geq", "≥"),
        ("circ", "°"),
        ("deg", "°"),
        ("alpha", "α"),
        ("beta", "β"),
        ("gamma", "γ"),
        ("delta", "δ"),
        ("lambda", "λ"),
        ("mu", "μ"),
        ("nu", "ν"),
        ("sigma", "σ"),
        ("Lambda", "Λ"),
        ("Omega", "Ω"),
    ])
});

/// Builds the canonical record from an ADS search document and the BibTeX
/// export for it.
pub fn into_record(doc: &AdsDoc, citation: &str, gateway_url: &str) -> CanonicalRecord {
    let mut authors = dedupe_authors(&doc.author);
    if authors.is_empty()
        && let Some(first) = doc.first_author.as_deref()
    {
        authors.push(first.trim().to_string());
    }

    let bibcode = doc
        .bibcode
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(ToOwned::to_owned);
    let title = strip_markup(&doc.title());
    let year = doc
        .year()
        .or_else(|| bibcode.as_deref().and_then(|b| b.get(..4)?.parse().ok()));

    let dedup_key = record::dedup_key(bibcode.as_deref(), authors.first().map(String::as_str), year, &title);
    let locations = bibcode
        .as_deref()
        .map(|b| gateway_locations(gateway_url, b, &doc.esources))
        .unwrap_or_default();

    CanonicalRecord {
        dedup_key,
        alternate_bibcodes: doc
            .alternate_bibcode
            .iter()
            .filter(|alt| Some(alt.as_str()) != bibcode.as_deref())
            .cloned()
            .collect(),
        bibcode,
        doi: doc.doi.first().map(|d| d.trim().to_lowercase()),
        arxiv_id: doc.arxiv_id(),
        title,
        authors,
        venue: doc
            .publication
            .clone()
            .or_else(|| doc.bibstem.first().cloned()),
        year,
        abstract_text: doc
            .abstract_text
            .as_deref()
            .map(strip_markup)
            .filter(|a| !a.is_empty()),
        citation: citation.trim().to_string(),
        locations,
        open_access: doc.is_open_access(),
    }
}

pub fn gateway_locations(gateway_url: &str, bibcode: &str, esources: &[String]) -> Vec<DocumentLocation> {
    let encoded = urlencoding::encode(bibcode);
    ESOURCES
        .iter()
        .filter(|(name, _, _)| esources.iter().any(|e| e == name))
        .map(|(name, path, kind)| DocumentLocation {
            path: *path,
            kind: *kind,
            url: format!("{}/{encoded}/{name}", gateway_url.trim_end_matches('/')),
            source: (*name).to_string(),
        })
        .collect()
}

/// Merges name variants such as `Smith, J.` and `Smith, John` into one
/// entry, keeping the fuller spelling at the first variant's position.
pub fn dedupe_authors(authors: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(authors.len());
    for author in authors {
        let author = author.trim();
        if author.is_empty() {
            continue;
        }
        let incoming = AuthorName::parse(author);
        match out
            .iter()
            .position(|kept| AuthorName::parse(kept).is_variant_of(&incoming))
        {
            Some(idx) if author.len() > out[idx].len() => out[idx] = author.to_string(),
            Some(_) => {}
            None => out.push(author.to_string()),
        }
    }
    out
}

struct AuthorName {
    surname: String,
    given: Vec<String>,
}

impl AuthorName {
    fn parse(name: &str) -> Self {
        let (surname, given) = match name.split_once(',') {
            Some((last, first)) => (last, first),
            None => match name.rsplit_once(' ') {
                Some((first, last)) => (last, first),
                None => (name, ""),
            },
        };
        Self {
            surname: fold_ascii(surname.trim()),
            given: given
                .split(|c: char| c.is_whitespace() || c == '.' || c == '-')
                .filter(|t| !t.is_empty())
                .map(fold_ascii)
                .collect(),
        }
    }

    fn is_variant_of(&self, other: &AuthorName) -> bool {
        self.surname == other.surname
            && self.given.iter().zip(&other.given).all(|(a, b)| {
                a == b
                    || (a.chars().count() == 1 && b.starts_with(a.as_str()))
                    || (b.chars().count() == 1 && a.starts_with(b.as_str()))
            })
    }
}

/// Strips HTML tags, decodes entities and removes LaTeX markup.
pub fn strip_markup(raw: &str) -> String {
    let text: String = Html::parse_fragment(raw).root_element().text().collect();

    let text = ESCAPED_CHAR.replace_all(&text, "$1");
    let text = UNESCAPED_TILDE.replace_all(&text, "$1 ");
    let mut text = text.into_owned();
    for _ in 0..3 {
        let next = COMMAND_WITH_ARG.replace_all(&text, "$1").into_owned();
        if next == text {
            break;
        }
        text = next;
    }
    let text = COMMAND.replace_all(&text, |caps: &Captures| {
        LATEX_SYMBOLS.get(&caps[1]).copied().unwrap_or("").to_string()
    });
    let text: String = text.chars().filter(|c| !matches!(c, '$' | '{' | '}')).collect();

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::types::AdsDoc;

    #[test]
    fn author_variants_collapse_to_fuller_form() {
        let authors = vec![
            "Smith, J.".to_string(),
            "Doe, Alice".to_string(),
            "Smith, John".to_string(),
            "Doe, A.".to_string(),
            "Smith, Jane".to_string(),
        ];
        let merged = dedupe_authors(&authors);
        assert_eq!(merged, vec!["Smith, John", "Doe, Alice", "Smith, Jane"]);
    }

    #[test]
    fn different_people_with_same_surname_are_kept() {
        let authors = vec!["Wang, L.".to_string(), "Wang, Y.".to_string()];
        assert_eq!(dedupe_authors(&authors).len(), 2);
    }

    #[test]
    fn abstract_markup_is_removed() {
        let raw = "We find <i>M</i><sub>*</sub> &gt; 10$^{10}$ M$_\\odot$ \\emph{galaxies}~are red &amp; dead.";
        let clean = strip_markup(raw);
        assert!(clean.contains("M* > 10^10"), "{clean}");
        assert!(clean.contains("galaxies are red & dead."), "{clean}");
        assert!(clean.contains('☉'), "{clean}");
        for c in ['<', '$', '\\', '{', '}'] {
            assert!(!clean.contains(c), "{clean}");
        }
    }

    #[test]
    fn percent_sign_survives() {
        assert_eq!(strip_markup("about 30\\% of   systems"), "about 30% of systems");
    }

    #[test]
    fn locations_follow_priority_and_encode_bibcode() {
        let esources = vec![
            "PUB_HTML".to_string(),
            "EPRINT_HTML".to_string(),
            "PUB_PDF".to_string(),
            "EPRINT_PDF".to_string(),
        ];
        let locs = gateway_locations(ADS_LINK_GATEWAY, "2013ARA&A..51..105C", &esources);
        let names: Vec<_> = locs.iter().map(|l| l.source.as_str()).collect();
        assert_eq!(names, vec!["EPRINT_PDF", "PUB_PDF", "PUB_HTML"]);
        assert_eq!(
            locs[0].url,
            "https://ui.adsabs.harvard.edu/link_gateway/2013ARA%26A..51..105C/EPRINT_PDF"
        );
        assert_eq!(locs[0].path, DeliveryPath::Direct);
        assert_eq!(locs[2].kind, LinkKind::Html);
    }

    #[test]
    fn record_without_bibcode_gets_composite_key() {
        let doc: AdsDoc = serde_json::from_str(
            r#"{"title": ["The <SUB>Dark</SUB> Sector"], "author": ["Smith, J."], "year": "2020"}"#,
        )
        .unwrap();
        let record = into_record(&doc, " @ARTICLE{x} ", ADS_LINK_GATEWAY);
        assert_eq!(record.dedup_key, "ck1:smith:2020:dark");
        assert_eq!(record.title, "The Dark Sector");
        assert_eq!(record.citation, "@ARTICLE{x}");
        assert!(record.locations.is_empty());
    }
}
