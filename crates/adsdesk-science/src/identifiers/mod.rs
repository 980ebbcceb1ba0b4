//! Identifier classification.
//!
//! Every input maps to exactly one [`Identifier`]; anything that is not a
//! bibcode, DOI or arXiv id is passed on as a free-text query.

pub mod arxiv;
pub mod bibcode;
pub mod doi;

use std::fmt;

use serde::Serialize;

pub use arxiv::ArxivId;
pub use bibcode::Bibcode;
pub use doi::Doi;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    Bibcode(Bibcode),
    Doi(Doi),
    ArxivId(ArxivId),
    RawQuery(String),
}

/// Classifies `raw`, trying bibcode, then DOI, then arXiv id.
pub fn classify(raw: &str) -> Identifier {
    if let Ok(bibcode) = Bibcode::parse(raw) {
        return Identifier::Bibcode(bibcode);
    }
    if let Ok(doi) = Doi::parse(raw) {
        return Identifier::Doi(doi);
    }
    if let Ok(arxiv) = ArxivId::parse(raw) {
        return Identifier::ArxivId(arxiv);
    }
    Identifier::RawQuery(raw.trim().to_string())
}

impl Identifier {
    pub fn kind(&self) -> &'static str {
        match self {
            Identifier::Bibcode(_) => "bibcode",
            Identifier::Doi(_) => "doi",
            Identifier::ArxivId(_) => "arxiv",
            Identifier::RawQuery(_) => "query",
        }
    }

    /// ADS search query string for this identifier.
    pub fn ads_query(&self) -> String {
        match self {
            Identifier::Bibcode(b) => format!("identifier:\"{}\"", b.code),
            Identifier::Doi(d) => format!("doi:\"{}\"", d.normalized),
            Identifier::ArxivId(a) => format!("identifier:\"arXiv:{}\"", a.id),
            Identifier::RawQuery(q) => q.clone(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Bibcode(b) => write!(f, "{}", b.code),
            Identifier::Doi(d) => write!(f, "doi:{}", d.normalized),
            Identifier::ArxivId(a) => write!(f, "arXiv:{}", a.id),
            Identifier::RawQuery(q) => write!(f, "{q}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bibcodes_classify_as_bibcode() {
        for input in [
            "2013ARA&A..51..105C",
            "2019ApJ...873..111S",
            "2016ApJ...818L..26B",
            "  2020A&A...641A...6P ",
            "https://ui.adsabs.harvard.edu/abs/2013ARA%26A..51..105C/abstract",
        ] {
            assert_eq!(classify(input).kind(), "bibcode", "{input}");
        }
    }

    #[test]
    fn dois_classify_as_doi() {
        for input in [
            "10.3847/1538-4357/aafd37",
            "doi:10.1093/mnras/stz1234",
            "https://doi.org/10.1146/annurev-astro-082812-141031",
        ] {
            assert_eq!(classify(input).kind(), "doi", "{input}");
        }
    }

    #[test]
    fn arxiv_ids_classify_as_arxiv() {
        for input in ["1901.00001", "2301.04567v2", "astro-ph/0601001", "arXiv:1706.03762"] {
            assert_eq!(classify(input).kind(), "arxiv", "{input}");
        }
    }

    #[test]
    fn everything_else_is_a_raw_query() {
        for input in ["", "dark matter halos", "Smith 2020", "10.12/x", "2013ARA&A"] {
            assert_eq!(classify(input).kind(), "query", "{input}");
        }
        assert_eq!(
            classify("  author:\"Smith\" year:2020 "),
            Identifier::RawQuery("author:\"Smith\" year:2020".to_string())
        );
    }

    #[test]
    fn ads_queries() {
        assert_eq!(
            classify("2013ARA&A..51..105C").ads_query(),
            "identifier:\"2013ARA&A..51..105C\""
        );
        assert_eq!(
            classify("10.3847/1538-4357/AAFD37").ads_query(),
            "doi:\"10.3847/1538-4357/aafd37\""
        );
        assert_eq!(classify("1901.00001v2").ads_query(), "identifier:\"arXiv:1901.00001\"");
    }
}
