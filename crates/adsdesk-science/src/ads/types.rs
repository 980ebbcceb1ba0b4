use serde::{Deserialize, Serialize};

/// Fields requested from `/search/query`.
pub const SEARCH_FIELDS: &[&str] = &[
    "bibcode",
    "alternate_bibcode",
    "identifier",
    "title",
    "author",
    "first_author",
    "year",
    "pub",
    "bibstem",
    "abstract",
    "doi",
    "esources",
    "property",
];

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub response: SearchBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchBody {
    #[serde(rename = "numFound", default)]
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<AdsDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdsDoc {
    #[serde(default)]
    pub bibcode: Option<String>,
    #[serde(default)]
    pub alternate_bibcode: Vec<String>,
    #[serde(default)]
    pub identifier: Vec<String>,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub author: Vec<String>,
    #[serde(default)]
    pub first_author: Option<String>,
    #[serde(default)]
    pub year: Option<YearField>,
    #[serde(default, rename = "pub")]
    pub publication: Option<String>,
    #[serde(default)]
    pub bibstem: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub doi: Vec<String>,
    #[serde(default)]
    pub esources: Vec<String>,
    #[serde(default)]
    pub property: Vec<String>,
}

/// ADS returns `year` as a string; some mirrors send a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum YearField {
    Number(i32),
    Text(String),
}

impl AdsDoc {
    pub fn title(&self) -> String {
        self.title.first().cloned().unwrap_or_default()
    }

    pub fn year(&self) -> Option<i32> {
        match self.year.as_ref()? {
            YearField::Number(y) => Some(*y),
            YearField::Text(s) => s.trim().get(..4).and_then(|y| y.parse().ok()),
        }
    }

    /// arXiv id from the `identifier` list (`arXiv:1901.00001`).
    pub fn arxiv_id(&self) -> Option<String> {
        self.identifier.iter().find_map(|id| {
            id.strip_prefix("arXiv:")
                .or_else(|| id.strip_prefix("arxiv:"))
                .map(ToOwned::to_owned)
        })
    }

    pub fn is_open_access(&self) -> Option<bool> {
        if self.property.is_empty() {
            return None;
        }
        Some(self.property.iter().any(|p| p == "OPENACCESS"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRequest<'a> {
    pub bibcode: Vec<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportResponse {
    pub export: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_accepts_string_or_number() {
        let doc: AdsDoc = serde_json::from_str(r#"{"year": "2013"}"#).unwrap();
        assert_eq!(doc.year(), Some(2013));
        let doc: AdsDoc = serde_json::from_str(r#"{"year": 2019}"#).unwrap();
        assert_eq!(doc.year(), Some(2019));
        let doc: AdsDoc = serde_json::from_str("{}").unwrap();
        assert_eq!(doc.year(), None);
    }

    #[test]
    fn arxiv_id_from_identifiers() {
        let doc: AdsDoc = serde_json::from_str(
            r#"{"identifier": ["2019ApJ...873..111S", "arXiv:1901.00001", "10.3847/1538-4357/aafd37"]}"#,
        )
        .unwrap();
        assert_eq!(doc.arxiv_id().as_deref(), Some("1901.00001"));
    }

    #[test]
    fn open_access_flag() {
        let doc: AdsDoc = serde_json::from_str(r#"{"property": ["REFEREED", "OPENACCESS"]}"#).unwrap();
        assert_eq!(doc.is_open_access(), Some(true));
        let doc: AdsDoc = serde_json::from_str(r#"{"property": ["REFEREED"]}"#).unwrap();
        assert_eq!(doc.is_open_access(), Some(false));
        assert_eq!(AdsDoc::default().is_open_access(), None);
    }
}
