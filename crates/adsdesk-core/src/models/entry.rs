use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted article in the local collection.
///
/// `dedup_key` is unique across the collection. Entries are created once and
/// then mutated in place on every later resolution of the same article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionEntry {
    pub id: Uuid,
    pub dedup_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bibcode: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_bibcodes: Vec<String>,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    pub citation: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(default)]
    pub linked_urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachedFile>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionEntry {
    pub fn new(dedup_key: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dedup_key: dedup_key.into(),
            bibcode: None,
            alternate_bibcodes: Vec::new(),
            title: title.into(),
            first_author: None,
            year: None,
            citation: String::new(),
            abstract_text: None,
            linked_urls: Vec::new(),
            attachment: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// True when the entry carries an attachment whose file still exists.
    pub fn has_live_attachment(&self) -> bool {
        self.attachment
            .as_ref()
            .is_some_and(|file| std::path::Path::new(&file.path).is_file())
    }
}

/// A document file linked to an entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachedFile {
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub content_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    pub added_at: DateTime<Utc>,
}

/// Compact row for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: Uuid,
    pub dedup_key: String,
    pub title: String,
    pub first_author: Option<String>,
    pub year: Option<i32>,
    pub has_file: bool,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_has_no_attachment() {
        let entry = CollectionEntry::new("2013ARA&A..51..105C", "Title");
        assert!(entry.attachment.is_none());
        assert!(!entry.has_live_attachment());
        assert_eq!(entry.created_at, entry.updated_at);
    }

    #[test]
    fn attachment_pointing_at_missing_file_is_not_live() {
        let mut entry = CollectionEntry::new("key", "Title");
        entry.attachment = Some(AttachedFile {
            path: "/nonexistent/adsdesk/missing.pdf".to_string(),
            sha256: "00".to_string(),
            size_bytes: 0,
            content_type: "application/pdf".to_string(),
            source_url: None,
            added_at: Utc::now(),
        });
        assert!(!entry.has_live_attachment());
    }
}
