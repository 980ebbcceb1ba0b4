//! Idempotent merge of resolved records into the local collection.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use adsdesk_core::{CollectionEntry, CollectionStore, compute_hash};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::fetch::FetchedDocument;
use crate::record::{COMPOSITE_KEY_POLICY, CanonicalRecord, author_surname, title_similarity};

/// Minimum normalized title similarity for a fuzzy duplicate.
const FUZZY_TITLE_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Inserted => f.write_str("inserted"),
            ReconcileOutcome::Updated => f.write_str("updated"),
            ReconcileOutcome::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// How an existing entry was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRoute {
    DedupKey,
    AlternateBibcode,
    FuzzyTitle,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Compute the outcome without touching the collection.
    pub dry_run: bool,
    /// Replace an attached file whose content differs from the new document.
    pub replace_attachment: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub outcome: ReconcileOutcome,
    pub dedup_key: String,
    pub entry_id: Uuid,
    pub matched_by: Option<MatchRoute>,
    pub attachment: Option<String>,
    pub document_attached: bool,
}

pub struct Reconciler {
    store: Arc<dyn CollectionStore>,
    options: ReconcileOptions,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CollectionStore>, options: ReconcileOptions) -> Self {
        Self {
            store,
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Inserts or updates the entry for `record`, attaching `doc` at most once.
    ///
    /// Calls for the same dedup key are serialized from lookup to write.
    pub async fn reconcile(
        &self,
        record: &CanonicalRecord,
        doc: Option<&FetchedDocument>,
    ) -> Result<ReconcileReport> {
        let lock = self.lock_for(&record.dedup_key);
        let _guard = lock.lock().await;

        match self.find_existing(record)? {
            None => self.insert(record, doc),
            Some((entry, route)) => self.update(entry, route, record, doc),
        }
    }

    fn find_existing(&self, record: &CanonicalRecord) -> Result<Option<(CollectionEntry, MatchRoute)>> {
        if let Some(entry) = self.store.find_by_key(&record.dedup_key)? {
            return Ok(Some((entry, MatchRoute::DedupKey)));
        }

        for alias in record.bibcode.iter().chain(&record.alternate_bibcodes) {
            if let Some(entry) = self.store.find_by_alternate_key(alias)? {
                tracing::debug!(key = %record.dedup_key, alias = %alias, "matched stored entry by alternate bibcode");
                return Ok(Some((entry, MatchRoute::AlternateBibcode)));
            }
        }

        let (Some(year), Some(author)) = (record.year, record.first_author()) else {
            return Ok(None);
        };
        let surname = author_surname(author);
        let fuzzy = self.store.candidates_by_year(year)?.into_iter().find(|entry| {
            may_share_article(entry, record)
                && entry
                    .first_author
                    .as_deref()
                    .is_some_and(|a| author_surname(a) == surname)
                && title_similarity(&entry.title, &record.title) >= FUZZY_TITLE_THRESHOLD
        });
        if let Some(entry) = &fuzzy {
            tracing::debug!(key = %record.dedup_key, stored = %entry.dedup_key, "matched stored entry by title");
        }
        Ok(fuzzy.map(|entry| (entry, MatchRoute::FuzzyTitle)))
    }

    fn insert(&self, record: &CanonicalRecord, doc: Option<&FetchedDocument>) -> Result<ReconcileReport> {
        let mut entry = CollectionEntry::new(&record.dedup_key, &record.title);
        apply_record(&mut entry, record);

        if !self.options.dry_run {
            self.store.insert(&entry)?;
            if let Some(doc) = doc {
                entry.attachment = Some(self.store.attach(
                    &entry.dedup_key,
                    &doc.bytes,
                    &doc.content_type,
                    Some(&doc.source_url),
                )?);
                self.store.update(&entry)?;
            }
        }
        tracing::info!(key = %entry.dedup_key, dry_run = self.options.dry_run, "entry inserted");

        Ok(ReconcileReport {
            outcome: ReconcileOutcome::Inserted,
            dedup_key: entry.dedup_key,
            entry_id: entry.id,
            matched_by: None,
            attachment: entry.attachment.map(|f| f.path),
            document_attached: doc.is_some(),
        })
    }

    fn update(
        &self,
        mut entry: CollectionEntry,
        route: MatchRoute,
        record: &CanonicalRecord,
        doc: Option<&FetchedDocument>,
    ) -> Result<ReconcileReport> {
        let before = entry.clone();
        apply_record(&mut entry, record);
        let mut changed = entry != before;

        let live = entry.has_live_attachment();
        if !live && entry.attachment.is_some() {
            tracing::warn!(key = %entry.dedup_key, "attached file is missing on disk");
            entry.attachment = None;
            changed = true;
        }
        if live
            && entry.dedup_key != before.dedup_key
            && !self.options.dry_run
            && let Some(file) = &entry.attachment
        {
            entry.attachment = Some(self.store.relocate(file, &entry.dedup_key)?);
        }

        let mut document_attached = false;
        if let Some(doc) = doc {
            let same_content = entry
                .attachment
                .as_ref()
                .is_some_and(|file| file.sha256 == compute_hash(&doc.bytes));
            let replace = !live || (!same_content && self.options.replace_attachment);

            if replace {
                if !self.options.dry_run {
                    entry.attachment = Some(self.store.attach(
                        &entry.dedup_key,
                        &doc.bytes,
                        &doc.content_type,
                        Some(&doc.source_url),
                    )?);
                }
                document_attached = true;
                changed = true;
            } else if !same_content {
                tracing::info!(key = %entry.dedup_key, "keeping existing attachment with different content");
            }
        }

        if !changed {
            tracing::info!(key = %entry.dedup_key, "entry unchanged");
            return Ok(ReconcileReport {
                outcome: ReconcileOutcome::Unchanged,
                dedup_key: entry.dedup_key,
                entry_id: entry.id,
                matched_by: Some(route),
                attachment: entry.attachment.map(|f| f.path),
                document_attached: false,
            });
        }

        entry.touch();
        if !self.options.dry_run {
            self.store.update(&entry)?;
        }
        tracing::info!(key = %entry.dedup_key, ?route, dry_run = self.options.dry_run, "entry updated");

        Ok(ReconcileReport {
            outcome: ReconcileOutcome::Updated,
            dedup_key: entry.dedup_key,
            entry_id: entry.id,
            matched_by: Some(route),
            attachment: entry.attachment.map(|f| f.path),
            document_attached,
        })
    }
}

/// A stored entry that already carries a different real bibcode is a
/// different article, however close the titles (series papers I and II).
fn may_share_article(entry: &CollectionEntry, record: &CanonicalRecord) -> bool {
    if entry.dedup_key.starts_with(COMPOSITE_KEY_POLICY) {
        return true;
    }
    match &entry.bibcode {
        None => true,
        Some(bibcode) => {
            record.bibcode.as_ref() == Some(bibcode) || record.alternate_bibcodes.contains(bibcode)
        }
    }
}

/// Copies record metadata onto `entry`. Alternate bibcodes accumulate so a
/// re-keyed entry is still found under its old key.
fn apply_record(entry: &mut CollectionEntry, record: &CanonicalRecord) {
    if entry.dedup_key != record.dedup_key {
        let old_key = std::mem::replace(&mut entry.dedup_key, record.dedup_key.clone());
        if !old_key.starts_with(COMPOSITE_KEY_POLICY) {
            push_unique(&mut entry.alternate_bibcodes, old_key);
        }
    }
    if let Some(old) = entry.bibcode.take()
        && Some(&old) != record.bibcode.as_ref()
    {
        push_unique(&mut entry.alternate_bibcodes, old);
    }
    entry.bibcode = record.bibcode.clone();
    for alt in &record.alternate_bibcodes {
        push_unique(&mut entry.alternate_bibcodes, alt.clone());
    }
    if let Some(bibcode) = &entry.bibcode {
        entry.alternate_bibcodes.retain(|alt| alt != bibcode);
    }

    entry.title = record.title.clone();
    entry.first_author = record.first_author().map(ToOwned::to_owned);
    entry.year = record.year;
    entry.citation = record.citation.clone();
    entry.abstract_text = record.abstract_text.clone();
    entry.linked_urls = record.linked_urls();
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}
