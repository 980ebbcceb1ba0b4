use std::sync::MutexGuard;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::models::{AttachedFile, CollectionEntry, EntrySummary};

use super::Repository;

const ENTRY_COLUMNS: &str = "id, dedup_key, bibcode, alternate_bibcodes, title, first_author, year,
     citation, abstract, linked_urls, created_at, updated_at,
     attachment_path, attachment_sha256, attachment_size, attachment_content_type,
     attachment_source_url, attachment_added_at";

pub trait EntryRepository: Repository<Entity = CollectionEntry, Id = Uuid> {
    fn find_by_key(&self, key: &str) -> Result<Option<CollectionEntry>>;
    fn find_by_bibcode_alias(&self, bibcode: &str) -> Result<Option<CollectionEntry>>;
    fn list_by_year(&self, year: i32) -> Result<Vec<CollectionEntry>>;
    fn insert(&self, entry: &CollectionEntry) -> Result<()>;
    fn update(&self, entry: &CollectionEntry) -> Result<()>;
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<EntrySummary>>;
    fn count(&self) -> Result<usize>;
}

pub struct SqliteEntryRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteEntryRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<CollectionEntry> {
        let id_str: String = row.get(0)?;
        let alternates_str: String = row.get(3)?;
        let urls_str: String = row.get(9)?;

        let attachment = match row.get::<_, Option<String>>(12)? {
            Some(path) => Some(AttachedFile {
                path,
                sha256: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
                size_bytes: row.get::<_, Option<i64>>(14)?.unwrap_or(0) as u64,
                content_type: row
                    .get::<_, Option<String>>(15)?
                    .unwrap_or_else(|| "application/pdf".to_string()),
                source_url: row.get(16)?,
                added_at: parse_timestamp(row.get::<_, Option<String>>(17)?.as_deref()),
            }),
            None => None,
        };

        Ok(CollectionEntry {
            id: Uuid::parse_str(&id_str).unwrap_or_default(),
            dedup_key: row.get(1)?,
            bibcode: row.get(2)?,
            alternate_bibcodes: serde_json::from_str(&alternates_str).unwrap_or_default(),
            title: row.get(4)?,
            first_author: row.get(5)?,
            year: row.get(6)?,
            citation: row.get(7)?,
            abstract_text: row.get(8)?,
            linked_urls: serde_json::from_str(&urls_str).unwrap_or_default(),
            created_at: parse_timestamp(Some(row.get::<_, String>(10)?.as_str())),
            updated_at: parse_timestamp(Some(row.get::<_, String>(11)?.as_str())),
            attachment,
        })
    }

    fn query_entries(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<CollectionEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl Repository for SqliteEntryRepository<'_> {
    type Entity = CollectionEntry;
    type Id = Uuid;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1");
        let entry = self
            .conn
            .query_row(&sql, params![id.to_string()], Self::row_to_entry)
            .optional()?;
        Ok(entry)
    }
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn find_by_key(&self, key: &str) -> Result<Option<CollectionEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE dedup_key = ?1");
        let entry = self
            .conn
            .query_row(&sql, params![key], Self::row_to_entry)
            .optional()?;
        Ok(entry)
    }

    fn find_by_bibcode_alias(&self, bibcode: &str) -> Result<Option<CollectionEntry>> {
        let pattern = format!("%\"{bibcode}\"%");
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE dedup_key = ?1 OR bibcode = ?1 OR alternate_bibcodes LIKE ?2
             ORDER BY created_at ASC"
        );
        // LIKE is case-insensitive; confirm the exact match on the decoded list.
        let found = self
            .query_entries(&sql, params![bibcode, pattern])?
            .into_iter()
            .find(|entry| {
                entry.dedup_key == bibcode
                    || entry.bibcode.as_deref() == Some(bibcode)
                    || entry.alternate_bibcodes.iter().any(|alt| alt == bibcode)
            });
        Ok(found)
    }

    fn list_by_year(&self, year: i32) -> Result<Vec<CollectionEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE year = ?1 ORDER BY created_at ASC"
        );
        self.query_entries(&sql, params![year])
    }

    fn insert(&self, entry: &CollectionEntry) -> Result<()> {
        let alternates_json = serde_json::to_string(&entry.alternate_bibcodes)?;
        let urls_json = serde_json::to_string(&entry.linked_urls)?;
        let file = entry.attachment.as_ref();

        self.conn
            .execute(
                "INSERT INTO entries
                    (id, dedup_key, bibcode, alternate_bibcodes, title, first_author, year,
                     citation, abstract, linked_urls, created_at, updated_at,
                     attachment_path, attachment_sha256, attachment_size, attachment_content_type,
                     attachment_source_url, attachment_added_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    entry.id.to_string(),
                    entry.dedup_key,
                    entry.bibcode,
                    alternates_json,
                    entry.title,
                    entry.first_author,
                    entry.year,
                    entry.citation,
                    entry.abstract_text,
                    urls_json,
                    entry.created_at.to_rfc3339(),
                    entry.updated_at.to_rfc3339(),
                    file.map(|f| &f.path),
                    file.map(|f| &f.sha256),
                    file.map(|f| f.size_bytes as i64),
                    file.map(|f| &f.content_type),
                    file.and_then(|f| f.source_url.as_ref()),
                    file.map(|f| f.added_at.to_rfc3339()),
                ],
            )
            .map_err(|e| CoreError::from_write(e, &entry.dedup_key))?;
        Ok(())
    }

    fn update(&self, entry: &CollectionEntry) -> Result<()> {
        let alternates_json = serde_json::to_string(&entry.alternate_bibcodes)?;
        let urls_json = serde_json::to_string(&entry.linked_urls)?;
        let file = entry.attachment.as_ref();

        let changed = self
            .conn
            .execute(
                "UPDATE entries SET
                    dedup_key = ?2, bibcode = ?3, alternate_bibcodes = ?4, title = ?5,
                    first_author = ?6, year = ?7, citation = ?8, abstract = ?9,
                    linked_urls = ?10, updated_at = ?11,
                    attachment_path = ?12, attachment_sha256 = ?13, attachment_size = ?14,
                    attachment_content_type = ?15, attachment_source_url = ?16,
                    attachment_added_at = ?17
                 WHERE id = ?1",
                params![
                    entry.id.to_string(),
                    entry.dedup_key,
                    entry.bibcode,
                    alternates_json,
                    entry.title,
                    entry.first_author,
                    entry.year,
                    entry.citation,
                    entry.abstract_text,
                    urls_json,
                    entry.updated_at.to_rfc3339(),
                    file.map(|f| &f.path),
                    file.map(|f| &f.sha256),
                    file.map(|f| f.size_bytes as i64),
                    file.map(|f| &f.content_type),
                    file.and_then(|f| f.source_url.as_ref()),
                    file.map(|f| f.added_at.to_rfc3339()),
                ],
            )
            .map_err(|e| CoreError::from_write(e, &entry.dedup_key))?;

        if changed == 0 {
            return Err(CoreError::EntryNotFound(entry.id.to_string()));
        }
        Ok(())
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<EntrySummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, dedup_key, title, first_author, year,
                    attachment_path IS NOT NULL, updated_at
             FROM entries ORDER BY updated_at DESC LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(EntrySummary {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
                    dedup_key: row.get(1)?,
                    title: row.get(2)?,
                    first_author: row.get(3)?,
                    year: row.get(4)?,
                    has_file: row.get(5)?,
                    updated_at: parse_timestamp(Some(row.get::<_, String>(6)?.as_str())),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
