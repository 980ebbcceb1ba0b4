use std::path::Path;

use crate::config::AppConfig;
use crate::error::Result;
use crate::models::{AttachedFile, CollectionEntry, EntrySummary};

use super::database::Database;
use super::files::DocumentStore;

/// Client interface to the local reference collection.
///
/// Implementations must reject a second entry with an existing dedup key
/// with [`CoreError::WriteConflict`](crate::CoreError::WriteConflict).
pub trait CollectionStore: Send + Sync {
    fn find_by_key(&self, key: &str) -> Result<Option<CollectionEntry>>;

    /// Finds an entry whose key, bibcode or alternate bibcodes contain `bibcode`.
    fn find_by_alternate_key(&self, bibcode: &str) -> Result<Option<CollectionEntry>>;

    fn candidates_by_year(&self, year: i32) -> Result<Vec<CollectionEntry>>;

    fn insert(&self, entry: &CollectionEntry) -> Result<()>;

    fn update(&self, entry: &CollectionEntry) -> Result<()>;

    /// Stores document bytes under the stable path for `key`.
    fn attach(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        source_url: Option<&str>,
    ) -> Result<AttachedFile>;

    /// Moves an existing attachment to the stable path for `key`.
    fn relocate(&self, file: &AttachedFile, key: &str) -> Result<AttachedFile>;
}

/// SQLite-backed collection with documents on disk.
pub struct SqliteCollection {
    db: Database,
    documents: DocumentStore,
}

impl SqliteCollection {
    pub fn open(config: &AppConfig) -> Result<Self> {
        Self::open_at(&config.database_path(), &config.files_dir())
    }

    pub fn open_at(db_path: &Path, files_dir: &Path) -> Result<Self> {
        Ok(Self {
            db: Database::open(db_path)?,
            documents: DocumentStore::new(files_dir),
        })
    }

    pub fn in_memory(files_dir: &Path) -> Result<Self> {
        Ok(Self {
            db: Database::open_in_memory()?,
            documents: DocumentStore::new(files_dir),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn list(&self, limit: usize) -> Result<Vec<EntrySummary>> {
        self.db.list_entries(limit, 0)
    }
}

impl CollectionStore for SqliteCollection {
    fn find_by_key(&self, key: &str) -> Result<Option<CollectionEntry>> {
        self.db.find_entry_by_key(key)
    }

    fn find_by_alternate_key(&self, bibcode: &str) -> Result<Option<CollectionEntry>> {
        self.db.find_entry_by_bibcode_alias(bibcode)
    }

    fn candidates_by_year(&self, year: i32) -> Result<Vec<CollectionEntry>> {
        self.db.list_entries_by_year(year)
    }

    fn insert(&self, entry: &CollectionEntry) -> Result<()> {
        self.db.insert_entry(entry)
    }

    fn update(&self, entry: &CollectionEntry) -> Result<()> {
        self.db.update_entry(entry)
    }

    fn attach(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        source_url: Option<&str>,
    ) -> Result<AttachedFile> {
        self.documents.write(key, bytes, content_type, source_url)
    }

    fn relocate(&self, file: &AttachedFile, key: &str) -> Result<AttachedFile> {
        self.documents.relocate(file, key)
    }
}
