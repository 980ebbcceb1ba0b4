mod connection;
mod migrations;
mod schema;

pub use connection::ConnectionPool;
pub use migrations::{get_applied_versions, run_migrations, Migration};
pub use schema::SCHEMA_VERSION;

use std::path::Path;

use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::models::{CollectionEntry, EntrySummary};

use super::repositories::{EntryRepository, Repository, SqliteEntryRepository};

pub fn open_database(path: &Path) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

/// Migrated collection database.
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = open_database(path)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        let pool = open_in_memory()?;
        Ok(Self { pool })
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }

    pub fn find_entry_by_key(&self, key: &str) -> Result<Option<CollectionEntry>> {
        let conn = self.pool.get_connection();
        let repo = SqliteEntryRepository::new(conn);
        repo.find_by_key(key)
    }

    pub fn find_entry_by_bibcode_alias(&self, bibcode: &str) -> Result<Option<CollectionEntry>> {
        let conn = self.pool.get_connection();
        let repo = SqliteEntryRepository::new(conn);
        repo.find_by_bibcode_alias(bibcode)
    }

    pub fn list_entries_by_year(&self, year: i32) -> Result<Vec<CollectionEntry>> {
        let conn = self.pool.get_connection();
        let repo = SqliteEntryRepository::new(conn);
        repo.list_by_year(year)
    }

    pub fn insert_entry(&self, entry: &CollectionEntry) -> Result<()> {
        let conn = self.pool.get_connection();
        let repo = SqliteEntryRepository::new(conn);
        repo.insert(entry)
    }

    pub fn update_entry(&self, entry: &CollectionEntry) -> Result<()> {
        let conn = self.pool.get_connection();
        let repo = SqliteEntryRepository::new(conn);
        repo.update(entry)
    }

    pub fn get_entry(&self, id: &str) -> Result<CollectionEntry> {
        let uuid = Uuid::parse_str(id).map_err(|_| CoreError::EntryNotFound(id.to_string()))?;
        let conn = self.pool.get_connection();
        let repo = SqliteEntryRepository::new(conn);
        repo.find_by_id(&uuid)?
            .ok_or_else(|| CoreError::EntryNotFound(id.to_string()))
    }

    pub fn list_entries(&self, limit: usize, offset: usize) -> Result<Vec<EntrySummary>> {
        let conn = self.pool.get_connection();
        let repo = SqliteEntryRepository::new(conn);
        repo.list(limit, offset)
    }

    pub fn count_entries(&self) -> Result<usize> {
        let conn = self.pool.get_connection();
        let repo = SqliteEntryRepository::new(conn);
        repo.count()
    }
}
