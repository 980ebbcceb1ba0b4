use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 2;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entries (
            id                 TEXT PRIMARY KEY,
            dedup_key          TEXT NOT NULL UNIQUE,
            bibcode            TEXT,
            alternate_bibcodes TEXT NOT NULL DEFAULT '[]',
            title              TEXT NOT NULL,
            first_author       TEXT,
            year               INTEGER,
            citation           TEXT NOT NULL,
            abstract           TEXT,
            linked_urls        TEXT NOT NULL DEFAULT '[]',
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_entries_bibcode ON entries(bibcode);
        CREATE INDEX IF NOT EXISTS idx_entries_year    ON entries(year);
        ",
    )?;
    Ok(())
}
