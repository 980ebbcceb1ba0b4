use rusqlite::Connection;

use super::Migration;
use crate::error::Result;

pub struct V2Attachments;

impl Migration for V2Attachments {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "Add attachment columns with content hash to entries table"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        let has_attachment: bool = conn
            .prepare("SELECT 1 FROM pragma_table_info('entries') WHERE name='attachment_path'")?
            .exists([])?;

        if !has_attachment {
            conn.execute_batch(
                "
                ALTER TABLE entries ADD COLUMN attachment_path         TEXT;
                ALTER TABLE entries ADD COLUMN attachment_sha256       TEXT;
                ALTER TABLE entries ADD COLUMN attachment_size         INTEGER;
                ALTER TABLE entries ADD COLUMN attachment_content_type TEXT;
                ALTER TABLE entries ADD COLUMN attachment_source_url   TEXT;
                ALTER TABLE entries ADD COLUMN attachment_added_at     TEXT;
                CREATE INDEX IF NOT EXISTS idx_entries_attachment_sha256 ON entries(attachment_sha256);
                ",
            )?;
        }
        Ok(())
    }
}
