use thiserror::Error;

/// All errors that can occur in adsdesk-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Collection write conflict on key {0}")]
    WriteConflict(String),

    #[error("Migration error at version {version}: {message}")]
    Migration { version: u32, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl CoreError {
    /// Maps a UNIQUE violation on `entries.dedup_key` to [`CoreError::WriteConflict`].
    pub(crate) fn from_write(err: rusqlite::Error, key: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CoreError::WriteConflict(key.to_string())
            }
            _ => CoreError::Database(err),
        }
    }
}

/// Exit codes used by the CLI.
#[repr(i32)]
pub enum ExitCode {
    NotFound = 2,
    InvalidArgs = 3,
    Unresolved = 4,
    NetworkError = 6,
}

pub type Result<T> = std::result::Result<T, CoreError>;
