pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AdsConfig, AppConfig, CoreConfig, OptionsConfig, ProxyConfig};
pub use error::{CoreError, ExitCode, Result};
pub use models::*;

pub use storage::collection::{CollectionStore, SqliteCollection};
pub use storage::database::{ConnectionPool, Database, open_database, open_in_memory};
pub use storage::files::{DocumentStore, compute_hash, sanitize_key};
pub use storage::repositories::{EntryRepository, Repository, SqliteEntryRepository};
