mod entry_repository;

pub use entry_repository::{EntryRepository, SqliteEntryRepository};

use crate::error::Result;

pub trait Repository {
    type Entity;
    type Id;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>>;
}
