pub mod collection;
pub mod database;
pub mod files;
pub mod repositories;
