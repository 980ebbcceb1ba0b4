pub mod entry;

pub use entry::{AttachedFile, CollectionEntry, EntrySummary};
