pub mod classifier;
pub mod delete_engine;

pub use classifier::{EntryClassifier, EntryInfo};
pub use delete_engine::{DeleteOptions, DeletionEngine};
