pub mod core;
pub mod error;
pub mod observability;
pub mod path;
pub mod platform;

pub use crate::core::{DeleteOptions, DeletionEngine, EntryClassifier, EntryInfo};
pub use crate::error::{NativeStatus, PathError, Result};
pub use crate::path::{CanonicalPath, PathFormatOptions, PathKind};
