use crate::error::NativeStatus;
use crate::path::CanonicalPath;
use crate::platform::traits::{NativeFilesystem, RawEntry, RawMetadata, TransactionHandle};
use crate::platform::windows::enumerate::DirWalk;
use crate::platform::windows::file_ops;

/// The real native layer: Win32 calls with long path support, routed
/// through their transacted variants whenever a handle is supplied.
#[derive(Default)]
pub struct WindowsFilesystem;

impl WindowsFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl NativeFilesystem for WindowsFilesystem {
    fn query_metadata(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<Option<RawMetadata>, NativeStatus> {
        file_ops::query_metadata(path.as_str(), tx)
    }

    fn remove_directory(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<(), NativeStatus> {
        file_ops::remove_directory(path.as_str(), tx)
    }

    fn remove_file(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<(), NativeStatus> {
        file_ops::remove_file(path.as_str(), tx)
    }

    fn set_attributes(
        &self,
        path: &CanonicalPath,
        attributes: u32,
        tx: Option<&TransactionHandle>,
    ) -> Result<(), NativeStatus> {
        file_ops::set_attributes(path.as_str(), attributes, tx)
    }

    fn delete_reparse_point(&self, path: &CanonicalPath) -> Result<(), NativeStatus> {
        file_ops::delete_reparse_point(path.as_str())
    }

    fn enumerate<'a>(
        &'a self,
        path: &CanonicalPath,
        filter: &str,
        recursive: bool,
        tx: Option<&'a TransactionHandle>,
    ) -> Result<impl Iterator<Item = Result<RawEntry, NativeStatus>> + 'a, NativeStatus> {
        DirWalk::open(path, filter, recursive, tx)
    }
}
