use crate::error::NativeStatus;
use crate::path::CanonicalPath;

/// FILE_ATTRIBUTE_READONLY
pub const ATTRIBUTE_READONLY: u32 = 0x0000_0001;
/// FILE_ATTRIBUTE_DIRECTORY
pub const ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;
/// FILE_ATTRIBUTE_REPARSE_POINT
pub const ATTRIBUTE_REPARSE_POINT: u32 = 0x0000_0400;

/// IO_REPARSE_TAG_MOUNT_POINT - junctions and volume mount points
pub const REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;
/// IO_REPARSE_TAG_SYMLINK
pub const REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;

/// An opaque kernel transaction handle owned by the caller.
///
/// The engine only ever borrows it and passes it through to native calls;
/// creating, committing, rolling back, and closing the handle are entirely
/// the caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHandle(isize);

impl TransactionHandle {
    /// Wrap a raw native handle value. The handle stays owned by the caller.
    pub fn from_raw(handle: isize) -> Self {
        Self(handle)
    }

    pub fn as_raw(&self) -> isize {
        self.0
    }
}

/// Metadata snapshot as the native layer reports it: raw attribute bits,
/// the reparse tag (zero when not a reparse point), and 64-bit FILETIME
/// tick values. Stale the instant the underlying object changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMetadata {
    pub attributes: u32,
    pub reparse_tag: u32,
    pub created: u64,
    pub accessed: u64,
    pub modified: u64,
}

impl RawMetadata {
    pub fn is_directory(&self) -> bool {
        self.attributes & ATTRIBUTE_DIRECTORY != 0
    }

    pub fn is_reparse_point(&self) -> bool {
        self.attributes & ATTRIBUTE_REPARSE_POINT != 0
    }

    /// A reparse point that redirects to another volume or junction target,
    /// as opposed to a plain symbolic link.
    pub fn is_mount_point(&self) -> bool {
        self.is_reparse_point() && self.reparse_tag == REPARSE_TAG_MOUNT_POINT
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes & ATTRIBUTE_READONLY != 0
    }
}

/// One entry produced by enumeration.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub path: CanonicalPath,
    pub metadata: RawMetadata,
}

/// The narrow native interface the core consumes.
///
/// Implementations report raw [`NativeStatus`] codes; translation into the
/// error taxonomy happens in exactly one place above this seam. Every path
/// argument must be a long canonical path. Where a transaction handle is
/// given, the transacted variant of the underlying call must be used.
pub trait NativeFilesystem {
    /// Query attributes, timestamps, and reparse classification.
    /// `Ok(None)` when the object does not exist.
    fn query_metadata(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<Option<RawMetadata>, NativeStatus>;

    /// Remove a single empty directory (or directory-shaped link).
    fn remove_directory(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<(), NativeStatus>;

    /// Remove a single file.
    fn remove_file(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<(), NativeStatus>;

    /// Replace the attribute bitset on an object.
    fn set_attributes(
        &self,
        path: &CanonicalPath,
        attributes: u32,
        tx: Option<&TransactionHandle>,
    ) -> Result<(), NativeStatus>;

    /// Sever a reparse link in place, leaving the backing directory behind.
    /// The delete-reparse ioctl has no transacted variant.
    fn delete_reparse_point(&self, path: &CanonicalPath) -> Result<(), NativeStatus>;

    /// Enumerate entries under `path` matching `filter`, depth-first and
    /// top-down when `recursive`. The sequence is lazy and single-pass; a
    /// fresh call re-enumerates from scratch. Recursion never descends
    /// through reparse points, and each directory's listing handle is
    /// released before the walk moves on.
    fn enumerate<'a>(
        &'a self,
        path: &CanonicalPath,
        filter: &str,
        recursive: bool,
        tx: Option<&'a TransactionHandle>,
    ) -> Result<impl Iterator<Item = Result<RawEntry, NativeStatus>> + 'a, NativeStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_point_requires_reparse_bit_and_tag() {
        let junction = RawMetadata {
            attributes: ATTRIBUTE_DIRECTORY | ATTRIBUTE_REPARSE_POINT,
            reparse_tag: REPARSE_TAG_MOUNT_POINT,
            created: 0,
            accessed: 0,
            modified: 0,
        };
        assert!(junction.is_mount_point());

        let symlink = RawMetadata {
            reparse_tag: REPARSE_TAG_SYMLINK,
            ..junction
        };
        assert!(symlink.is_reparse_point());
        assert!(!symlink.is_mount_point());

        let plain = RawMetadata {
            attributes: ATTRIBUTE_DIRECTORY,
            reparse_tag: 0,
            ..junction
        };
        assert!(!plain.is_reparse_point());
        assert!(!plain.is_mount_point());
    }
}
