//! Error types for the clearcut library.
//!
//! Native calls report raw Win32 status codes; everything above the platform
//! seam speaks [`PathError`]. The [`translate`] table is the only place a
//! status code becomes an error kind, so one code always maps to one kind.

use thiserror::Error;

/// Result type alias for operations that may fail with a path error.
pub type Result<T> = std::result::Result<T, PathError>;

/// Raw native status code as returned by the platform call layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeStatus(pub u32);

impl NativeStatus {
    pub const SUCCESS: NativeStatus = NativeStatus(0);
    /// ERROR_FILE_NOT_FOUND
    pub const FILE_NOT_FOUND: NativeStatus = NativeStatus(2);
    /// ERROR_PATH_NOT_FOUND
    pub const PATH_NOT_FOUND: NativeStatus = NativeStatus(3);
    /// ERROR_ACCESS_DENIED
    pub const ACCESS_DENIED: NativeStatus = NativeStatus(5);
    /// ERROR_INVALID_HANDLE
    pub const INVALID_HANDLE: NativeStatus = NativeStatus(6);
    /// ERROR_NO_MORE_FILES
    pub const NO_MORE_FILES: NativeStatus = NativeStatus(18);
    /// ERROR_SHARING_VIOLATION
    pub const SHARING_VIOLATION: NativeStatus = NativeStatus(32);
    /// ERROR_INVALID_PARAMETER
    pub const INVALID_PARAMETER: NativeStatus = NativeStatus(87);
    /// ERROR_DIR_NOT_EMPTY
    pub const DIR_NOT_EMPTY: NativeStatus = NativeStatus(145);
    /// ERROR_DIRECTORY - the target of a directory operation is not a directory
    pub const NOT_A_DIRECTORY: NativeStatus = NativeStatus(267);

    /// True for both not-found codes (file and path level)
    pub fn is_not_found(self) -> bool {
        self == Self::FILE_NOT_FOUND || self == Self::PATH_NOT_FOUND
    }
}

impl std::fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The error taxonomy for path normalization and tree deletion.
///
/// Every variant carries the canonical path that triggered it so callers can
/// report which object a partially completed deletion halted on.
#[derive(Debug, Error)]
pub enum PathError {
    /// Null/empty/whitespace-only path, or an empty combine sequence.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: String,
    },

    /// A disallowed character was found during validation.
    #[error("invalid character {character:?} at byte {index} in {path:?}")]
    InvalidCharacter {
        /// The offending character.
        character: char,
        /// Byte index of the character in the original input.
        index: usize,
        /// The input that failed validation.
        path: String,
    },

    /// The target does not exist and the caller did not request "continue".
    #[error("path not found: {path:?}")]
    NotFound { path: String },

    /// The target exists but is a file where a directory was expected.
    #[error("not a directory: {path:?}")]
    NotADirectory { path: String },

    /// Native removal reported children remaining after planning completed.
    #[error("directory not empty: {path:?}")]
    DirectoryNotEmpty { path: String },

    /// The target carries the read-only attribute and the caller disallowed
    /// clearing it.
    #[error("target is read-only: {path:?}")]
    ReadOnly { path: String },

    /// The target is open or in use elsewhere (sharing violation).
    #[error("target is in use: {path:?}")]
    Busy { path: String },

    /// Permission denied, not attributable to the read-only attribute.
    #[error("access denied: {path:?}")]
    Unauthorized { path: String },

    /// Any other native failure, carrying the original status code.
    #[error("native call failed with status {status} on {path:?}")]
    IoFailure {
        /// The raw status code from the native layer.
        status: NativeStatus,
        path: String,
    },
}

impl PathError {
    /// The canonical path this error was raised for, where one exists.
    pub fn path(&self) -> Option<&str> {
        match self {
            PathError::InvalidArgument { .. } => None,
            PathError::InvalidCharacter { path, .. }
            | PathError::NotFound { path }
            | PathError::NotADirectory { path }
            | PathError::DirectoryNotEmpty { path }
            | PathError::ReadOnly { path }
            | PathError::Busy { path }
            | PathError::Unauthorized { path }
            | PathError::IoFailure { path, .. } => Some(path),
        }
    }
}

/// Map a native status code to the error taxonomy.
///
/// The read-only refinement of ACCESS_DENIED is the deletion engine's job
/// (it needs an attribute query); here ACCESS_DENIED is always
/// [`PathError::Unauthorized`].
pub fn translate(status: NativeStatus, path: &str) -> PathError {
    let path = path.to_string();
    match status {
        NativeStatus::FILE_NOT_FOUND | NativeStatus::PATH_NOT_FOUND => PathError::NotFound { path },
        NativeStatus::NOT_A_DIRECTORY => PathError::NotADirectory { path },
        NativeStatus::DIR_NOT_EMPTY => PathError::DirectoryNotEmpty { path },
        NativeStatus::SHARING_VIOLATION => PathError::Busy { path },
        NativeStatus::ACCESS_DENIED => PathError::Unauthorized { path },
        other => PathError::IoFailure {
            status: other,
            path,
        },
    }
}
