use crate::error::{PathError, Result, translate};
use crate::path::{CanonicalPath, PathKind};
use crate::platform::traits::{NativeFilesystem, RawMetadata, TransactionHandle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::trace;

/// The Unix epoch expressed in FILETIME ticks (100ns units since 1601).
const FILETIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;

/// Convert a 64-bit FILETIME tick value to UTC. Zero means "not recorded".
pub fn filetime_to_utc(ticks: u64) -> Option<DateTime<Utc>> {
    if ticks == 0 {
        return None;
    }
    let since_unix = ticks as i64 - FILETIME_UNIX_EPOCH;
    let secs = since_unix.div_euclid(10_000_000);
    let nanos = (since_unix.rem_euclid(10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// A point-in-time snapshot of one filesystem object.
///
/// Never cached across mutating calls; re-classify after any change to the
/// underlying object.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub path: CanonicalPath,
    pub attributes: u32,
    pub is_directory: bool,
    pub is_reparse_point: bool,
    /// A reparse point redirecting to another volume or junction target;
    /// must be unmounted before its backing directory can be removed.
    pub is_mount_point: bool,
    pub created: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl EntryInfo {
    pub(crate) fn from_raw(path: CanonicalPath, raw: &RawMetadata) -> Self {
        Self {
            path,
            attributes: raw.attributes,
            is_directory: raw.is_directory(),
            is_reparse_point: raw.is_reparse_point(),
            is_mount_point: raw.is_mount_point(),
            created: filetime_to_utc(raw.created),
            accessed: filetime_to_utc(raw.accessed),
            modified: filetime_to_utc(raw.modified),
        }
    }
}

/// Classifies filesystem objects via the native metadata query.
pub struct EntryClassifier<'a, F> {
    fs: &'a F,
}

impl<'a, F: NativeFilesystem> EntryClassifier<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Classify the object at `path`. `Ok(None)` when it does not exist,
    /// so callers can choose to tolerate absence.
    ///
    /// Only long canonical paths reach native calls; anything else is
    /// rejected here rather than passed through.
    pub fn classify(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<Option<EntryInfo>> {
        if path.kind() != PathKind::LongFullPath {
            return Err(PathError::InvalidArgument {
                reason: format!("native calls require a long canonical path: {:?}", path.as_str()),
            });
        }

        match self.fs.query_metadata(path, tx) {
            Ok(Some(raw)) => {
                let info = EntryInfo::from_raw(path.clone(), &raw);
                trace!(
                    path = %info.path,
                    directory = info.is_directory,
                    reparse = info.is_reparse_point,
                    mount_point = info.is_mount_point,
                    "classified entry"
                );
                Ok(Some(info))
            }
            Ok(None) => Ok(None),
            Err(status) if status.is_not_found() => Ok(None),
            Err(status) => Err(translate(status, path.as_str())),
        }
    }
}
