use crate::error::NativeStatus;
use crate::path::{CanonicalPath, PathFormatOptions, normalize};
use crate::platform::traits::{ATTRIBUTE_REPARSE_POINT, RawEntry, RawMetadata, TransactionHandle};
use crate::platform::windows::constants::{filetime_ticks, from_wide, to_wide, win32_status};
use crate::platform::windows::file_ops::transaction_handle;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Storage::FileSystem::{
    FIND_FIRST_EX_FLAGS, FindClose, FindExInfoBasic, FindExSearchNameMatch,
    FindFirstFileTransactedW, FindFirstFileW, FindNextFileW, WIN32_FIND_DATAW,
};
use windows::core::PCWSTR;

/// Find handle released as soon as its directory's listing ends.
struct FindHandle(HANDLE);

impl Drop for FindHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = FindClose(self.0);
        }
    }
}

/// Lazy, single-pass walk of a subtree.
///
/// One listing handle is open at any moment; directories discovered during
/// a listing wait on a stack until the current handle is closed. Parents
/// are always yielded before their contents, and reparse points are never
/// walked through. Not restartable; a fresh walk re-enumerates.
pub struct DirWalk<'a> {
    filter: String,
    recursive: bool,
    tx: Option<&'a TransactionHandle>,
    pending: Vec<String>,
    current: Option<(String, FindHandle)>,
    buffered: Option<WIN32_FIND_DATAW>,
    failed: bool,
}

impl<'a> DirWalk<'a> {
    /// Open a walk rooted at `root`. Fails up front when the root listing
    /// cannot be opened at all.
    pub fn open(
        root: &CanonicalPath,
        filter: &str,
        recursive: bool,
        tx: Option<&'a TransactionHandle>,
    ) -> Result<Self, NativeStatus> {
        let mut walk = Self {
            filter: filter.to_string(),
            recursive,
            tx,
            pending: Vec::new(),
            current: None,
            buffered: None,
            failed: false,
        };
        let (handle, first) = walk.open_listing(root.as_str())?;
        walk.current = Some((root.as_str().to_string(), handle));
        walk.buffered = Some(first);
        Ok(walk)
    }

    fn open_listing(&self, dir: &str) -> Result<(FindHandle, WIN32_FIND_DATAW), NativeStatus> {
        let pattern = format!("{}\\{}", dir.trim_end_matches('\\'), self.filter);
        let wide = to_wide(&pattern);
        let mut find = WIN32_FIND_DATAW::default();

        let handle = unsafe {
            match self.tx {
                Some(tx) => FindFirstFileTransactedW(
                    PCWSTR(wide.as_ptr()),
                    FindExInfoBasic,
                    &mut find as *mut _ as *mut core::ffi::c_void,
                    FindExSearchNameMatch,
                    None,
                    FIND_FIRST_EX_FLAGS(0),
                    transaction_handle(tx),
                ),
                None => FindFirstFileW(PCWSTR(wide.as_ptr()), &mut find),
            }
        }
        .map_err(|e| win32_status(&e))?;

        Ok((FindHandle(handle), find))
    }

    fn entry_from_find(&mut self, dir: &str, find: &WIN32_FIND_DATAW) -> Option<RawEntry> {
        let name = from_wide(&find.cFileName);
        if name == "." || name == ".." {
            return None;
        }

        let full = format!("{}\\{}", dir.trim_end_matches('\\'), name);
        let metadata = RawMetadata {
            attributes: find.dwFileAttributes,
            reparse_tag: if find.dwFileAttributes & ATTRIBUTE_REPARSE_POINT != 0 {
                find.dwReserved0
            } else {
                0
            },
            created: filetime_ticks(find.ftCreationTime),
            accessed: filetime_ticks(find.ftLastAccessTime),
            modified: filetime_ticks(find.ftLastWriteTime),
        };

        if self.recursive && metadata.is_directory() && !metadata.is_reparse_point() {
            self.pending.push(full.clone());
        }

        let path = normalize(&full, PathFormatOptions::trusted())
            .expect("walk paths derive from an already-canonical root");
        Some(RawEntry { path, metadata })
    }
}

impl Iterator for DirWalk<'_> {
    type Item = Result<RawEntry, NativeStatus>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }

            if self.current.is_none() {
                let dir = self.pending.pop()?;
                match self.open_listing(&dir) {
                    Ok((handle, first)) => {
                        self.current = Some((dir, handle));
                        self.buffered = Some(first);
                    }
                    Err(status) => {
                        self.failed = true;
                        return Some(Err(status));
                    }
                }
            }

            let Some((dir, handle)) = &self.current else {
                continue;
            };
            let (dir, raw_handle) = (dir.clone(), handle.0);

            let find = match self.buffered.take() {
                Some(find) => find,
                None => {
                    let mut find = WIN32_FIND_DATAW::default();
                    match unsafe { FindNextFileW(raw_handle, &mut find) } {
                        Ok(()) => find,
                        Err(error) => {
                            let status = win32_status(&error);
                            // Listing exhausted: this handle is dropped
                            // before the next pending directory is opened.
                            self.current = None;
                            if status == NativeStatus::NO_MORE_FILES {
                                continue;
                            }
                            self.failed = true;
                            return Some(Err(status));
                        }
                    }
                }
            };

            if let Some(entry) = self.entry_from_find(&dir, &find) {
                return Some(Ok(entry));
            }
        }
    }
}
