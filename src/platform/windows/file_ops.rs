use crate::error::NativeStatus;
use crate::platform::traits::{ATTRIBUTE_REPARSE_POINT, RawMetadata, TransactionHandle};
use crate::platform::windows::constants::{filetime_ticks, to_wide, win32_status};
use tracing::trace;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, DeleteFileTransactedW, DeleteFileW, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_OPEN_REPARSE_POINT, FILE_FLAGS_AND_ATTRIBUTES, FILE_GENERIC_WRITE,
    FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, FindClose, FindFirstFileW,
    GetFileAttributesExW, GetFileAttributesTransactedW, GetFileExInfoStandard, OPEN_EXISTING,
    RemoveDirectoryTransactedW, RemoveDirectoryW, SetFileAttributesTransactedW,
    SetFileAttributesW, WIN32_FILE_ATTRIBUTE_DATA, WIN32_FIND_DATAW,
};
use windows::Win32::System::IO::DeviceIoControl;
use windows::Win32::System::Ioctl::FSCTL_DELETE_REPARSE_POINT;
use windows::core::PCWSTR;

pub(crate) fn transaction_handle(tx: &TransactionHandle) -> HANDLE {
    HANDLE(tx.as_raw() as *mut core::ffi::c_void)
}

/// Header-only reparse buffer for FSCTL_DELETE_REPARSE_POINT; Microsoft
/// tags carry no GUID, so eight bytes suffice.
#[repr(C)]
struct ReparseDataHeader {
    reparse_tag: u32,
    reparse_data_length: u16,
    reserved: u16,
}

/// Query attributes, timestamps, and (for reparse points) the reparse tag.
/// `Ok(None)` when the object does not exist.
pub fn query_metadata(
    path: &str,
    tx: Option<&TransactionHandle>,
) -> Result<Option<RawMetadata>, NativeStatus> {
    let wide = to_wide(path);
    let mut data = WIN32_FILE_ATTRIBUTE_DATA::default();

    let queried = unsafe {
        match tx {
            Some(tx) => GetFileAttributesTransactedW(
                PCWSTR(wide.as_ptr()),
                GetFileExInfoStandard,
                &mut data as *mut _ as *mut core::ffi::c_void,
                transaction_handle(tx),
            ),
            None => GetFileAttributesExW(
                PCWSTR(wide.as_ptr()),
                GetFileExInfoStandard,
                &mut data as *mut _ as *mut core::ffi::c_void,
            ),
        }
    };

    if let Err(error) = queried {
        let status = win32_status(&error);
        if status.is_not_found() {
            return Ok(None);
        }
        return Err(status);
    }

    let mut metadata = RawMetadata {
        attributes: data.dwFileAttributes,
        reparse_tag: 0,
        created: filetime_ticks(data.ftCreationTime),
        accessed: filetime_ticks(data.ftLastAccessTime),
        modified: filetime_ticks(data.ftLastWriteTime),
    };

    // The attribute query does not surface the reparse tag; recover it from
    // the find data when the reparse bit is set.
    if metadata.attributes & ATTRIBUTE_REPARSE_POINT != 0 {
        let mut find = WIN32_FIND_DATAW::default();
        let handle = unsafe { FindFirstFileW(PCWSTR(wide.as_ptr()), &mut find) }
            .map_err(|e| win32_status(&e))?;
        unsafe {
            let _ = FindClose(handle);
        }
        metadata.reparse_tag = find.dwReserved0;
    }

    Ok(Some(metadata))
}

/// Remove a single empty directory (or directory-shaped link).
pub fn remove_directory(path: &str, tx: Option<&TransactionHandle>) -> Result<(), NativeStatus> {
    trace!("RemoveDirectory: {}", path);
    let wide = to_wide(path);
    let removed = unsafe {
        match tx {
            Some(tx) => RemoveDirectoryTransactedW(PCWSTR(wide.as_ptr()), transaction_handle(tx)),
            None => RemoveDirectoryW(PCWSTR(wide.as_ptr())),
        }
    };
    removed.map_err(|e| win32_status(&e))
}

/// Remove a single file.
pub fn remove_file(path: &str, tx: Option<&TransactionHandle>) -> Result<(), NativeStatus> {
    trace!("DeleteFile: {}", path);
    let wide = to_wide(path);
    let removed = unsafe {
        match tx {
            Some(tx) => DeleteFileTransactedW(PCWSTR(wide.as_ptr()), transaction_handle(tx)),
            None => DeleteFileW(PCWSTR(wide.as_ptr())),
        }
    };
    removed.map_err(|e| win32_status(&e))
}

/// Replace the attribute bitset on an object.
pub fn set_attributes(
    path: &str,
    attributes: u32,
    tx: Option<&TransactionHandle>,
) -> Result<(), NativeStatus> {
    trace!("SetFileAttributes: {} -> {:#x}", path, attributes);
    let wide = to_wide(path);
    let set = unsafe {
        match tx {
            Some(tx) => SetFileAttributesTransactedW(
                PCWSTR(wide.as_ptr()),
                FILE_FLAGS_AND_ATTRIBUTES(attributes),
                transaction_handle(tx),
            ),
            None => {
                SetFileAttributesW(PCWSTR(wide.as_ptr()), FILE_FLAGS_AND_ATTRIBUTES(attributes))
            }
        }
    };
    set.map_err(|e| win32_status(&e))
}

/// Sever a reparse link in place via FSCTL_DELETE_REPARSE_POINT, leaving
/// the backing directory behind as an ordinary empty directory.
pub fn delete_reparse_point(path: &str) -> Result<(), NativeStatus> {
    trace!("DeleteReparsePoint: {}", path);

    let metadata = query_metadata(path, None)?.ok_or(NativeStatus::FILE_NOT_FOUND)?;

    let wide = to_wide(path);
    let handle = unsafe {
        CreateFileW(
            PCWSTR(wide.as_ptr()),
            FILE_GENERIC_WRITE.0,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            None,
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
            None,
        )
    }
    .map_err(|e| win32_status(&e))?;

    let header = ReparseDataHeader {
        reparse_tag: metadata.reparse_tag,
        reparse_data_length: 0,
        reserved: 0,
    };
    let mut returned = 0u32;

    let severed = unsafe {
        DeviceIoControl(
            handle,
            FSCTL_DELETE_REPARSE_POINT,
            Some(&header as *const _ as *const core::ffi::c_void),
            std::mem::size_of::<ReparseDataHeader>() as u32,
            None,
            0,
            Some(&mut returned),
            None,
        )
    };

    unsafe {
        let _ = CloseHandle(handle);
    }

    severed.map_err(|e| win32_status(&e))
}
