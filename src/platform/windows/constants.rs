use crate::error::NativeStatus;
use std::os::windows::ffi::OsStrExt;
use windows::Win32::Foundation::FILETIME;

/// Null-terminated UTF-16 for handing a path to a native call.
pub fn to_wide(s: &str) -> Vec<u16> {
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Lossless UTF-16 buffer back to a string, stopping at the terminator.
pub fn from_wide(buffer: &[u16]) -> String {
    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..len])
}

/// Extract the Win32 status code from a `windows` crate error.
pub fn win32_status(error: &windows::core::Error) -> NativeStatus {
    NativeStatus((error.code().0 & 0xFFFF) as u32)
}

/// Merge a split FILETIME into the 64-bit tick value the core carries.
pub fn filetime_ticks(ft: FILETIME) -> u64 {
    (ft.dwHighDateTime as u64) << 32 | ft.dwLowDateTime as u64
}
