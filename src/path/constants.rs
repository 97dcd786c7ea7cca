/// Primary directory separator
pub const DIRECTORY_SEPARATOR: char = '\\';

/// Alternate separator accepted on input, never produced on output
pub const ALT_DIRECTORY_SEPARATOR: char = '/';

/// Separates a drive letter from the rest of the path (`C:`)
pub const VOLUME_SEPARATOR: char = ':';

/// Extended-length prefix for local paths
pub const LONG_PATH_PREFIX: &str = r"\\?\";

/// Extended-length prefix for UNC paths
pub const LONG_PATH_UNC_PREFIX: &str = r"\\?\UNC\";

/// Device namespace prefix (`\\.\PhysicalDrive0`, `\\.\C:`)
pub const DEVICE_PREFIX: &str = r"\\.\";

/// NT object-manager device path prefix
pub const NT_DEVICE_PREFIX: &str = r"\Device\";

/// NT substitute/drive-mapping prefix
pub const SUBST_PREFIX: &str = r"\??\";

/// Volume GUID path prefix (`\\?\Volume{...}`)
pub const VOLUME_PREFIX: &str = r"\\?\Volume";

/// Global-root prefix
pub const GLOBAL_ROOT_PREFIX: &str = r"\\?\GlobalRoot\";

/// The literal "match everything" enumeration filter
pub const MATCH_ALL: &str = "*";

/// Wildcard characters rejected only under the additional check
pub const WILDCARD_CHARS: [char; 2] = ['*', '?'];

/// Characters never valid anywhere in a path (control characters are
/// rejected separately)
pub const INVALID_PATH_CHARS: [char; 4] = ['"', '<', '>', '|'];

pub fn is_separator(c: char) -> bool {
    c == DIRECTORY_SEPARATOR || c == ALT_DIRECTORY_SEPARATOR
}

/// True if the path begins with any prefix that already addresses the
/// native namespace directly; such paths are passed through unchanged.
pub fn has_native_prefix(path: &str) -> bool {
    path.starts_with(LONG_PATH_PREFIX)
        || path.starts_with(DEVICE_PREFIX)
        || path.starts_with(NT_DEVICE_PREFIX)
        || path.starts_with(SUBST_PREFIX)
        || path.starts_with(VOLUME_PREFIX)
        || path.starts_with(GLOBAL_ROOT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_prefix_detection() {
        assert!(has_native_prefix(r"\\?\C:\folder"));
        assert!(has_native_prefix(r"\\?\UNC\server\share"));
        assert!(has_native_prefix(r"\\.\PhysicalDrive0"));
        assert!(has_native_prefix(r"\Device\HarddiskVolume1"));
        assert!(has_native_prefix(r"\??\C:\folder"));

        assert!(!has_native_prefix(r"C:\folder"));
        assert!(!has_native_prefix(r"\\server\share"));
        assert!(!has_native_prefix(r"relative\path"));
    }

    #[test]
    fn test_separator_accepts_both_forms() {
        assert!(is_separator('\\'));
        assert!(is_separator('/'));
        assert!(!is_separator(':'));
    }
}
