use crate::error::{PathError, Result};
use crate::path::combine::combine;
use crate::path::constants::{
    DEVICE_PREFIX, DIRECTORY_SEPARATOR, GLOBAL_ROOT_PREFIX, LONG_PATH_PREFIX,
    LONG_PATH_UNC_PREFIX, SUBST_PREFIX, VOLUME_PREFIX, VOLUME_SEPARATOR, INVALID_PATH_CHARS,
    WILDCARD_CHARS, has_native_prefix, is_separator,
};
use serde::{Deserialize, Serialize};

/// Which representation a [`CanonicalPath`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    /// Not resolvable without a base directory
    Relative,
    /// Drive-rooted or UNC, without the extended-length prefix
    FullPath,
    /// Carries the extended-length prefix; the only form native calls accept
    LongFullPath,
}

/// An immutable, normalized path string plus its representation tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CanonicalPath {
    value: String,
    kind: PathKind,
}

impl CanonicalPath {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    /// True when this path can be handed to a native call as-is.
    pub fn is_long(&self) -> bool {
        self.kind == PathKind::LongFullPath
    }

    pub fn into_string(self) -> String {
        self.value
    }

    /// The unprefixed form for display and diagnostics.
    ///
    /// Volume-GUID and global-root paths have no meaning without their
    /// prefix and are left untouched.
    pub fn to_regular(&self) -> CanonicalPath {
        if self.value.starts_with(VOLUME_PREFIX) || self.value.starts_with(GLOBAL_ROOT_PREFIX) {
            return self.clone();
        }
        if let Some(rest) = self.value.strip_prefix(LONG_PATH_UNC_PREFIX) {
            return CanonicalPath {
                value: format!(r"\\{}", rest),
                kind: PathKind::FullPath,
            };
        }
        if let Some(rest) = self.value.strip_prefix(LONG_PATH_PREFIX) {
            return CanonicalPath {
                value: rest.to_string(),
                kind: PathKind::FullPath,
            };
        }
        self.clone()
    }
}

impl std::fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

fn bool_true() -> bool {
    true
}

/// Independent switches the normalizer honors.
///
/// The defaults enable validation; [`PathFormatOptions::trusted`] turns it
/// off for internal callers that re-normalize already-validated paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFormatOptions {
    /// Scan for characters invalid anywhere in a path
    #[serde(default = "bool_true")]
    pub check_invalid_path_chars: bool,

    /// Also reject the wildcard characters `*` and `?`
    pub check_additional: bool,

    /// Reject empty device paths and misplaced volume separators
    #[serde(default = "bool_true")]
    pub check_supported_format: bool,

    /// Trim trailing directory separators (evaluated before add)
    pub remove_trailing_separator: bool,

    /// Ensure exactly one trailing directory separator
    pub add_trailing_separator: bool,

    /// During base resolution, fall back to the lexical result when the
    /// target does not exist instead of failing
    pub continue_on_nonexist: bool,
}

impl Default for PathFormatOptions {
    fn default() -> Self {
        Self::full_check()
    }
}

impl PathFormatOptions {
    /// Character and format validation enabled
    pub fn full_check() -> Self {
        Self {
            check_invalid_path_chars: true,
            check_additional: false,
            check_supported_format: true,
            remove_trailing_separator: false,
            add_trailing_separator: false,
            continue_on_nonexist: false,
        }
    }

    /// All validation off, for trusted internal callers only
    pub fn trusted() -> Self {
        Self {
            check_invalid_path_chars: false,
            check_additional: false,
            check_supported_format: false,
            remove_trailing_separator: false,
            add_trailing_separator: false,
            continue_on_nonexist: false,
        }
    }
}

/// True if the path is rooted: it begins with a directory separator or its
/// second character is the volume separator.
pub fn is_rooted(path: &str) -> bool {
    let bytes = path.as_bytes();
    (!bytes.is_empty() && is_separator(bytes[0] as char))
        || (bytes.len() >= 2 && bytes[1] == VOLUME_SEPARATOR as u8)
}

/// True if the path addresses a network share (`\\server\share`), with or
/// without the extended-length prefix. Device paths (`\\.\...`) are not UNC.
pub fn is_unc(path: &str) -> bool {
    if let Some(rest) = path.strip_prefix(LONG_PATH_UNC_PREFIX) {
        return !rest.is_empty();
    }
    if path.starts_with(LONG_PATH_PREFIX) || is_device(path) {
        return false;
    }
    let mut chars = path.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(a), Some(b), Some(c)) if is_separator(a) && is_separator(b) && !is_separator(c)
    )
}

/// True for device-namespace paths: `\\.\C:`, `\\.\PhysicalDrive0`, `\\.`
pub fn is_device(path: &str) -> bool {
    path.starts_with(DEVICE_PREFIX)
        || (path.len() == 3 && path.starts_with(r"\\") && path.ends_with('.'))
}

/// True for a bare logical drive: `C:` or `C:\`
pub fn is_logical_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    match bytes.len() {
        2 => bytes[0].is_ascii_alphabetic() && bytes[1] == b':',
        3 => bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && is_separator(bytes[2] as char),
        _ => false,
    }
}

fn is_drive_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && is_separator(bytes[2] as char)
}

/// Byte length of any recognized native prefix, so validation scans only
/// the path body (the extended prefix itself contains `?`).
fn prefix_len(path: &str) -> usize {
    if path.starts_with(LONG_PATH_UNC_PREFIX) {
        LONG_PATH_UNC_PREFIX.len()
    } else if path.starts_with(LONG_PATH_PREFIX) {
        LONG_PATH_PREFIX.len()
    } else if path.starts_with(DEVICE_PREFIX) {
        DEVICE_PREFIX.len()
    } else if path.starts_with(SUBST_PREFIX) {
        SUBST_PREFIX.len()
    } else {
        0
    }
}

fn check_invalid_chars(input: &str, check_additional: bool) -> Result<()> {
    let offset = prefix_len(input);
    for (i, c) in input[offset..].char_indices() {
        let invalid = INVALID_PATH_CHARS.contains(&c)
            || c.is_control()
            || (check_additional && WILDCARD_CHARS.contains(&c));
        if invalid {
            return Err(PathError::InvalidCharacter {
                character: c,
                index: offset + i,
                path: input.to_string(),
            });
        }
    }
    Ok(())
}

fn check_supported_format(input: &str) -> Result<()> {
    if let Some(rest) = input.strip_prefix(DEVICE_PREFIX) {
        if rest.is_empty() {
            return Err(PathError::InvalidArgument {
                reason: format!("empty device path: {:?}", input),
            });
        }
    }

    let body = &input[prefix_len(input)..];
    let bytes = body.as_bytes();
    let misplaced_volume = (!bytes.is_empty() && bytes[0] == b':')
        || (bytes.len() >= 2 && bytes[1] == b':' && !bytes[0].is_ascii_alphabetic());
    if misplaced_volume {
        return Err(PathError::InvalidArgument {
            reason: format!("unsupported volume separator position: {:?}", input),
        });
    }
    Ok(())
}

/// Collapse `.` and `..` segments in the portion after `root_len` bytes.
/// Walking above the root is rejected.
fn fold_dot_segments(path: &str, root_len: usize) -> Result<String> {
    let (root, body) = path.split_at(root_len);
    let mut kept: Vec<&str> = Vec::new();

    for segment in body.split(is_separator) {
        match segment {
            "" | "." => continue,
            ".." => {
                if kept.pop().is_none() {
                    return Err(PathError::InvalidArgument {
                        reason: format!("path escapes its root: {:?}", path),
                    });
                }
            }
            other => kept.push(other),
        }
    }

    let mut out = root.replace('/', "\\");
    out.push_str(&kept.join("\\"));
    // Folding must not eat an explicit trailing separator; the trailing
    // options own that decision.
    if !kept.is_empty() && body.chars().last().is_some_and(is_separator) {
        out.push(DIRECTORY_SEPARATOR);
    }
    Ok(out)
}

/// Byte length of the root of a rooted, unprefixed path: `C:\` for drive
/// paths, `\\server\share\` (or as much as is present) for UNC.
fn root_len(path: &str) -> usize {
    if is_drive_absolute(path) {
        return 3;
    }
    if is_unc(path) {
        // two separators, server, separator, share, separator
        let mut seps = 0;
        for (i, c) in path.char_indices().skip(2) {
            if is_separator(c) {
                seps += 1;
                if seps == 2 {
                    return i + 1;
                }
            }
        }
        return path.len();
    }
    0
}

fn apply_trailing(mut value: String, options: PathFormatOptions) -> String {
    if options.remove_trailing_separator {
        while value
            .chars()
            .last()
            .is_some_and(is_separator)
        {
            // Never strip a drive root down to a drive-relative `C:`.
            let next = {
                let trimmed = &value[..value.len() - 1];
                trimmed.chars().last()
            };
            if next == Some(VOLUME_SEPARATOR) {
                break;
            }
            value.pop();
        }
    }

    if options.add_trailing_separator && !value.chars().last().is_some_and(is_separator) {
        value.push(DIRECTORY_SEPARATOR);
    }

    value
}

/// Normalize an input path into its canonical form.
///
/// Rooted inputs come back as [`PathKind::LongFullPath`]: the extended
/// prefix is prepended (`\\?\` locally, `\\?\UNC\` for shares), alternate
/// separators become backslashes, and dot segments are folded. Inputs that
/// already carry a native prefix pass through unchanged, which makes the
/// conversion idempotent. Relative inputs are validated and tagged
/// [`PathKind::Relative`]; resolving them needs a base via [`full_path`].
pub fn normalize(input: &str, options: PathFormatOptions) -> Result<CanonicalPath> {
    if input.trim().is_empty() {
        return Err(PathError::InvalidArgument {
            reason: "path is empty or whitespace-only".to_string(),
        });
    }

    if options.check_supported_format {
        check_supported_format(input)?;
    }
    if options.check_invalid_path_chars {
        check_invalid_chars(input, options.check_additional)?;
    }

    let (value, kind) = if has_native_prefix(input) {
        (input.to_string(), PathKind::LongFullPath)
    } else if is_unc(input) {
        let body = input.replace('/', "\\");
        let folded = fold_dot_segments(&body, root_len(&body))?;
        (
            format!("{}{}", LONG_PATH_UNC_PREFIX, &folded[2..]),
            PathKind::LongFullPath,
        )
    } else if is_drive_absolute(input) {
        let body = input.replace('/', "\\");
        let folded = fold_dot_segments(&body, 3)?;
        (
            format!("{}{}", LONG_PATH_PREFIX, folded),
            PathKind::LongFullPath,
        )
    } else {
        // Includes drive-relative (`C:folder`) and current-drive-rooted
        // (`\folder`) inputs, which only a base directory can anchor.
        (input.to_string(), PathKind::Relative)
    };

    Ok(CanonicalPath {
        value: apply_trailing(value, options),
        kind,
    })
}

/// Resolve `input` against an absolute `base`, producing a long canonical
/// path.
///
/// Rooted inputs ignore the base entirely (combine right-bias). Inputs
/// rooted only by a single leading separator are re-anchored onto the
/// base's root. The combined path is resolved against the real filesystem
/// where possible; when the target does not exist the lexical result is
/// used if `continue_on_nonexist` is set, otherwise the resolution fails
/// with [`PathError::NotFound`].
///
/// Drive-relative inputs (`C:folder`) are rejected: anchoring them needs a
/// per-drive current directory, which this layer does not model.
pub fn full_path(base: &str, input: &str, options: PathFormatOptions) -> Result<CanonicalPath> {
    if is_drive_absolute(input) || is_unc(input) || has_native_prefix(input) {
        return normalize(input, options);
    }

    let bytes = input.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && !is_separator(*bytes.get(2).unwrap_or(&b' ') as char)
    {
        return Err(PathError::InvalidArgument {
            reason: format!("drive-relative path is not supported: {:?}", input),
        });
    }

    let base_regular = normalize(base, options)?.to_regular();
    let base_str = base_regular.as_str();
    if base_regular.kind() == PathKind::Relative {
        return Err(PathError::InvalidArgument {
            reason: format!("base directory must be absolute: {:?}", base),
        });
    }

    let combined = if input.chars().next().is_some_and(is_separator) {
        // Re-anchor onto the base's root: `\x` against `C:\work` is `C:\x`.
        let root = &base_str[..root_len(base_str)];
        format!("{}{}", root.trim_end_matches(is_separator), input)
    } else {
        combine(&[base_str, input])?
    };

    let lexical = fold_dot_segments(&combined.replace('/', "\\"), root_len(&combined))?;

    match dunce::canonicalize(&lexical) {
        Ok(resolved) => normalize(&resolved.to_string_lossy(), options),
        Err(e) => {
            if options.continue_on_nonexist {
                tracing::debug!(
                    "cannot canonicalize '{}': {}; using lexical resolution",
                    lexical,
                    e
                );
                normalize(&lexical, options)
            } else {
                Err(PathError::NotFound { path: lexical })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> PathFormatOptions {
        PathFormatOptions::full_check()
    }

    #[test]
    fn test_normalize_rejects_empty_and_whitespace() {
        for input in ["", "   ", "\t"] {
            assert!(matches!(
                normalize(input, opts()),
                Err(PathError::InvalidArgument { .. })
            ));
        }
    }

    #[test]
    fn test_normalize_adds_long_prefix_to_drive_paths() {
        let p = normalize(r"C:\folder\file.txt", opts()).unwrap();
        assert_eq!(p.as_str(), r"\\?\C:\folder\file.txt");
        assert_eq!(p.kind(), PathKind::LongFullPath);
    }

    #[test]
    fn test_normalize_adds_unc_prefix_to_share_paths() {
        let p = normalize(r"\\server\share\folder", opts()).unwrap();
        assert_eq!(p.as_str(), r"\\?\UNC\server\share\folder");
        assert_eq!(p.kind(), PathKind::LongFullPath);
    }

    #[test]
    fn test_normalize_passes_prefixed_paths_through() {
        for input in [
            r"\\?\C:\folder",
            r"\\?\UNC\server\share",
            r"\\.\PhysicalDrive0",
            r"\Device\HarddiskVolume1",
            r"\??\C:\mapped",
        ] {
            let p = normalize(input, opts()).unwrap();
            assert_eq!(p.as_str(), input);
            assert_eq!(p.kind(), PathKind::LongFullPath);
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in [r"C:\folder\sub", r"\\server\share\x", r"relative\path"] {
            let once = normalize(input, opts()).unwrap();
            let twice = normalize(once.as_str(), opts()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_normalize_converts_alternate_separators() {
        let p = normalize("C:/folder/sub", opts()).unwrap();
        assert_eq!(p.as_str(), r"\\?\C:\folder\sub");
    }

    #[test]
    fn test_normalize_folds_dot_segments_in_rooted_paths() {
        let p = normalize(r"C:\a\.\b\..\c", opts()).unwrap();
        assert_eq!(p.as_str(), r"\\?\C:\a\c");
    }

    #[test]
    fn test_normalize_rejects_root_escape() {
        assert!(matches!(
            normalize(r"C:\a\..\..\b", opts()),
            Err(PathError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_normalize_keeps_relative_paths_relative() {
        let p = normalize(r"some\relative", opts()).unwrap();
        assert_eq!(p.kind(), PathKind::Relative);
        assert_eq!(p.as_str(), r"some\relative");

        // Drive-relative and current-drive-rooted forms have no anchor yet.
        assert_eq!(normalize("C:folder", opts()).unwrap().kind(), PathKind::Relative);
        assert_eq!(normalize(r"\folder", opts()).unwrap().kind(), PathKind::Relative);
    }

    #[test]
    fn test_invalid_character_carries_char_and_index() {
        match normalize("C:\\fol<der", opts()) {
            Err(PathError::InvalidCharacter {
                character,
                index,
                path,
            }) => {
                assert_eq!(character, '<');
                assert_eq!(index, 6);
                assert_eq!(path, "C:\\fol<der");
            }
            other => panic!("expected InvalidCharacter, got {:?}", other),
        }
    }

    #[test]
    fn test_wildcards_rejected_only_with_additional_check() {
        assert!(normalize(r"C:\files\*", opts()).is_ok());

        let mut strict = opts();
        strict.check_additional = true;
        assert!(matches!(
            normalize(r"C:\files\*", strict),
            Err(PathError::InvalidCharacter { character: '*', .. })
        ));
    }

    #[test]
    fn test_validation_skips_the_extended_prefix_itself() {
        let mut strict = opts();
        strict.check_additional = true;
        // The `?` inside `\\?\` must not trip the wildcard check.
        assert!(normalize(r"\\?\C:\clean", strict).is_ok());
    }

    #[test]
    fn test_validation_can_be_disabled_for_trusted_callers() {
        assert!(normalize("C:\\fol<der", PathFormatOptions::trusted()).is_ok());
    }

    #[test]
    fn test_supported_format_rejects_empty_device_and_misplaced_colon() {
        assert!(matches!(
            normalize(r"\\.\", opts()),
            Err(PathError::InvalidArgument { .. })
        ));
        assert!(matches!(
            normalize(":stream", opts()),
            Err(PathError::InvalidArgument { .. })
        ));
        assert!(matches!(
            normalize("1:\\x", opts()),
            Err(PathError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_trailing_separator_removal_before_add() {
        let mut o = opts();
        o.remove_trailing_separator = true;
        o.add_trailing_separator = true;
        let p = normalize(r"C:\folder\\", o).unwrap();
        assert_eq!(p.as_str(), r"\\?\C:\folder\");
    }

    #[test]
    fn test_trailing_separator_never_doubles_a_drive_root() {
        let mut o = opts();
        o.add_trailing_separator = true;
        let p = normalize(r"C:\", o).unwrap();
        assert_eq!(p.as_str(), r"\\?\C:\");

        let mut r = opts();
        r.remove_trailing_separator = true;
        let p = normalize(r"C:\", r).unwrap();
        // The root separator survives removal.
        assert_eq!(p.as_str(), r"\\?\C:\");
    }

    #[test]
    fn test_is_unc_classification() {
        assert!(is_unc(r"\\server\share"));
        assert!(is_unc(r"\\?\UNC\server\share"));
        assert!(!is_unc(r"C:\folder"));
        assert!(!is_unc(r"\\.\PhysicalDrive0"));
        assert!(!is_unc(r"\\?\C:\folder"));
        assert!(!is_unc(r"\single\separator"));
    }

    #[test]
    fn test_is_rooted_classification() {
        assert!(is_rooted(r"C:\x"));
        assert!(is_rooted("C:x"));
        assert!(is_rooted(r"\x"));
        assert!(is_rooted(r"\\server\share"));
        assert!(!is_rooted("plain"));
        assert!(!is_rooted(""));
    }

    #[test]
    fn test_is_logical_drive() {
        assert!(is_logical_drive("C:"));
        assert!(is_logical_drive(r"C:\"));
        assert!(!is_logical_drive(r"C:\x"));
        assert!(!is_logical_drive("1:"));
    }

    #[test]
    fn test_to_regular_strips_the_extended_prefix() {
        let long = normalize(r"C:\folder\file", opts()).unwrap();
        let regular = long.to_regular();
        assert_eq!(regular.as_str(), r"C:\folder\file");
        assert_eq!(regular.kind(), PathKind::FullPath);
    }

    #[test]
    fn test_full_path_ignores_base_for_rooted_input() {
        let p = full_path(r"C:\work", r"D:\other\file", opts()).unwrap();
        assert_eq!(p.as_str(), r"\\?\D:\other\file");
    }

    #[test]
    fn test_full_path_resolves_relative_lexically_when_missing() {
        let mut o = opts();
        o.continue_on_nonexist = true;
        let p = full_path(r"C:\work", r"sub\..\notes.txt", o).unwrap();
        assert_eq!(p.as_str(), r"\\?\C:\work\notes.txt");
    }

    #[test]
    fn test_full_path_reanchors_single_separator_input() {
        let mut o = opts();
        o.continue_on_nonexist = true;
        let p = full_path(r"C:\work\deep", r"\top", o).unwrap();
        assert_eq!(p.as_str(), r"\\?\C:\top");

        let p = full_path(r"\\server\share\deep", r"\top", o).unwrap();
        assert_eq!(p.as_str(), r"\\?\UNC\server\share\top");
    }

    #[test]
    fn test_full_path_rejects_missing_target_without_continue() {
        let result = full_path(r"C:\does", r"not\exist", opts());
        assert!(matches!(result, Err(PathError::NotFound { .. })));
    }

    #[test]
    fn test_full_path_rejects_relative_base_and_drive_relative_input() {
        let mut o = opts();
        o.continue_on_nonexist = true;
        assert!(matches!(
            full_path("relative", "x", o),
            Err(PathError::InvalidArgument { .. })
        ));
        assert!(matches!(
            full_path(r"C:\work", "C:folder", o),
            Err(PathError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_options_round_trip_through_serde_with_defaults() {
        let parsed: PathFormatOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, PathFormatOptions::full_check());

        let parsed: PathFormatOptions =
            serde_json::from_str(r#"{"check_additional": true, "add_trailing_separator": true}"#)
                .unwrap();
        assert!(parsed.check_additional);
        assert!(parsed.add_trailing_separator);
        assert!(parsed.check_invalid_path_chars);
    }
}
