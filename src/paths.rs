//! Path and encoding utilities.
//!
//! Paths are UTF-8 [`Path`]s everywhere inside the crate; the helpers
//! here cover the two places that need more than `std::path` offers:
//! layer-relative path arithmetic during the scan walk, and the Windows
//! OS boundary (long-path prefixing and UTF-8 ↔ UTF-16 conversion).

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Windows long-path prefix. Paths longer than `MAX_PATH` must carry it
/// before reaching wide-character filesystem APIs.
pub const LONG_PATH_PREFIX: &str = r"\\?\";

/// Strips `base` from `path`, yielding the layer-relative remainder.
///
/// The walkers only ever pass descendants of `base`, so a mismatch is
/// an internal error rather than a user-facing one.
pub fn relative_to<'a>(base: &Path, path: &'a Path) -> Result<&'a Path> {
    path.strip_prefix(base).map_err(|_| {
        Error::Internal(format!(
            "'{}' is not under '{}'",
            path.display(),
            base.display()
        ))
    })
}

/// Returns true if `s` is an absolute path in Windows terms: a UNC path
/// (`\\server\share`, including the `\\?\` long-path form) or a
/// drive-letter path (`C:\` or `C:/`).
pub fn is_windows_absolute(s: &str) -> bool {
    if s.starts_with(r"\\") {
        return true;
    }

    let mut chars = s.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(drive), Some(':'), Some('\\' | '/')) if drive.is_ascii_alphabetic()
    )
}

/// Prepends the `\\?\` long-path prefix and normalizes separators to
/// backslashes. UNC paths become `\\?\UNC\server\share\…`. Paths that
/// already carry the prefix are returned unchanged.
pub fn long_path(path: &Path) -> PathBuf {
    let s = path.to_string_lossy().replace('/', r"\");

    if s.starts_with(LONG_PATH_PREFIX) {
        return PathBuf::from(s);
    }

    if let Some(unc) = s.strip_prefix(r"\\") {
        return PathBuf::from(format!(r"{LONG_PATH_PREFIX}UNC\{unc}"));
    }

    PathBuf::from(format!("{LONG_PATH_PREFIX}{s}"))
}

/// Encodes a UTF-8 string as a null-terminated UTF-16 buffer for the
/// Windows wide-character APIs.
pub fn encode_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Decodes a UTF-16 buffer (with or without a trailing null) back to a
/// UTF-8 string.
pub fn decode_wide(wide: &[u16]) -> Result<String> {
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16(&wide[..end])
        .map_err(|e| Error::Internal(format!("invalid UTF-16 in path: {e}")))
}
