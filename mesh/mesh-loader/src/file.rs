//! File access helpers shared by the detector and the parsers.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{LoadError, LoadResult};

/// Bytes inspected by content sniffing and cheap validation.
pub const SNIFF_WINDOW: usize = 64 * 1024;

/// Open a file, mapping failures to [`LoadError::FileAccess`].
pub fn open(path: &Path) -> LoadResult<File> {
    File::open(path).map_err(|e| LoadError::file_access(path, e))
}

/// Size of a file in bytes.
pub fn size_of(path: &Path) -> LoadResult<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| LoadError::file_access(path, e))
}

/// Read at most [`SNIFF_WINDOW`] bytes from the start of a file.
pub fn read_window(path: &Path) -> LoadResult<Vec<u8>> {
    let file = open(path)?;
    let mut window = Vec::with_capacity(SNIFF_WINDOW);
    file.take(SNIFF_WINDOW as u64)
        .read_to_end(&mut window)
        .map_err(|e| LoadError::file_access(path, e))?;
    Ok(window)
}

/// Read a whole file as UTF-8 text (invalid sequences are replaced).
pub fn read_text(path: &Path) -> LoadResult<String> {
    let bytes = std::fs::read(path).map_err(|e| LoadError::file_access(path, e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// Whether `haystack` contains `needle`, ASCII case-insensitively.
pub fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

/// Skip a UTF-8 byte-order mark and leading ASCII whitespace.
pub fn trim_start(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}
