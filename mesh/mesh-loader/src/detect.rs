//! Format detection and cheap structural validation.
//!
//! Detection looks at the extension first and only falls back to content
//! when the extension is missing or ambiguous (STL's binary and ASCII
//! variants share one). Content checks read at most
//! [`SNIFF_WINDOW`](crate::file::SNIFF_WINDOW) bytes plus the file length,
//! so their cost does not grow with the file.

use std::io::{BufReader, Read};
use std::path::Path;

use mesh_types::MeshFormat;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{LoadError, LoadResult, Location};
use crate::file::{self, contains_ignore_case, trim_start};
use crate::stl::{BINARY_HEADER_SIZE, BINARY_TRIANGLE_SIZE};
use crate::threemf::find_model_entry;

/// File identification token every STEP file starts with.
pub const STEP_MAGIC: &[u8] = b"ISO-10303-21;";

/// Local file header signature of a ZIP archive.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Detect the format of a file.
///
/// # Errors
///
/// Returns [`LoadError::FileAccess`] if the file cannot be read and
/// [`LoadError::UnknownFormat`] if nothing matches.
///
/// # Example
///
/// ```no_run
/// use mesh_loader::detect;
///
/// let format = detect("part.stl").unwrap();
/// println!("{format}");
/// ```
pub fn detect<P: AsRef<Path>>(path: P) -> LoadResult<MeshFormat> {
    let path = path.as_ref();
    match MeshFormat::from_path(path) {
        Some(format) if format.is_stl() => {
            let window = file::read_window(path)?;
            let size = file::size_of(path)?;
            Ok(stl_variant(&window, size))
        }
        Some(format) => {
            // Surface a missing file here rather than later.
            file::size_of(path)?;
            Ok(format)
        }
        None => sniff_file(path),
    }
}

/// Detect the format and verify that the content matches it.
///
/// # Errors
///
/// As [`detect`], plus [`LoadError::Structural`] when the content does
/// not match the detected format.
pub fn detect_verified<P: AsRef<Path>>(path: P) -> LoadResult<MeshFormat> {
    let path = path.as_ref();
    let format = detect(path)?;
    validate(path, format)?;
    Ok(format)
}

/// Check the container structure of a file against a format.
///
/// Only headers and markers are inspected; no geometry is parsed.
///
/// # Errors
///
/// Returns [`LoadError::Structural`] describing the first mismatch, or
/// [`LoadError::FileAccess`] if the file cannot be read.
pub fn validate<P: AsRef<Path>>(path: P, format: MeshFormat) -> LoadResult<()> {
    let path = path.as_ref();
    match format {
        MeshFormat::StlBinary => {
            let window = file::read_window(path)?;
            validate_binary_stl(&window, file::size_of(path)?)
        }
        MeshFormat::StlAscii => validate_ascii_stl(&file::read_window(path)?),
        MeshFormat::Obj => validate_obj(&file::read_window(path)?),
        MeshFormat::Step => validate_step(&file::read_window(path)?),
        MeshFormat::ThreeMf => validate_3mf(path),
    }
}

/// Guess the format from content alone.
fn sniff_file(path: &Path) -> LoadResult<MeshFormat> {
    let window = file::read_window(path)?;
    let size = file::size_of(path)?;

    if binary_stl_size_matches(&window, size) {
        return Ok(MeshFormat::StlBinary);
    }
    if trim_start(&window).starts_with(STEP_MAGIC) {
        return Ok(MeshFormat::Step);
    }
    if is_ascii_stl(&window) {
        return Ok(MeshFormat::StlAscii);
    }
    if window.starts_with(ZIP_MAGIC) && validate_3mf(path).is_ok() {
        return Ok(MeshFormat::ThreeMf);
    }
    if has_obj_markers(&window) {
        return Ok(MeshFormat::Obj);
    }

    debug!(path = %path.display(), size, "content did not match any format");
    Err(LoadError::UnknownFormat {
        path: path.to_path_buf(),
        reason: "extension not recognised and content matches no supported format".to_string(),
    })
}

/// Decide between binary and ASCII STL.
///
/// The binary size rule wins even if the header happens to start with
/// `solid`. Otherwise the file is ASCII only if it starts with `solid`,
/// has no NUL bytes and shows `facet normal` or `endsolid` within the
/// window. Anything else is reported as binary so that validation names
/// the size mismatch.
pub(crate) fn stl_variant(window: &[u8], file_size: u64) -> MeshFormat {
    if binary_stl_size_matches(window, file_size) {
        MeshFormat::StlBinary
    } else if looks_like_ascii_stl(window) {
        MeshFormat::StlAscii
    } else {
        MeshFormat::StlBinary
    }
}

/// Triangle count declared in a binary STL header.
pub(crate) fn declared_triangle_count(window: &[u8]) -> Option<u32> {
    let bytes = window.get(BINARY_HEADER_SIZE..BINARY_HEADER_SIZE + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Expected size of a binary STL with `count` triangles.
#[must_use]
pub fn binary_stl_size(count: u32) -> u64 {
    (BINARY_HEADER_SIZE as u64 + 4) + BINARY_TRIANGLE_SIZE as u64 * u64::from(count)
}

fn binary_stl_size_matches(window: &[u8], file_size: u64) -> bool {
    declared_triangle_count(window).is_some_and(|n| binary_stl_size(n) == file_size)
}

fn starts_with_solid(window: &[u8]) -> bool {
    let trimmed = trim_start(window);
    trimmed.len() >= 5 && trimmed[..5].eq_ignore_ascii_case(b"solid")
}

fn looks_like_ascii_stl(window: &[u8]) -> bool {
    starts_with_solid(window)
        && !window.contains(&0)
        && (contains_ignore_case(window, b"facet normal")
            || contains_ignore_case(window, b"endsolid"))
}

fn is_ascii_stl(window: &[u8]) -> bool {
    starts_with_solid(window) && contains_ignore_case(window, b"facet normal")
}

fn has_obj_markers(window: &[u8]) -> bool {
    if window.contains(&0) {
        return false;
    }
    let mut has_vertex = false;
    let mut has_face = false;
    for line in window.split(|&b| b == b'\n') {
        let line = trim_start(line);
        has_vertex |= line.starts_with(b"v ") || line.starts_with(b"v\t");
        has_face |= line.starts_with(b"f ") || line.starts_with(b"f\t");
    }
    has_vertex && has_face
}

pub(crate) fn validate_binary_stl(window: &[u8], file_size: u64) -> LoadResult<()> {
    let Some(count) = declared_triangle_count(window) else {
        return Err(LoadError::structural_at(
            format!(
                "file is {file_size} bytes, a binary STL needs at least {} bytes",
                BINARY_HEADER_SIZE + 4
            ),
            Location::ByteOffset(file_size),
        ));
    };
    let expected = binary_stl_size(count);
    if expected != file_size {
        return Err(LoadError::structural_at(
            format!(
                "size mismatch: header declares {count} triangles ({expected} bytes) \
                 but the file is {file_size} bytes"
            ),
            Location::ByteOffset(BINARY_HEADER_SIZE as u64),
        ));
    }
    Ok(())
}

fn validate_ascii_stl(window: &[u8]) -> LoadResult<()> {
    if !starts_with_solid(window) {
        return Err(LoadError::structural_at(
            "ASCII STL must start with 'solid'",
            Location::ByteOffset(0),
        ));
    }
    if !contains_ignore_case(window, b"facet normal") && !contains_ignore_case(window, b"endsolid")
    {
        return Err(LoadError::structural(
            "ASCII STL has neither 'facet normal' nor 'endsolid' near the start",
        ));
    }
    Ok(())
}

fn validate_obj(window: &[u8]) -> LoadResult<()> {
    if window.contains(&0) {
        return Err(LoadError::structural("OBJ file contains binary data"));
    }
    let has_vertex = window.split(|&b| b == b'\n').any(|line| {
        let line = trim_start(line);
        line.starts_with(b"v ") || line.starts_with(b"v\t")
    });
    if !has_vertex && !window.iter().all(u8::is_ascii_whitespace) {
        return Err(LoadError::structural("OBJ file has no vertex ('v') lines"));
    }
    Ok(())
}

fn validate_step(window: &[u8]) -> LoadResult<()> {
    if !trim_start(window).starts_with(STEP_MAGIC) {
        return Err(LoadError::structural_at(
            "missing 'ISO-10303-21;' file identification",
            Location::ByteOffset(0),
        ));
    }
    if !contains_ignore_case(window, b"DATA;") {
        return Err(LoadError::structural("missing 'DATA;' section marker"));
    }
    Ok(())
}

fn validate_3mf(path: &Path) -> LoadResult<()> {
    let reader = BufReader::new(file::open(path)?);
    let mut archive = ZipArchive::new(reader)
        .map_err(|e| LoadError::structural(format!("not a ZIP archive: {e}")))?;
    let name = find_model_entry(&mut archive)?;

    let entry = archive
        .by_name(&name)
        .map_err(|e| LoadError::structural_at(e.to_string(), Location::Entry(name.clone())))?;
    let mut head = Vec::with_capacity(256);
    entry
        .take(256)
        .read_to_end(&mut head)
        .map_err(|e| LoadError::structural_at(e.to_string(), Location::Entry(name.clone())))?;
    if !trim_start(&head).starts_with(b"<") {
        return Err(LoadError::structural_at(
            "model entry is not an XML document",
            Location::Entry(name),
        ));
    }
    Ok(())
}
