//! STL (Stereolithography) file format support.
//!
//! Supports both ASCII and binary STL formats.
//!
//! # Format Detection
//!
//! The loader automatically detects whether a file is ASCII or binary:
//! - Binary files are exactly `84 + 50 * N` bytes, where `N` is the count
//!   stored after the 80-byte header; this wins even if the header text
//!   starts with "solid"
//! - ASCII files start with "solid" (after optional whitespace)
//!
//! A binary file of any other size is rejected rather than truncated.
//!
//! # Binary Format
//!
//! ```text
//! UINT8[80]    – Header (free-form, often contains file info)
//! UINT32       – Number of triangles
//! foreach triangle
//!     REAL32[3] – Normal vector
//!     REAL32[3] – Vertex 1
//!     REAL32[3] – Vertex 2
//!     REAL32[3] – Vertex 3
//!     UINT16    – Attribute byte count
//! end
//! ```
//!
//! # ASCII Format
//!
//! ```text
//! solid name
//!   facet normal ni nj nk
//!     outer loop
//!       vertex v1x v1y v1z
//!       vertex v2x v2y v2z
//!       vertex v3x v3y v3z
//!     endloop
//!   endfacet
//!   ...
//! endsolid name
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Instant;

use mesh_types::{LoadingState, MeshFormat, Model, Triangle, Vector3};
use tracing::{debug, info, trace};

use crate::detect::{declared_triangle_count, stl_variant, validate_binary_stl};
use crate::error::{LoadError, LoadResult, Location, WarningKind};
use crate::file;
use crate::params::LoadParams;
use crate::progress::{percent_of, percent_of_u64, ParseContext};
use crate::registry::MeshParser;
use crate::result::{LoadOutcome, Warnings};

/// STL binary header size in bytes.
pub const BINARY_HEADER_SIZE: usize = 80;

/// Size of one triangle in binary STL (normal + 3 vertices + attribute).
pub const BINARY_TRIANGLE_SIZE: usize = 50;

/// Capacity kept for the ASCII line buffer after a reclamation pass.
const LINE_CAPACITY: usize = 256;

/// Load a model from an STL file.
///
/// Automatically detects ASCII vs binary format.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - A binary file's size does not match its declared triangle count
/// - The ASCII grammar is violated
///
/// # Example
///
/// ```no_run
/// use mesh_loader::load_stl;
///
/// let outcome = load_stl("model.stl").unwrap();
/// println!("Loaded {} triangles", outcome.model.triangle_count());
/// ```
pub fn load_stl<P: AsRef<Path>>(path: P) -> LoadResult<LoadOutcome> {
    StlParser.parse(
        path.as_ref(),
        &mut ParseContext::silent(),
        &LoadParams::default(),
    )
}

/// Parser for both STL variants.
#[derive(Debug, Clone, Copy, Default)]
pub struct StlParser;

impl MeshParser for StlParser {
    fn format(&self) -> MeshFormat {
        MeshFormat::StlBinary
    }

    fn validate(&self, path: &Path) -> LoadResult<()> {
        let window = file::read_window(path)?;
        let variant = stl_variant(&window, file::size_of(path)?);
        crate::detect::validate(path, variant)
    }

    fn read_metadata(&self, path: &Path) -> LoadResult<Model> {
        let window = file::read_window(path)?;
        let size = file::size_of(path)?;
        match stl_variant(&window, size) {
            MeshFormat::StlBinary => {
                validate_binary_stl(&window, size)?;
                let count = declared_triangle_count(&window).unwrap_or(0);
                Ok(Model::metadata(
                    header_text(&window[..BINARY_HEADER_SIZE]),
                    MeshFormat::StlBinary,
                    size,
                    count as usize,
                ))
            }
            _ => {
                let first_line = window.split(|&b| b == b'\n').next().unwrap_or_default();
                let name = String::from_utf8_lossy(file::trim_start(first_line))
                    .get(5..)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                Ok(Model::metadata(name, MeshFormat::StlAscii, size, 0))
            }
        }
    }

    fn parse(
        &self,
        path: &Path,
        ctx: &mut ParseContext<'_>,
        params: &LoadParams,
    ) -> LoadResult<LoadOutcome> {
        let start = Instant::now();
        let window = file::read_window(path)?;
        let size = file::size_of(path)?;
        let variant = stl_variant(&window, size);
        info!(path = %path.display(), format = %variant, size, "Loading STL");

        let reader = BufReader::new(file::open(path)?);
        let mut warnings = Warnings::default();
        let mut model = match variant {
            MeshFormat::StlBinary => {
                validate_binary_stl(&window, size)?;
                read_binary(reader, size, ctx, params)?
            }
            _ => read_ascii(reader, size, ctx, params)?,
        };
        if model.triangles.is_empty() {
            warnings.push(WarningKind::EmptyInput, "STL file contains no facets");
        }

        model.stats.parse_time = start.elapsed();
        ctx.finish("STL loaded");
        info!(
            triangles = model.stats.triangle_count,
            elapsed_ms = model.stats.parse_time.as_millis(),
            "STL load complete"
        );
        Ok(LoadOutcome {
            model,
            warnings: warnings.into_vec(),
        })
    }

    fn parse_low_res(
        &self,
        path: &Path,
        ctx: &mut ParseContext<'_>,
        params: &LoadParams,
    ) -> LoadResult<LoadOutcome> {
        let window = file::read_window(path)?;
        let size = file::size_of(path)?;
        if stl_variant(&window, size) != MeshFormat::StlBinary {
            let full = self.parse(path, ctx, params)?;
            return Ok(crate::progressive::subsample(
                full,
                params.low_res_max_triangles,
            ));
        }
        validate_binary_stl(&window, size)?;
        load_binary_sampled(path, size, ctx, params)
    }
}

/// Header text with NUL and space padding removed.
fn header_text(header: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(header);
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Read a binary STL whose size has already been validated.
fn read_binary<R: Read>(
    mut reader: R,
    file_size: u64,
    ctx: &mut ParseContext<'_>,
    params: &LoadParams,
) -> LoadResult<Model> {
    let mut header = [0u8; BINARY_HEADER_SIZE + 4];
    reader
        .read_exact(&mut header)
        .map_err(|e| truncated(e, 0))?;
    let count = declared_triangle_count(&header).unwrap_or(0) as usize;

    let mut triangles = Vec::with_capacity(count);
    let chunk_len = params.reclaim_interval.max(1).min(count.max(1));
    let mut scratch = Vec::new();
    let mut since_reclaim = 0usize;

    while triangles.len() < count {
        let in_chunk = chunk_len.min(count - triangles.len());
        scratch.resize(in_chunk * BINARY_TRIANGLE_SIZE, 0);
        let offset = (BINARY_HEADER_SIZE + 4 + triangles.len() * BINARY_TRIANGLE_SIZE) as u64;
        reader
            .read_exact(&mut scratch)
            .map_err(|e| truncated(e, offset))?;

        for record in scratch.chunks_exact(BINARY_TRIANGLE_SIZE) {
            triangles.push(decode_record(record));
            ctx.tick(triangles.len(), count, "Reading STL triangles")?;
        }

        since_reclaim += in_chunk;
        if since_reclaim >= params.reclaim_interval {
            scratch = Vec::new();
            since_reclaim = 0;
            trace!(read = triangles.len(), "released STL read buffer");
        }
    }

    let mut model = Model::from_triangles(
        header_text(&header[..BINARY_HEADER_SIZE]),
        triangles,
        MeshFormat::StlBinary,
        file_size,
    );
    model.loading_state = LoadingState::FullGeometry;
    Ok(model)
}

/// Read an evenly strided subset of a validated binary STL by seeking past
/// the records that are not kept.
fn load_binary_sampled(
    path: &Path,
    file_size: u64,
    ctx: &mut ParseContext<'_>,
    params: &LoadParams,
) -> LoadResult<LoadOutcome> {
    let start = Instant::now();
    let mut reader = BufReader::new(file::open(path)?);
    let mut header = [0u8; BINARY_HEADER_SIZE + 4];
    reader
        .read_exact(&mut header)
        .map_err(|e| truncated(e, 0))?;
    let count = declared_triangle_count(&header).unwrap_or(0) as usize;
    let budget = params.low_res_max_triangles.max(1);
    let stride = count.div_ceil(budget).max(1);

    let mut triangles = Vec::with_capacity(count.min(budget));
    let mut record = [0u8; BINARY_TRIANGLE_SIZE];
    for index in (0..count).step_by(stride) {
        let offset = (BINARY_HEADER_SIZE + 4 + index * BINARY_TRIANGLE_SIZE) as u64;
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| LoadError::file_access(path, e))?;
        reader
            .read_exact(&mut record)
            .map_err(|e| truncated(e, offset))?;
        triangles.push(decode_record(&record));
        ctx.tick_with(triangles.len(), "Sampling STL triangles", || {
            percent_of(index, count)
        })?;
    }

    let kept = triangles.len();
    let mut model = Model::from_triangles(
        header_text(&header[..BINARY_HEADER_SIZE]),
        triangles,
        MeshFormat::StlBinary,
        file_size,
    );
    model.loading_state = LoadingState::LowResGeometry;
    model.stats.parse_time = start.elapsed();
    debug!(kept, total = count, stride, "sampled binary STL");

    let mut warnings = Warnings::default();
    if kept < count {
        warnings.push(
            WarningKind::Subsampled,
            format!("low-resolution stage kept {kept} of {count} triangles (every {stride})"),
        );
    }
    ctx.finish("STL preview loaded");
    Ok(LoadOutcome {
        model,
        warnings: warnings.into_vec(),
    })
}

fn truncated(err: std::io::Error, offset: u64) -> LoadError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        LoadError::parse_at("truncated triangle data", Location::ByteOffset(offset))
    } else {
        LoadError::parse_at(format!("read failed: {err}"), Location::ByteOffset(offset))
    }
}

/// Decode one 50-byte triangle record.
fn decode_record(record: &[u8]) -> Triangle {
    let normal = read_vector(&record[0..12]);
    let v0 = read_vector(&record[12..24]);
    let v1 = read_vector(&record[24..36]);
    let v2 = read_vector(&record[36..48]);
    let attribute = u16::from_le_bytes([record[48], record[49]]);
    Triangle::new(normal, [v0, v1, v2], attribute)
}

/// Read a vector from 12 bytes (3 little-endian f32s).
fn read_vector(buf: &[u8]) -> Vector3<f32> {
    let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let z = f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    Vector3::new(x, y, z)
}

/// Whitespace-delimited tokens of an ASCII STL, tracking line numbers.
struct Tokens<R> {
    reader: R,
    line: String,
    cursor: usize,
    line_no: usize,
    bytes_read: u64,
}

impl<R: BufRead> Tokens<R> {
    const fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            cursor: 0,
            line_no: 0,
            bytes_read: 0,
        }
    }

    /// Load the next line; `false` at end of input.
    fn advance(&mut self) -> LoadResult<bool> {
        self.line.clear();
        self.cursor = 0;
        let n = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| LoadError::parse_at(format!("read failed: {e}"), self.location()))?;
        if n == 0 {
            return Ok(false);
        }
        self.line_no += 1;
        self.bytes_read += n as u64;
        Ok(true)
    }

    /// Byte range of the next token in `self.line`.
    fn next_range(&mut self) -> LoadResult<Option<(usize, usize)>> {
        loop {
            let rest = &self.line[self.cursor..];
            if let Some(skip) = rest.find(|c: char| !c.is_whitespace()) {
                let start = self.cursor + skip;
                let len = self.line[start..]
                    .find(char::is_whitespace)
                    .unwrap_or(self.line.len() - start);
                self.cursor = start + len;
                return Ok(Some((start, start + len)));
            }
            if !self.advance()? {
                return Ok(None);
            }
        }
    }

    fn expect(&mut self, keyword: &str) -> LoadResult<()> {
        let Some((s, e)) = self.next_range()? else {
            return Err(LoadError::parse_at(
                format!("unexpected end of file, expected '{keyword}'"),
                self.location(),
            ));
        };
        let tok = &self.line[s..e];
        if tok.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(LoadError::parse_at(
                format!("expected '{keyword}', found '{tok}'"),
                Location::Line(self.line_no),
            ))
        }
    }

    fn float(&mut self) -> LoadResult<f32> {
        let Some((s, e)) = self.next_range()? else {
            return Err(LoadError::parse_at(
                "unexpected end of file, expected a number",
                self.location(),
            ));
        };
        let tok = &self.line[s..e];
        tok.parse::<f32>().map_err(|_| {
            LoadError::parse_at(
                format!("invalid number '{tok}'"),
                Location::Line(self.line_no),
            )
        })
    }

    fn vector(&mut self) -> LoadResult<Vector3<f32>> {
        Ok(Vector3::new(self.float()?, self.float()?, self.float()?))
    }

    /// Remainder of the current line, consumed.
    fn rest_of_line(&mut self) -> String {
        let rest = self.line[self.cursor..].trim().to_string();
        self.cursor = self.line.len();
        rest
    }

    fn location(&self) -> Location {
        Location::Line(self.line_no)
    }

    /// Drop excess line-buffer capacity left by an unusually long line.
    fn reclaim(&mut self) {
        if self.line.capacity() > LINE_CAPACITY {
            let keep = self.line[self.cursor..].to_string();
            self.cursor = 0;
            self.line = keep;
            self.line.shrink_to(LINE_CAPACITY);
        }
    }
}

/// Read an ASCII STL.
fn read_ascii<R: BufRead>(
    reader: R,
    file_size: u64,
    ctx: &mut ParseContext<'_>,
    params: &LoadParams,
) -> LoadResult<Model> {
    let mut tokens = Tokens::new(reader);
    tokens.expect("solid")?;
    let name = tokens.rest_of_line();
    let header = (!name.is_empty()).then_some(name);

    let mut triangles = Vec::new();
    let mut since_reclaim = 0usize;

    loop {
        let Some((s, e)) = tokens.next_range()? else {
            debug!(line = tokens.line_no, "ASCII STL ended without 'endsolid'");
            break;
        };
        let keyword = tokens.line[s..e].to_ascii_lowercase();
        match keyword.as_str() {
            "facet" => {
                triangles.push(read_facet(&mut tokens)?);
                let bytes = tokens.bytes_read;
                ctx.tick_with(triangles.len(), "Reading STL facets", || {
                    percent_of_u64(bytes, file_size)
                })?;
                since_reclaim += 1;
                if since_reclaim >= params.reclaim_interval {
                    tokens.reclaim();
                    since_reclaim = 0;
                    trace!(read = triangles.len(), "reclaimed STL line buffer");
                }
            }
            "endsolid" => {
                tokens.rest_of_line();
                // Some exporters concatenate several solids into one file.
                let Some((s, e)) = tokens.next_range()? else {
                    break;
                };
                if tokens.line[s..e].eq_ignore_ascii_case("solid") {
                    tokens.rest_of_line();
                } else {
                    let message = format!("unexpected '{}' after 'endsolid'", &tokens.line[s..e]);
                    return Err(LoadError::parse_at(message, tokens.location()));
                }
            }
            other => {
                let message = format!("expected 'facet' or 'endsolid', found '{other}'");
                return Err(LoadError::parse_at(message, tokens.location()));
            }
        }
    }

    Ok(Model::from_triangles(
        header,
        triangles,
        MeshFormat::StlAscii,
        file_size,
    ))
}

/// Read one facet after its `facet` keyword.
fn read_facet<R: BufRead>(tokens: &mut Tokens<R>) -> LoadResult<Triangle> {
    let facet_line = tokens.location();
    tokens.expect("normal")?;
    let normal = tokens.vector()?;
    tokens.expect("outer")?;
    tokens.expect("loop")?;

    let mut vertices = Vec::with_capacity(3);
    loop {
        let Some((s, e)) = tokens.next_range()? else {
            return Err(LoadError::parse_at(
                "unexpected end of file inside facet",
                tokens.location(),
            ));
        };
        let tok = &tokens.line[s..e];
        if tok.eq_ignore_ascii_case("vertex") {
            vertices.push(tokens.vector()?);
        } else if tok.eq_ignore_ascii_case("endloop") {
            break;
        } else {
            return Err(LoadError::parse_at(
                format!("expected 'vertex' or 'endloop', found '{tok}'"),
                Location::Line(tokens.line_no),
            ));
        }
    }
    let vertices: [Vector3<f32>; 3] = vertices.try_into().map_err(|v: Vec<Vector3<f32>>| {
        LoadError::parse_at(
            format!("facet has {} vertices, expected exactly 3", v.len()),
            facet_line,
        )
    })?;
    tokens.expect("endfacet")?;
    Ok(Triangle::new(normal, vertices, 0))
}

/// Save a model to an STL file.
///
/// Triangle normals and attributes are written as stored.
///
/// # Arguments
///
/// * `model` - The model to save
/// * `path` - Output file path
/// * `binary` - If true, save as binary STL; if false, save as ASCII
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_stl<P: AsRef<Path>>(model: &Model, path: P, binary: bool) -> LoadResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| LoadError::file_access(path, e))?;
    let writer = BufWriter::new(file);

    let result = if binary {
        save_stl_binary(model, writer)
    } else {
        save_stl_ascii(model, writer)
    };
    result.map_err(|e| LoadError::file_access(path, e))
}

/// Save model as binary STL.
fn save_stl_binary<W: Write>(model: &Model, mut writer: W) -> std::io::Result<()> {
    let mut header = [b' '; BINARY_HEADER_SIZE];
    let text = model
        .header
        .as_deref()
        .unwrap_or("Binary STL generated by CortenForge mesh-loader")
        .as_bytes();
    let len = text.len().min(BINARY_HEADER_SIZE);
    header[..len].copy_from_slice(&text[..len]);
    writer.write_all(&header)?;

    let count = u32::try_from(model.triangles.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "binary STL holds at most u32::MAX triangles",
        )
    })?;
    writer.write_all(&count.to_le_bytes())?;

    for tri in &model.triangles {
        write_vector(&mut writer, &tri.normal)?;
        for v in &tri.vertices {
            write_vector(&mut writer, v)?;
        }
        writer.write_all(&tri.attribute.to_le_bytes())?;
    }
    writer.flush()
}

fn write_vector<W: Write>(writer: &mut W, v: &Vector3<f32>) -> std::io::Result<()> {
    writer.write_all(&v.x.to_le_bytes())?;
    writer.write_all(&v.y.to_le_bytes())?;
    writer.write_all(&v.z.to_le_bytes())
}

/// Save model as ASCII STL.
fn save_stl_ascii<W: Write>(model: &Model, mut writer: W) -> std::io::Result<()> {
    let name = model.header.as_deref().unwrap_or("mesh");
    writeln!(writer, "solid {name}")?;
    for tri in &model.triangles {
        let n = tri.normal;
        writeln!(writer, "  facet normal {:e} {:e} {:e}", n.x, n.y, n.z)?;
        writeln!(writer, "    outer loop")?;
        for v in &tri.vertices {
            writeln!(writer, "      vertex {:e} {:e} {:e}", v.x, v.y, v.z)?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid {name}")?;
    writer.flush()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::unnecessary_raw_string_hashes
)]
mod tests {
    use super::*;
    use crate::progress::CancellationToken;

    fn parse_ascii(text: &[u8]) -> LoadResult<Model> {
        read_ascii(
            BufReader::new(text),
            text.len() as u64,
            &mut ParseContext::silent(),
            &LoadParams::default(),
        )
    }

    fn binary_bytes(triangles: &[Triangle]) -> Vec<u8> {
        let model = Model::from_triangles(None, triangles.to_vec(), MeshFormat::StlBinary, 0);
        let mut bytes = Vec::new();
        save_stl_binary(&model, &mut bytes).unwrap();
        bytes
    }

    fn sample_triangle() -> Triangle {
        Triangle::new(
            Vector3::new(0.0, 0.0, 1.0),
            [
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            7,
        )
    }

    #[test]
    fn ascii_stl_parsing() {
        let ascii_stl = br#"solid test
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid test"#;

        let m = parse_ascii(ascii_stl).unwrap();
        assert_eq!(m.triangle_count(), 1);
        assert_eq!(m.stats.vertex_count, 3);
        assert_eq!(m.header.as_deref(), Some("test"));
        assert_eq!(m.triangles[0].normal, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(m.stats.format, MeshFormat::StlAscii);
    }

    #[test]
    fn ascii_is_whitespace_insensitive() {
        let text = b"solid\n facet normal 0 0 1 outer loop\nvertex 0 0 0 vertex 1 0 0\n\n\tvertex 0 1 0\nendloop endfacet\nENDSOLID";
        let m = parse_ascii(text).unwrap();
        assert_eq!(m.triangle_count(), 1);
        assert!(m.header.is_none());
    }

    #[test]
    fn ascii_facet_with_two_vertices_fails() {
        let text = b"solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nendloop\nendfacet\nendsolid t\n";
        let err = parse_ascii(text).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Parse {
                location: Location::Line(2),
                ..
            }
        ));
        assert!(format!("{err}").contains("2 vertices"));
    }

    #[test]
    fn ascii_facet_with_four_vertices_fails() {
        let text = b"solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nvertex 1 1 0\nvertex 0 1 0\nendloop\nendfacet\n";
        assert!(parse_ascii(text).is_err());
    }

    #[test]
    fn ascii_bad_number_reports_line() {
        let text = b"solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 zero 0\n";
        let err = parse_ascii(text).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Parse {
                location: Location::Line(4),
                ..
            }
        ));
    }

    #[test]
    fn ascii_multiple_solids() {
        let one = "facet normal 0 0 1 outer loop vertex 0 0 0 vertex 1 0 0 vertex 0 1 0 endloop endfacet";
        let text = format!("solid a\n{one}\nendsolid a\nsolid b\n{one}\n{one}\nendsolid b\n");
        let m = parse_ascii(text.as_bytes()).unwrap();
        assert_eq!(m.triangle_count(), 3);
    }

    #[test]
    fn binary_record_layout() {
        let bytes = binary_bytes(&[sample_triangle()]);
        assert_eq!(bytes.len(), 84 + 50);
        let m = read_binary(
            &bytes[..],
            bytes.len() as u64,
            &mut ParseContext::silent(),
            &LoadParams::default(),
        )
        .unwrap();
        assert_eq!(m.triangles[0], sample_triangle());
        assert_eq!(m.triangles[0].attribute, 7);
    }

    #[test]
    fn binary_small_reclaim_interval_reads_all_chunks() {
        let tris = vec![sample_triangle(); 10];
        let bytes = binary_bytes(&tris);
        let params = LoadParams::default().with_reclaim_interval(3);
        let m = read_binary(
            &bytes[..],
            bytes.len() as u64,
            &mut ParseContext::silent(),
            &params,
        )
        .unwrap();
        assert_eq!(m.triangle_count(), 10);
    }

    #[test]
    fn binary_cancellation_discards_result() {
        let tris = vec![sample_triangle(); 100];
        let bytes = binary_bytes(&tris);
        let token = CancellationToken::new();
        token.cancel();
        let mut ctx = ParseContext::new(None, Some(&token), 10);
        let result = read_binary(&bytes[..], bytes.len() as u64, &mut ctx, &LoadParams::default());
        assert!(matches!(result, Err(LoadError::Cancelled)));
    }

    #[test]
    fn header_text_is_trimmed() {
        let mut header = [0u8; BINARY_HEADER_SIZE];
        header[..7].copy_from_slice(b"bracket");
        assert_eq!(header_text(&header).as_deref(), Some("bracket"));
        assert!(header_text(&[b' '; BINARY_HEADER_SIZE]).is_none());
    }

    #[test]
    fn roundtrip_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.stl");
        let original = Model::from_triangles(
            Some("part".to_string()),
            vec![sample_triangle()],
            MeshFormat::StlBinary,
            0,
        );
        save_stl(&original, &path, true).unwrap();

        let loaded = load_stl(&path).unwrap().model;
        assert_eq!(loaded.triangles, original.triangles);
        assert_eq!(loaded.header.as_deref(), Some("part"));
        assert_eq!(loaded.stats.file_size, 134);
    }

    #[test]
    fn roundtrip_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_ascii.stl");
        let original =
            Model::from_triangles(None, vec![sample_triangle()], MeshFormat::StlAscii, 0);
        save_stl(&original, &path, false).unwrap();

        let loaded = load_stl(&path).unwrap().model;
        assert_eq!(loaded.stats.format, MeshFormat::StlAscii);
        assert_eq!(loaded.triangle_count(), 1);
        let v1 = loaded.triangles[0].vertices[1];
        assert!((v1.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn load_nonexistent_file() {
        let result = load_stl("nonexistent_file_12345.stl");
        assert!(matches!(result, Err(LoadError::FileAccess { .. })));
    }
}
