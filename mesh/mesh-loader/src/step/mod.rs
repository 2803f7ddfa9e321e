//! STEP (ISO 10303-21) exchange file support.
//!
//! Only the boundary representation matters here: faces are followed down
//! through bounds, loops, edges and vertices to point coordinates, and each
//! face boundary is triangulated as a planar polygon. Surface geometry
//! beyond that (B-splines, cylinders) is not evaluated.
//!
//! # Structure
//!
//! ```text
//! ISO-10303-21;
//! HEADER;
//! FILE_NAME('part', ...);
//! ENDSEC;
//! DATA;
//! #1 = CARTESIAN_POINT('', (0., 0., 0.));
//! ...
//! ENDSEC;
//! END-ISO-10303-21;
//! ```
//!
//! A face that references an undefined entity is skipped with a warning;
//! the load only fails if faces exist and none of them can be rebuilt.

mod entity;
mod geometry;
mod lexer;
mod triangulate;

use std::path::Path;
use std::time::Instant;

use mesh_types::{face_normal, MeshFormat, Model, Triangle, Vector3};
use tracing::{debug, info, trace};

use crate::error::{LoadError, LoadResult, Location, WarningKind};
use crate::file;
use crate::params::LoadParams;
use crate::progress::{percent_of, ParseContext};
use crate::registry::MeshParser;
use crate::result::{LoadOutcome, Warnings};

use entity::{Entity, EntityTable};
use geometry::Reconstructor;
use lexer::{InstanceBody, Param, Statement, Statements};

const MAGIC: &str = "ISO-10303-21";
const END_MARKER: &str = "END-ISO-10303-21";

/// Share of the progress range spent reading entities; faces take the rest.
const READ_SHARE: u8 = 60;

/// Load a model from a STEP file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the exchange structure is
/// malformed, or no face can be reconstructed.
///
/// # Example
///
/// ```no_run
/// use mesh_loader::load_step;
///
/// let outcome = load_step("bracket.step").unwrap();
/// println!("{} faces triangulated", outcome.model.triangle_count());
/// ```
pub fn load_step<P: AsRef<Path>>(path: P) -> LoadResult<LoadOutcome> {
    StepParser.parse(
        path.as_ref(),
        &mut ParseContext::silent(),
        &LoadParams::default(),
    )
}

/// Parser for STEP physical files.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepParser;

impl MeshParser for StepParser {
    fn format(&self) -> MeshFormat {
        MeshFormat::Step
    }

    fn validate(&self, path: &Path) -> LoadResult<()> {
        crate::detect::validate(path, MeshFormat::Step)
    }

    fn read_metadata(&self, path: &Path) -> LoadResult<Model> {
        self.validate(path)?;
        let window = file::read_window(path)?;
        let text = String::from_utf8_lossy(&window);
        let name = Statements::new(&text)
            .map_while(Result::ok)
            .map_while(|raw| match lexer::parse_statement(&raw.text) {
                Ok(Statement::Keyword(k)) if k == "DATA" => None,
                Ok(statement) => Some(statement),
                Err(_) => Some(Statement::Keyword(String::new())),
            })
            .find_map(|statement| match statement {
                Statement::Record(name, params) if name == "FILE_NAME" => file_name(&params),
                _ => None,
            });
        Ok(Model::metadata(
            name,
            MeshFormat::Step,
            file::size_of(path)?,
            0,
        ))
    }

    fn parse(
        &self,
        path: &Path,
        ctx: &mut ParseContext<'_>,
        params: &LoadParams,
    ) -> LoadResult<LoadOutcome> {
        let start = Instant::now();
        let size = file::size_of(path)?;
        info!(path = %path.display(), size, "Loading STEP");

        let text = file::read_text(path)?;
        let mut warnings = Warnings::default();
        let exchange = read_exchange(&text, ctx, &mut warnings)?;
        let entities = exchange.table.len();
        let (triangles, faces) =
            triangulate_faces(&exchange, params, exchange.statements, ctx, &mut warnings)?;

        let mut model = Model::from_triangles(exchange.header, triangles, MeshFormat::Step, size);
        model.stats.parse_time = start.elapsed();
        ctx.finish("STEP loaded");
        info!(
            entities,
            faces,
            triangles = model.stats.triangle_count,
            elapsed_ms = model.stats.parse_time.as_millis(),
            "STEP load complete"
        );
        Ok(LoadOutcome {
            model,
            warnings: warnings.into_vec(),
        })
    }
}

/// Where the reader is in the exchange structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Start,
    Preamble,
    Header,
    Between,
    Data,
    Done,
}

/// Header name and DATA entities of one file.
struct Exchange {
    header: Option<String>,
    table: EntityTable,
    statements: usize,
}

fn read_exchange(
    text: &str,
    ctx: &mut ParseContext<'_>,
    warnings: &mut Warnings,
) -> LoadResult<Exchange> {
    let mut section = Section::Start;
    let mut seen_header = false;
    let mut seen_data = false;
    let mut header = None;
    let mut table = EntityTable::default();
    let mut complex = 0usize;
    let mut count = 0usize;
    let mut statements = Statements::new(text);

    while let Some(item) = statements.next() {
        let raw = item.map_err(|tail| {
            LoadError::parse_at(
                format!("truncated statement '{}'", preview(&tail.text)),
                Location::Line(tail.line),
            )
        })?;
        count += 1;
        let statement = lexer::parse_statement(&raw.text).map_err(|e| {
            let at = lexer::leading_id(&raw.text).map_or(Location::Line(raw.line), Location::Entity);
            LoadError::parse_at(e, at)
        })?;

        section = match (section, statement) {
            (Section::Start, Statement::Keyword(k)) if k == MAGIC => Section::Preamble,
            (Section::Start, _) => {
                return Err(LoadError::structural_at(
                    format!("file does not start with {MAGIC}"),
                    Location::Line(raw.line),
                ));
            }
            (Section::Preamble | Section::Between, Statement::Keyword(k)) if k == "HEADER" => {
                if seen_header {
                    return Err(LoadError::structural_at(
                        "second HEADER section",
                        Location::Line(raw.line),
                    ));
                }
                seen_header = true;
                Section::Header
            }
            (Section::Header, Statement::Record(name, params)) => {
                if name == "FILE_NAME" {
                    header = file_name(&params);
                }
                Section::Header
            }
            (Section::Header | Section::Data, Statement::Keyword(k)) if k == "ENDSEC" => {
                Section::Between
            }
            (Section::Between, Statement::Keyword(k)) if k == "DATA" => {
                seen_data = true;
                Section::Data
            }
            (Section::Preamble, Statement::Keyword(k)) if k == "DATA" => {
                return Err(LoadError::structural_at(
                    "DATA section before HEADER",
                    Location::Line(raw.line),
                ));
            }
            (Section::Between, Statement::Keyword(k)) if k == END_MARKER => Section::Done,
            (Section::Data, Statement::Instance(id, body)) => {
                let entity = match body {
                    InstanceBody::Simple(name, params) => Entity::decode(&name, &params)
                        .map_err(|e| LoadError::parse_at(e, Location::Entity(id)))?,
                    InstanceBody::Complex(parts) => {
                        complex += 1;
                        debug!(id, parts = parts.len(), "skipping complex entity instance");
                        Entity::Other("complex".to_string())
                    }
                };
                if !table.insert(id, entity) {
                    return Err(LoadError::parse_at(
                        format!("entity #{id} defined twice"),
                        Location::Entity(id),
                    ));
                }
                Section::Data
            }
            (current, other) => {
                return Err(LoadError::parse_at(
                    format!("unexpected {} in {current:?} section", describe(&other)),
                    Location::Line(raw.line),
                ));
            }
        };

        if section == Section::Done {
            break;
        }
        let consumed = statements.position();
        ctx.tick_with(count, "Reading STEP entities", || {
            scale(percent_of(consumed, text.len()), 0, READ_SHARE)
        })?;
    }

    if section == Section::Start {
        return Err(LoadError::structural(format!(
            "file does not start with {MAGIC}"
        )));
    }
    if !seen_data {
        return Err(LoadError::structural("no DATA section"));
    }
    if section != Section::Done {
        warnings.push(
            WarningKind::MissingEndMarker,
            format!("{END_MARKER} marker is missing"),
        );
    }
    debug!(
        entities = table.len(),
        faces = table.faces().len(),
        complex,
        "STEP entity table built"
    );
    Ok(Exchange {
        header,
        table,
        statements: count,
    })
}

/// Triangulate every face; returns the triangles and how many faces
/// contributed.
fn triangulate_faces(
    exchange: &Exchange,
    params: &LoadParams,
    ticks_before: usize,
    ctx: &mut ParseContext<'_>,
    warnings: &mut Warnings,
) -> LoadResult<(Vec<Triangle>, usize)> {
    let table = &exchange.table;
    let faces = table.faces();
    if faces.is_empty() {
        warnings.push(WarningKind::EmptyInput, "DATA section contains no faces");
        return Ok((Vec::new(), 0));
    }

    let reconstructor = Reconstructor::new(table, params.curve_segments);
    let mut triangles = Vec::new();
    let mut rebuilt = 0usize;

    for (i, &face) in faces.iter().enumerate() {
        ctx.tick_with(ticks_before + i, "Triangulating STEP faces", || {
            scale(percent_of(i, faces.len()), READ_SHARE, 100)
        })?;

        if let Some((referrer, missing)) = table.first_unresolved(face) {
            warnings.push(
                WarningKind::UnresolvedReference,
                format!("face #{face} skipped: #{referrer} references undefined #{missing}"),
            );
            continue;
        }
        let loops = match reconstructor.face(face) {
            Ok(loops) => loops,
            Err(reason) => {
                warnings.push(
                    WarningKind::SkippedFace,
                    format!("face #{face} skipped: {reason}"),
                );
                continue;
            }
        };
        let Some(result) = triangulate::triangulate(&loops.outer, &loops.holes) else {
            warnings.push(
                WarningKind::SkippedFace,
                format!("face #{face} skipped: degenerate boundary"),
            );
            continue;
        };
        if result.dropped_holes > 0 {
            warnings.push(
                WarningKind::IgnoredInnerBound,
                format!(
                    "face #{face}: {} inner bound(s) could not be bridged",
                    result.dropped_holes
                ),
            );
        }

        let points: Vec<Vector3<f32>> = loops.points().map(|p| p.cast::<f32>()).collect();
        let fallback = result.normal.cast::<f32>();
        let before = triangles.len();
        triangles.extend(result.triangles.iter().map(|&[a, b, c]| {
            let vertices = [points[a], points[b], points[c]];
            Triangle::new(face_normal(&vertices).unwrap_or(fallback), vertices, 0)
        }));
        trace!(face, triangles = triangles.len() - before, "face triangulated");
        rebuilt += 1;
    }

    if rebuilt == 0 {
        return Err(LoadError::parse(format!(
            "none of the {} faces could be reconstructed",
            faces.len()
        )));
    }
    Ok((triangles, rebuilt))
}

/// First parameter of `FILE_NAME`, if it is a non-empty string.
fn file_name(params: &[Param]) -> Option<String> {
    match params.first() {
        Some(Param::Str(name)) if !name.trim().is_empty() => Some(name.trim().to_string()),
        _ => None,
    }
}

fn describe(statement: &Statement) -> String {
    match statement {
        Statement::Keyword(k) => format!("keyword {k}"),
        Statement::Record(name, _) => format!("record {name}"),
        Statement::Instance(id, _) => format!("instance #{id}"),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(32).collect()
}

/// Map 0..=100 onto `from..=to`.
fn scale(percent: u8, from: u8, to: u8) -> u8 {
    let span = u16::from(to.saturating_sub(from));
    let scaled = u16::from(percent.min(100)) * span / 100;
    from.saturating_add(u8::try_from(scaled).unwrap_or(u8::MAX)).min(to)
}
