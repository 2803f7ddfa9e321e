//! 3MF (3D Manufacturing Format) support.
//!
//! 3MF is a ZIP-based format designed for 3D printing, containing XML files
//! that describe geometry and optionally materials, colors, and metadata.
//!
//! # Format Structure
//!
//! A 3MF file is a ZIP archive containing:
//! - `_rels/.rels` - Relationships, naming the start part
//! - `3D/3dmodel.model` - Main model XML file (the usual start part)
//! - `\[Content_Types\].xml` - MIME type mappings
//!
//! # Object graph
//!
//! Objects hold a mesh, components (references to other objects with a
//! transform), or both. Build items place objects into the world. The
//! graph is checked for dangling references and cycles before a single
//! triangle is emitted; emitted geometry is always in world space.
//!
//! # Transforms
//!
//! `transform="m00 m01 m02 m10 m11 m12 m20 m21 m22 m30 m31 m32"` maps a
//! point as `x' = m00 x + m10 y + m20 z + m30` (and likewise for y, z).
//! Nested transforms compose as `parent * child`.
//!
//! # Limitations
//!
//! - Materials, colors, and textures are not supported
//! - Beam lattice and slice extensions are not supported
//! - The `unit` attribute is not applied; coordinates are returned as stored

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, Write};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use hashbrown::{HashMap, HashSet};
use mesh_types::{face_normal, Matrix4, MeshFormat, Model, Point3, Triangle, Vector3};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{LoadError, LoadResult, Location, WarningKind};
use crate::file;
use crate::params::LoadParams;
use crate::progress::{percent_of, percent_of_u64, ParseContext};
use crate::registry::MeshParser;
use crate::result::{LoadOutcome, Warnings};

/// 3MF namespace URI.
const NAMESPACE_3MF: &str = "http://schemas.microsoft.com/3dmanufacturing/core/2015/02";

/// Conventional start part, used when `_rels/.rels` names none.
const DEFAULT_MODEL_ENTRY: &str = "3D/3dmodel.model";

/// Relationship type suffix of the start part.
const MODEL_RELATIONSHIP: &str = "/3dmodel";

/// Load a model from a 3MF file.
///
/// All build items are resolved through their component trees and returned
/// as one world-space triangle list.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The file is not a valid ZIP archive or lacks the model entry
/// - The object graph has a cycle or a dangling reference
/// - A vertex or triangle element is malformed
///
/// # Example
///
/// ```no_run
/// use mesh_loader::load_3mf;
///
/// let outcome = load_3mf("plate.3mf").unwrap();
/// println!("Loaded {} triangles", outcome.model.triangle_count());
/// ```
pub fn load_3mf<P: AsRef<Path>>(path: P) -> LoadResult<LoadOutcome> {
    ThreeMfParser.parse(
        path.as_ref(),
        &mut ParseContext::silent(),
        &LoadParams::default(),
    )
}

/// Parser for 3MF archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeMfParser;

impl MeshParser for ThreeMfParser {
    fn format(&self) -> MeshFormat {
        MeshFormat::ThreeMf
    }

    fn validate(&self, path: &Path) -> LoadResult<()> {
        crate::detect::validate(path, MeshFormat::ThreeMf)
    }

    fn read_metadata(&self, path: &Path) -> LoadResult<Model> {
        let mut archive = open_archive(path)?;
        let name = find_model_entry(&mut archive)?;
        let entry = archive
            .by_name(&name)
            .map_err(|e| LoadError::structural_at(e.to_string(), Location::Entry(name.clone())))?;
        let title = read_title(BufReader::new(entry), &name)?;
        Ok(Model::metadata(
            title,
            MeshFormat::ThreeMf,
            file::size_of(path)?,
            0,
        ))
    }

    fn parse(
        &self,
        path: &Path,
        ctx: &mut ParseContext<'_>,
        _params: &LoadParams,
    ) -> LoadResult<LoadOutcome> {
        let start = Instant::now();
        let size = file::size_of(path)?;
        info!(path = %path.display(), size, "Loading 3MF");

        let mut archive = open_archive(path)?;
        let name = find_model_entry(&mut archive)?;
        let entry = archive
            .by_name(&name)
            .map_err(|e| LoadError::structural_at(e.to_string(), Location::Entry(name.clone())))?;
        let entry_size = entry.size();
        let document = read_document(BufReader::new(entry), entry_size, &name, ctx)?;
        debug!(
            entry = %name,
            objects = document.objects.len(),
            items = document.build.len(),
            unit = document.unit.as_deref().unwrap_or("millimeter"),
            "3MF document read"
        );

        let mut warnings = Warnings::default();
        let triangles = document.resolve(&name, ctx, &mut warnings)?;
        if triangles.is_empty() {
            warnings.push(WarningKind::EmptyInput, "3MF build produced no triangles");
        }

        let mut model = Model::from_triangles(document.title, triangles, MeshFormat::ThreeMf, size);
        model.stats.parse_time = start.elapsed();
        ctx.finish("3MF loaded");
        info!(
            triangles = model.stats.triangle_count,
            elapsed_ms = model.stats.parse_time.as_millis(),
            "3MF load complete"
        );
        Ok(LoadOutcome {
            model,
            warnings: warnings.into_vec(),
        })
    }
}

fn open_archive(path: &Path) -> LoadResult<ZipArchive<BufReader<File>>> {
    let reader = BufReader::new(file::open(path)?);
    ZipArchive::new(reader).map_err(|e| LoadError::structural(format!("not a ZIP archive: {e}")))
}

/// Name of the archive entry holding the model document.
///
/// The start part named by `_rels/.rels` wins; otherwise
/// `3D/3dmodel.model`. Names are matched case-insensitively.
///
/// # Errors
///
/// Returns [`LoadError::Structural`] if no model entry exists.
pub(crate) fn find_model_entry<R: Read + Seek>(archive: &mut ZipArchive<R>) -> LoadResult<String> {
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let lookup = |wanted: &str| {
        names
            .iter()
            .find(|n| n.eq_ignore_ascii_case(wanted))
            .cloned()
    };

    if let Some(rels) = lookup("_rels/.rels") {
        let target = archive
            .by_name(&rels)
            .ok()
            .and_then(|entry| start_part(BufReader::new(entry)));
        if let Some(found) = target.as_deref().and_then(lookup) {
            return Ok(found);
        }
        debug!(?target, "start part not usable, trying default entry");
    }
    lookup(DEFAULT_MODEL_ENTRY).ok_or_else(|| {
        LoadError::structural(format!(
            "archive has no 3D model entry ({DEFAULT_MODEL_ENTRY})"
        ))
    })
}

/// Target of the 3D model relationship in a `.rels` document.
fn start_part<R: BufRead>(source: R) -> Option<String> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).ok()? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"Relationship" => {
                let [target, kind] = attrs(e, ["Target", "Type"], "_rels/.rels").ok()?;
                if kind.is_some_and(|k| k.ends_with(MODEL_RELATIONSHIP)) {
                    return target.map(|t| t.trim_start_matches('/').to_string());
                }
            }
            Event::Eof => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// An object resource: mesh data and/or components.
#[derive(Debug, Default)]
struct Object {
    vertices: Vec<Vector3<f64>>,
    triangles: Vec<[usize; 3]>,
    components: Vec<Placement>,
}

/// A reference to an object with the transform that places it.
#[derive(Debug, Clone, Copy)]
struct Placement {
    object: u32,
    transform: Matrix4<f64>,
}

/// The parsed model document, before resolution.
#[derive(Debug, Default)]
struct Document {
    title: Option<String>,
    unit: Option<String>,
    objects: BTreeMap<u32, Object>,
    build: Vec<Placement>,
    /// Vertex and triangle elements read; resolution ticks continue from here.
    elements: usize,
}

/// Streaming state while reading the model document.
#[derive(Default)]
struct DocumentReader {
    doc: Document,
    current: Option<(u32, Object)>,
    in_title: bool,
}

impl DocumentReader {
    fn open(&mut self, e: &BytesStart<'_>, empty: bool, entry: &str) -> LoadResult<()> {
        match e.local_name().as_ref() {
            b"model" => {
                let [unit] = attrs(e, ["unit"], entry)?;
                self.doc.unit = unit;
            }
            b"metadata" => {
                let [name] = attrs(e, ["name"], entry)?;
                self.in_title = !empty && name.is_some_and(|n| n.eq_ignore_ascii_case("Title"));
            }
            b"object" => {
                let [id] = attrs(e, ["id"], entry)?;
                let id = number(id, "id", "object", entry)?;
                if empty {
                    insert_object(&mut self.doc, id, Object::default(), entry)?;
                } else {
                    self.current = Some((id, Object::default()));
                }
            }
            b"vertex" => {
                if let Some((_, object)) = self.current.as_mut() {
                    let [x, y, z] = attrs(e, ["x", "y", "z"], entry)?;
                    object.vertices.push(Vector3::new(
                        number(x, "x", "vertex", entry)?,
                        number(y, "y", "vertex", entry)?,
                        number(z, "z", "vertex", entry)?,
                    ));
                    self.doc.elements += 1;
                }
            }
            b"triangle" => {
                if let Some((_, object)) = self.current.as_mut() {
                    let [v1, v2, v3] = attrs(e, ["v1", "v2", "v3"], entry)?;
                    object.triangles.push([
                        number(v1, "v1", "triangle", entry)?,
                        number(v2, "v2", "triangle", entry)?,
                        number(v3, "v3", "triangle", entry)?,
                    ]);
                    self.doc.elements += 1;
                }
            }
            b"component" => {
                if let Some((_, object)) = self.current.as_mut() {
                    object.components.push(placement(e, "component", entry)?);
                }
            }
            b"item" => self.doc.build.push(placement(e, "item", entry)?),
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, e: &BytesEnd<'_>, entry: &str) -> LoadResult<()> {
        match e.local_name().as_ref() {
            b"object" => {
                if let Some((id, object)) = self.current.take() {
                    insert_object(&mut self.doc, id, object, entry)?;
                }
            }
            b"metadata" => self.in_title = false,
            _ => {}
        }
        Ok(())
    }
}

/// Parse the model document.
fn read_document<R: BufRead>(
    source: R,
    entry_size: u64,
    entry: &str,
    ctx: &mut ParseContext<'_>,
) -> LoadResult<Document> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut state = DocumentReader::default();
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(e, entry))?
        {
            Event::Start(ref e) => state.open(e, false, entry)?,
            Event::Empty(ref e) => state.open(e, true, entry)?,
            Event::Text(ref text) if state.in_title => {
                state.doc.title = Some(unescape(text, entry)?);
            }
            Event::End(ref e) => state.close(e, entry)?,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();

        let position = u64::try_from(reader.buffer_position()).unwrap_or(u64::MAX);
        ctx.tick_with(state.doc.elements, "Reading 3MF model", || {
            percent_of_u64(position.saturating_mul(9), entry_size.saturating_mul(10))
        })?;
    }
    Ok(state.doc)
}

/// Scan the document only as far as its `Title` metadata.
fn read_title<R: BufRead>(source: R, entry: &str) -> LoadResult<Option<String>> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_title = false;
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(e, entry))?
        {
            Event::Start(ref e) if e.local_name().as_ref() == b"metadata" => {
                let [name] = attrs(e, ["name"], entry)?;
                in_title = name.is_some_and(|n| n.eq_ignore_ascii_case("Title"));
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"resources" => return Ok(None),
            Event::Text(ref text) if in_title => return unescape(text, entry).map(Some),
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn insert_object(doc: &mut Document, id: u32, object: Object, entry: &str) -> LoadResult<()> {
    if doc.objects.insert(id, object).is_some() {
        return Err(LoadError::structural_at(
            format!("object id {id} defined twice"),
            Location::Entry(entry.to_string()),
        ));
    }
    Ok(())
}

fn placement(e: &BytesStart<'_>, element: &str, entry: &str) -> LoadResult<Placement> {
    let [object, transform] = attrs(e, ["objectid", "transform"], entry)?;
    Ok(Placement {
        object: number(object, "objectid", element, entry)?,
        transform: match transform {
            Some(values) => parse_transform(&values)
                .map_err(|reason| LoadError::parse_at(reason, Location::Entry(entry.to_string())))?,
            None => Matrix4::identity(),
        },
    })
}

/// Convert the 12-value row-major 3MF transform into a column-vector matrix.
fn parse_transform(values: &str) -> Result<Matrix4<f64>, String> {
    let m = values
        .split_whitespace()
        .map(f64::from_str)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid transform '{values}': {e}"))?;
    if m.len() != 12 {
        return Err(format!(
            "transform must have exactly 12 values (got {})",
            m.len()
        ));
    }
    #[rustfmt::skip]
    let matrix = Matrix4::new(
        m[0], m[3], m[6], m[9],
        m[1], m[4], m[7], m[10],
        m[2], m[5], m[8], m[11],
        0.0,  0.0,  0.0,  1.0,
    );
    Ok(matrix)
}

impl Document {
    /// Check the graph, then emit every placed object in world space.
    fn resolve(
        &self,
        entry: &str,
        ctx: &mut ParseContext<'_>,
        warnings: &mut Warnings,
    ) -> LoadResult<Vec<Triangle>> {
        let at = || Location::Entry(entry.to_string());

        for (id, object) in &self.objects {
            let count = object.vertices.len();
            if let Some(bad) = object.triangles.iter().flatten().find(|&&v| v >= count) {
                return Err(LoadError::parse_at(
                    format!("object {id}: triangle vertex index {bad} out of range ({count} vertices)"),
                    at(),
                ));
            }
            for component in &object.components {
                if !self.objects.contains_key(&component.object) {
                    return Err(LoadError::structural_at(
                        format!("object {id}: component references undefined object {}", component.object),
                        at(),
                    ));
                }
            }
        }
        for item in &self.build {
            if !self.objects.contains_key(&item.object) {
                return Err(LoadError::structural_at(
                    format!("build item references undefined object {}", item.object),
                    at(),
                ));
            }
        }
        self.check_acyclic(entry)?;

        let roots = if self.build.is_empty() {
            let roots = self.root_objects();
            warnings.push(
                WarningKind::EmptyBuild,
                format!("build has no items; emitting {} root objects", roots.len()),
            );
            roots
        } else {
            self.build.clone()
        };

        let mut triangles = Vec::new();
        let mut stack: Vec<Placement> = roots.into_iter().rev().collect();
        let mut visited = 0usize;
        while let Some(Placement { object, transform }) = stack.pop() {
            let Some(node) = self.objects.get(&object) else {
                continue;
            };
            emit(node, &transform, &mut triangles);
            stack.extend(node.components.iter().rev().map(|c| Placement {
                object: c.object,
                transform: transform * c.transform,
            }));
            visited += 1;
            let pending = stack.len();
            ctx.tick_with(self.elements + visited, "Resolving 3MF build", || {
                percent_of(visited, visited + pending)
            })?;
        }
        Ok(triangles)
    }

    /// Objects not used as a component of another object, in id order.
    fn root_objects(&self) -> Vec<Placement> {
        let used: HashSet<u32> = self
            .objects
            .values()
            .flat_map(|o| o.components.iter().map(|c| c.object))
            .collect();
        self.objects
            .keys()
            .filter(|id| !used.contains(*id))
            .map(|&object| Placement {
                object,
                transform: Matrix4::identity(),
            })
            .collect()
    }

    /// Iterative depth-first search with a "resolving" mark on the path.
    fn check_acyclic(&self, entry: &str) -> LoadResult<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Resolving,
            Done,
        }
        let mut marks: HashMap<u32, Mark> = HashMap::with_capacity(self.objects.len());

        for &root in self.objects.keys() {
            if marks.contains_key(&root) {
                continue;
            }
            marks.insert(root, Mark::Resolving);
            let mut path: Vec<(u32, usize)> = vec![(root, 0)];
            while let Some(&(id, next)) = path.last() {
                let child = self
                    .objects
                    .get(&id)
                    .and_then(|o| o.components.get(next))
                    .map(|c| c.object);
                let Some(child) = child else {
                    marks.insert(id, Mark::Done);
                    path.pop();
                    continue;
                };
                if let Some(top) = path.last_mut() {
                    top.1 += 1;
                }
                match marks.get(&child).copied() {
                    Some(Mark::Resolving) => {
                        return Err(LoadError::structural_at(
                            format!("component cycle through object {child}"),
                            Location::Entry(entry.to_string()),
                        ));
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child, Mark::Resolving);
                        path.push((child, 0));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Append an object's own mesh, transformed into world space.
#[allow(clippy::cast_possible_truncation)]
fn emit(object: &Object, transform: &Matrix4<f64>, out: &mut Vec<Triangle>) {
    if object.triangles.is_empty() {
        return;
    }
    let world: Vec<Vector3<f32>> = object
        .vertices
        .iter()
        .map(|v| {
            let p = transform.transform_point(&Point3::from(*v));
            Vector3::new(p.x as f32, p.y as f32, p.z as f32)
        })
        .collect();
    out.extend(object.triangles.iter().map(|&[a, b, c]| {
        let vertices = [world[a], world[b], world[c]];
        Triangle::new(
            face_normal(&vertices).unwrap_or_else(Vector3::zeros),
            vertices,
            0,
        )
    }));
}

/// Values of the named attributes, in the order asked for.
fn attrs<const N: usize>(
    element: &BytesStart<'_>,
    keys: [&str; N],
    entry: &str,
) -> LoadResult<[Option<String>; N]> {
    let mut values: [Option<String>; N] = std::array::from_fn(|_| None);
    for attr in element.attributes() {
        let attr = attr.map_err(|e| xml_error(e, entry))?;
        let key = attr.key.local_name();
        if let Some(slot) = keys.iter().position(|k| k.as_bytes() == key.as_ref()) {
            let value = attr.unescape_value().map_err(|e| xml_error(e, entry))?;
            values[slot] = Some(value.into_owned());
        }
    }
    Ok(values)
}

fn number<T>(value: Option<String>, attr: &str, element: &str, entry: &str) -> LoadResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let at = || Location::Entry(entry.to_string());
    let value = value.ok_or_else(|| {
        LoadError::parse_at(format!("<{element}> is missing attribute '{attr}'"), at())
    })?;
    value.trim().parse().map_err(|e| {
        LoadError::parse_at(
            format!("<{element}> attribute {attr}='{value}': {e}"),
            at(),
        )
    })
}

fn unescape(text: &BytesText<'_>, entry: &str) -> LoadResult<String> {
    text.unescape()
        .map(|t| t.trim().to_string())
        .map_err(|e| xml_error(e, entry))
}

fn xml_error(err: impl std::fmt::Display, entry: &str) -> LoadError {
    LoadError::parse_at(
        format!("XML error: {err}"),
        Location::Entry(entry.to_string()),
    )
}

/// Save a model to a 3MF file as a single object with one build item.
///
/// Every triangle gets its own three vertices; no vertex sharing is
/// reconstructed. The model header is written as `Title` metadata.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
///
/// # Example
///
/// ```no_run
/// use mesh_loader::{load_stl, save_3mf};
///
/// let outcome = load_stl("part.stl").unwrap();
/// save_3mf(&outcome.model, "part.3mf").unwrap();
/// ```
pub fn save_3mf<P: AsRef<Path>>(model: &Model, path: P) -> LoadResult<()> {
    let path = path.as_ref();
    let write_error = |e: &dyn std::fmt::Display| {
        LoadError::file_access(path, std::io::Error::other(e.to_string()))
    };
    let file = File::create(path).map_err(|e| LoadError::file_access(path, e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)
        .map_err(|e| write_error(&e))?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())
        .map_err(|e| write_error(&e))?;

    zip.start_file("_rels/.rels", options)
        .map_err(|e| write_error(&e))?;
    zip.write_all(RELS_XML.as_bytes())
        .map_err(|e| write_error(&e))?;

    let model_xml = generate_model_xml(model).map_err(|e| write_error(&e))?;
    zip.start_file(DEFAULT_MODEL_ENTRY, options)
        .map_err(|e| write_error(&e))?;
    zip.write_all(&model_xml).map_err(|e| write_error(&e))?;

    zip.finish().map_err(|e| write_error(&e))?;
    info!(path = %path.display(), triangles = model.triangles.len(), "3MF saved");
    Ok(())
}

/// Content types XML for 3MF.
const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
</Types>"#;

/// Relationships XML for 3MF.
const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Target="/3D/3dmodel.model" Id="rel0" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>"#;

fn generate_model_xml(model: &Model) -> quick_xml::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = Writer::new_with_indent(Cursor::new(&mut buffer), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("model");
    root.push_attribute(("xmlns", NAMESPACE_3MF));
    root.push_attribute(("unit", "millimeter"));
    root.push_attribute(("xml:lang", "en-US"));
    writer.write_event(Event::Start(root))?;

    if let Some(title) = &model.header {
        let mut meta = BytesStart::new("metadata");
        meta.push_attribute(("name", "Title"));
        writer.write_event(Event::Start(meta))?;
        writer.write_event(Event::Text(BytesText::new(title)))?;
        writer.write_event(Event::End(BytesEnd::new("metadata")))?;
    }

    writer.write_event(Event::Start(BytesStart::new("resources")))?;
    let mut object = BytesStart::new("object");
    object.push_attribute(("id", "1"));
    object.push_attribute(("type", "model"));
    writer.write_event(Event::Start(object))?;
    writer.write_event(Event::Start(BytesStart::new("mesh")))?;

    writer.write_event(Event::Start(BytesStart::new("vertices")))?;
    for v in model.triangles.iter().flat_map(|t| t.vertices.iter()) {
        let mut vertex = BytesStart::new("vertex");
        vertex.push_attribute(("x", v.x.to_string().as_str()));
        vertex.push_attribute(("y", v.y.to_string().as_str()));
        vertex.push_attribute(("z", v.z.to_string().as_str()));
        writer.write_event(Event::Empty(vertex))?;
    }
    writer.write_event(Event::End(BytesEnd::new("vertices")))?;

    writer.write_event(Event::Start(BytesStart::new("triangles")))?;
    for i in 0..model.triangles.len() {
        let mut triangle = BytesStart::new("triangle");
        triangle.push_attribute(("v1", (3 * i).to_string().as_str()));
        triangle.push_attribute(("v2", (3 * i + 1).to_string().as_str()));
        triangle.push_attribute(("v3", (3 * i + 2).to_string().as_str()));
        writer.write_event(Event::Empty(triangle))?;
    }
    writer.write_event(Event::End(BytesEnd::new("triangles")))?;

    writer.write_event(Event::End(BytesEnd::new("mesh")))?;
    writer.write_event(Event::End(BytesEnd::new("object")))?;
    writer.write_event(Event::End(BytesEnd::new("resources")))?;

    writer.write_event(Event::Start(BytesStart::new("build")))?;
    let mut item = BytesStart::new("item");
    item.push_attribute(("objectid", "1"));
    writer.write_event(Event::Empty(item))?;
    writer.write_event(Event::End(BytesEnd::new("build")))?;

    writer.write_event(Event::End(BytesEnd::new("model")))?;
    Ok(buffer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    const TETRA_MESH: &str = r#"<mesh>
          <vertices>
            <vertex x="0" y="0" z="0"/>
            <vertex x="1" y="0" z="0"/>
            <vertex x="0" y="1" z="0"/>
            <vertex x="0" y="0" z="1"/>
          </vertices>
          <triangles>
            <triangle v1="0" v2="2" v3="1"/>
            <triangle v1="0" v2="1" v3="3"/>
            <triangle v1="0" v2="3" v3="2"/>
            <triangle v1="1" v2="2" v3="3"/>
          </triangles>
        </mesh>"#;

    fn document(resources: &str, build: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter" xmlns="{NAMESPACE_3MF}">
  <metadata name="Title">Test Part</metadata>
  <resources>{resources}</resources>
  <build>{build}</build>
</model>"#
        )
    }

    fn write_archive(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("test.3mf");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn load_doc(resources: &str, build: &str) -> LoadResult<LoadOutcome> {
        let dir = tempfile::tempdir().unwrap();
        let xml = document(resources, build);
        let path = write_archive(dir.path(), &[(DEFAULT_MODEL_ENTRY, &xml)]);
        load_3mf(path)
    }

    #[test]
    fn single_object_build() {
        let outcome = load_doc(
            &format!(r#"<object id="1" type="model">{TETRA_MESH}</object>"#),
            r#"<item objectid="1"/>"#,
        )
        .unwrap();
        let model = &outcome.model;
        assert_eq!(model.triangle_count(), 4);
        assert_eq!(model.header.as_deref(), Some("Test Part"));
        assert!(!outcome.has_warnings());
    }

    #[test]
    fn item_transform_translates() {
        let outcome = load_doc(
            &format!(r#"<object id="1">{TETRA_MESH}</object>"#),
            r#"<item objectid="1" transform="1 0 0 0 1 0 0 0 1 10 20 30"/>"#,
        )
        .unwrap();
        let bounds = outcome.model.bounds();
        assert_relative_eq!(bounds.min.x, 10.0);
        assert_relative_eq!(bounds.min.y, 20.0);
        assert_relative_eq!(bounds.max.z, 31.0);
    }

    #[test]
    fn transform_is_row_major() {
        // Scale x by 2 then translate by 5 in x.
        let m = parse_transform("2 0 0 0 1 0 0 0 1 5 0 0").unwrap();
        let p = m.transform_point(&Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(p.x, 7.0);
        assert_relative_eq!(p.y, 1.0);
        assert!(parse_transform("1 0 0").is_err());
    }

    #[test]
    fn components_compose_parent_times_child() {
        let resources = format!(
            r#"<object id="1">{TETRA_MESH}</object>
               <object id="2">
                 <components>
                   <component objectid="1" transform="2 0 0 0 2 0 0 0 2 0 0 0"/>
                 </components>
               </object>"#
        );
        let outcome = load_doc(
            &resources,
            r#"<item objectid="2" transform="1 0 0 0 1 0 0 0 1 100 0 0"/>"#,
        )
        .unwrap();
        let bounds = outcome.model.bounds();
        // scaled first, then translated
        assert_relative_eq!(bounds.min.x, 100.0);
        assert_relative_eq!(bounds.max.x, 102.0);
        assert_relative_eq!(bounds.max.y, 2.0);
        assert_eq!(outcome.model.triangle_count(), 4);
    }

    #[test]
    fn object_with_mesh_and_components_emits_both() {
        let resources = format!(
            r#"<object id="1">{TETRA_MESH}</object>
               <object id="2">{TETRA_MESH}
                 <components><component objectid="1" transform="1 0 0 0 1 0 0 0 1 5 0 0"/></components>
               </object>"#
        );
        let outcome = load_doc(&resources, r#"<item objectid="2"/>"#).unwrap();
        assert_eq!(outcome.model.triangle_count(), 8);
    }

    #[test]
    fn cycle_is_structural() {
        let resources = r#"
            <object id="1"><components><component objectid="2"/></components></object>
            <object id="2"><components><component objectid="1"/></components></object>"#;
        let err = load_doc(resources, r#"<item objectid="1"/>"#).unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let resources = r#"<object id="7"><components><component objectid="7"/></components></object>"#;
        let err = load_doc(resources, r#"<item objectid="7"/>"#).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn dangling_component_is_structural() {
        let resources = r#"<object id="1"><components><component objectid="9"/></components></object>"#;
        let err = load_doc(resources, r#"<item objectid="1"/>"#).unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("undefined object 9"));
    }

    #[test]
    fn dangling_build_item_is_structural() {
        let resources = format!(r#"<object id="1">{TETRA_MESH}</object>"#);
        let err = load_doc(&resources, r#"<item objectid="3"/>"#).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn shared_component_is_not_a_cycle() {
        let resources = format!(
            r#"<object id="1">{TETRA_MESH}</object>
               <object id="2"><components>
                 <component objectid="1"/>
                 <component objectid="1" transform="1 0 0 0 1 0 0 0 1 3 0 0"/>
               </components></object>"#
        );
        let outcome = load_doc(&resources, r#"<item objectid="2"/>"#).unwrap();
        assert_eq!(outcome.model.triangle_count(), 8);
    }

    #[test]
    fn triangle_index_out_of_range() {
        let resources = r#"<object id="1"><mesh>
            <vertices><vertex x="0" y="0" z="0"/></vertices>
            <triangles><triangle v1="0" v2="1" v3="2"/></triangles>
          </mesh></object>"#;
        let err = load_doc(resources, r#"<item objectid="1"/>"#).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn empty_build_emits_roots_with_warning() {
        let resources = format!(
            r#"<object id="1">{TETRA_MESH}</object>
               <object id="2"><components><component objectid="1"/></components></object>"#
        );
        let outcome = load_doc(&resources, "").unwrap();
        // object 1 is only a component, so only object 2 is a root
        assert_eq!(outcome.model.triangle_count(), 4);
        assert!(outcome.has_warning(WarningKind::EmptyBuild));
    }

    #[test]
    fn missing_model_entry_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), &[("readme.txt", "nothing")]);
        let err = load_3mf(path).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn start_part_from_relationships() {
        let dir = tempfile::tempdir().unwrap();
        let xml = document(
            &format!(r#"<object id="1">{TETRA_MESH}</object>"#),
            r#"<item objectid="1"/>"#,
        );
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Target="/3D/part.model" Id="rel0" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>"#;
        let path = write_archive(dir.path(), &[("_rels/.rels", rels), ("3d/PART.model", &xml)]);
        let outcome = load_3mf(&path).unwrap();
        assert_eq!(outcome.model.triangle_count(), 4);

        let file = File::open(&path).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        assert_eq!(find_model_entry(&mut archive).unwrap(), "3d/PART.model");
    }

    #[test]
    fn not_a_zip_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.3mf");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(load_3mf(path).unwrap_err().is_structural());
    }

    #[test]
    fn metadata_reads_title_only() {
        let dir = tempfile::tempdir().unwrap();
        let xml = document(
            &format!(r#"<object id="1">{TETRA_MESH}</object>"#),
            r#"<item objectid="1"/>"#,
        );
        let path = write_archive(dir.path(), &[(DEFAULT_MODEL_ENTRY, &xml)]);
        let model = ThreeMfParser.read_metadata(&path).unwrap();
        assert_eq!(model.header.as_deref(), Some("Test Part"));
        assert!(model.triangles.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let xml = document(
            &format!(r#"<object id="1">{TETRA_MESH}</object>"#),
            r#"<item objectid="1" transform="1 0 0 0 1 0 0 0 1 0 0 4"/>"#,
        );
        let source = write_archive(dir.path(), &[(DEFAULT_MODEL_ENTRY, &xml)]);
        let original = load_3mf(source).unwrap().model;

        let saved = dir.path().join("saved.3mf");
        save_3mf(&original, &saved).unwrap();
        let reloaded = load_3mf(&saved).unwrap().model;
        assert_eq!(reloaded.triangle_count(), original.triangle_count());
        assert_eq!(reloaded.header, original.header);
        assert_relative_eq!(reloaded.bounds().min.z, 4.0);
    }
}
