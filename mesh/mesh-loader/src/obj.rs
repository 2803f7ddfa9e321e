//! Wavefront OBJ file format support.
//!
//! Geometry is read line by line: `v`, `vn` and `vt` accumulate, and each
//! `f` line is fan-triangulated from its first vertex. Materials come from
//! the `mtllib` companion files and are attached to triangle ranges by the
//! most recent `usemtl`.
//!
//! # Face indices
//!
//! Each face vertex is `v`, `v/t`, `v//n` or `v/t/n`. Positive indices are
//! 1-based; negative ones count back from the elements defined *so far*,
//! so `-1` is the most recent vertex at the point of the face line.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use hashbrown::HashSet;
use mesh_types::{face_normal, MaterialGroup, MeshFormat, Model, Triangle, Vector3};
use tracing::{debug, info, trace};

use crate::error::{LoadError, LoadResult, Location, WarningKind};
use crate::file;
use crate::mtl::{self, split_keyword, strip_comment};
use crate::params::LoadParams;
use crate::progress::{percent_of_u64, ParseContext};
use crate::registry::MeshParser;
use crate::result::{LoadOutcome, Warnings};

/// Load a model from an OBJ file, with materials from its `mtllib` files.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a number is malformed or a
/// face index is out of range. A missing material library is only a
/// warning.
///
/// # Example
///
/// ```no_run
/// use mesh_loader::load_obj;
///
/// let outcome = load_obj("chair.obj").unwrap();
/// for warning in &outcome.warnings {
///     eprintln!("{warning}");
/// }
/// ```
pub fn load_obj<P: AsRef<Path>>(path: P) -> LoadResult<LoadOutcome> {
    ObjParser.parse(
        path.as_ref(),
        &mut ParseContext::silent(),
        &LoadParams::default(),
    )
}

/// Parser for Wavefront OBJ.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjParser;

impl MeshParser for ObjParser {
    fn format(&self) -> MeshFormat {
        MeshFormat::Obj
    }

    fn validate(&self, path: &Path) -> LoadResult<()> {
        crate::detect::validate(path, MeshFormat::Obj)
    }

    fn read_metadata(&self, path: &Path) -> LoadResult<Model> {
        self.validate(path)?;
        let window = file::read_window(path)?;
        let text = String::from_utf8_lossy(&window);
        let name = text.lines().find_map(|line| {
            let (keyword, rest) = split_keyword(strip_comment(line).trim())?;
            (keyword == "o" && !rest.is_empty()).then(|| rest.to_string())
        });
        Ok(Model::metadata(
            name,
            MeshFormat::Obj,
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
        info!(path = %path.display(), size, "Loading OBJ");

        let reader = BufReader::new(file::open(path)?);
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let mut builder = ObjBuilder::new(base);
        builder.read(reader, size, ctx)?;

        let (mut model, warnings) = builder.finish(size);
        model.stats.parse_time = start.elapsed();
        ctx.finish("OBJ loaded");
        info!(
            triangles = model.stats.triangle_count,
            materials = model.materials.len(),
            elapsed_ms = model.stats.parse_time.as_millis(),
            "OBJ load complete"
        );
        Ok(LoadOutcome { model, warnings })
    }
}

/// One resolved face corner.
#[derive(Debug, Clone, Copy)]
struct Corner {
    position: usize,
    normal: Option<usize>,
}

/// Accumulates geometry and materials while reading one OBJ file.
struct ObjBuilder<'a> {
    base: &'a Path,
    positions: Vec<Vector3<f32>>,
    normals: Vec<Vector3<f32>>,
    texcoords: usize,
    triangles: Vec<Triangle>,
    header: Option<String>,
    materials: BTreeMap<String, mesh_types::Material>,
    libraries: HashSet<String>,
    groups: Vec<MaterialGroup>,
    current_material: Option<String>,
    warnings: Warnings,
}

impl<'a> ObjBuilder<'a> {
    fn new(base: &'a Path) -> Self {
        Self {
            base,
            positions: Vec::new(),
            normals: Vec::new(),
            texcoords: 0,
            triangles: Vec::new(),
            header: None,
            materials: BTreeMap::new(),
            libraries: HashSet::new(),
            groups: Vec::new(),
            current_material: None,
            warnings: Warnings::default(),
        }
    }

    fn read<R: BufRead>(
        &mut self,
        mut reader: R,
        size: u64,
        ctx: &mut ParseContext<'_>,
    ) -> LoadResult<()> {
        let mut raw = String::new();
        let mut line = String::new();
        let mut line_no = 0usize;
        let mut first_line = 0usize;
        let mut continued = false;
        let mut consumed = 0u64;

        loop {
            raw.clear();
            let read = reader.read_line(&mut raw).map_err(|e| {
                LoadError::parse_at(format!("read failed: {e}"), Location::Line(line_no + 1))
            })?;
            if read == 0 {
                break;
            }
            line_no += 1;
            consumed += read as u64;
            if !continued {
                first_line = line_no;
            }

            let trimmed = raw.trim_end();
            if let Some(head) = trimmed.strip_suffix('\\') {
                line.push_str(head);
                line.push(' ');
                continued = true;
                continue;
            }
            line.push_str(trimmed);
            continued = false;
            self.line(&line, first_line)?;
            line.clear();
            ctx.tick_with(line_no, "Reading OBJ", || percent_of_u64(consumed, size))?;
        }
        if continued {
            self.line(&line, first_line)?;
        }
        Ok(())
    }

    fn line(&mut self, line: &str, line_no: usize) -> LoadResult<()> {
        let Some((keyword, rest)) = split_keyword(strip_comment(line).trim()) else {
            return Ok(());
        };
        let at = Location::Line(line_no);
        match keyword {
            "v" => {
                let v = parse_vector(rest, &at)?;
                self.positions.push(v);
            }
            "vn" => {
                let n = parse_vector(rest, &at)?;
                self.normals.push(n);
            }
            "vt" => self.texcoords += 1,
            "f" => self.face(rest, &at)?,
            "o" => {
                if self.header.is_none() && !rest.is_empty() {
                    self.header = Some(rest.to_string());
                }
            }
            "mtllib" => self.material_libraries(rest),
            "usemtl" => {
                self.current_material = (!rest.is_empty()).then(|| rest.to_string());
            }
            _ => trace!(keyword, line = line_no, "ignored OBJ directive"),
        }
        Ok(())
    }

    fn face(&mut self, rest: &str, at: &Location) -> LoadResult<()> {
        let corners = rest
            .split_whitespace()
            .map(|token| self.corner(token, at))
            .collect::<LoadResult<Vec<_>>>()?;
        if corners.len() < 3 {
            return Err(LoadError::parse_at(
                format!("face has {} vertices, at least 3 required", corners.len()),
                at.clone(),
            ));
        }

        let first = self.triangles.len();
        for pair in corners[1..].windows(2) {
            let triangle = self.triangle(&[corners[0], pair[0], pair[1]]);
            self.triangles.push(triangle);
        }
        if let Some(material) = &self.current_material {
            tag_range(&mut self.groups, material, first..self.triangles.len());
        }
        Ok(())
    }

    fn corner(&self, token: &str, at: &Location) -> LoadResult<Corner> {
        let mut parts = token.split('/');
        let position = parts.next().unwrap_or_default();
        let position = resolve(position, self.positions.len(), "vertex", at)?;
        if let Some(t) = parts.next().filter(|t| !t.is_empty()) {
            resolve(t, self.texcoords, "texture coordinate", at)?;
        }
        let normal = match parts.next().filter(|n| !n.is_empty()) {
            Some(n) => Some(resolve(n, self.normals.len(), "normal", at)?),
            None => None,
        };
        Ok(Corner { position, normal })
    }

    fn triangle(&self, corners: &[Corner; 3]) -> Triangle {
        let vertices = corners.map(|c| self.positions[c.position]);
        let normal = face_normal(&vertices)
            .or_else(|| self.average_normal(corners))
            .unwrap_or_else(Vector3::zeros);
        Triangle::new(normal, vertices, 0)
    }

    fn average_normal(&self, corners: &[Corner; 3]) -> Option<Vector3<f32>> {
        let mut sum = Vector3::zeros();
        for corner in corners {
            sum += self.normals[corner.normal?];
        }
        sum.try_normalize(f32::EPSILON)
    }

    fn material_libraries(&mut self, rest: &str) {
        for name in rest.split_whitespace() {
            if !self.libraries.insert(name.to_string()) {
                continue;
            }
            let path = self.base.join(name);
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    let loaded = mtl::parse_mtl(&text, name, &mut self.warnings);
                    self.materials.extend(loaded);
                }
                Err(e) => self.warnings.push(
                    WarningKind::MissingMaterialLibrary,
                    format!("material library {} not loaded: {e}", path.display()),
                ),
            }
        }
    }

    fn finish(mut self, file_size: u64) -> (Model, Vec<crate::error::LoadWarning>) {
        let mut reported = HashSet::new();
        for group in &self.groups {
            if !self.materials.contains_key(&group.material)
                && reported.insert(group.material.clone())
            {
                self.warnings.push(
                    WarningKind::UnknownMaterial,
                    format!("usemtl '{}' is not defined by any material library", group.material),
                );
            }
        }
        if self.triangles.is_empty() {
            self.warnings.push(
                WarningKind::EmptyInput,
                format!("OBJ file has {} vertices and no faces", self.positions.len()),
            );
        }
        debug!(
            vertices = self.positions.len(),
            normals = self.normals.len(),
            texcoords = self.texcoords,
            groups = self.groups.len(),
            "OBJ geometry read"
        );

        let mut model = Model::from_triangles(
            self.header,
            self.triangles,
            MeshFormat::Obj,
            file_size,
        );
        model.materials = self.materials;
        model.material_groups = self.groups;
        (model, self.warnings.into_vec())
    }
}

/// Extend the last group if it continues `material`, else open a new one.
fn tag_range(groups: &mut Vec<MaterialGroup>, material: &str, range: std::ops::Range<usize>) {
    if range.is_empty() {
        return;
    }
    match groups.last_mut() {
        Some(last) if last.material == material && last.triangles.end == range.start => {
            last.triangles.end = range.end;
        }
        _ => groups.push(MaterialGroup {
            material: material.to_string(),
            triangles: range,
        }),
    }
}

/// Resolve a 1-based or negative relative index against `count` elements.
fn resolve(token: &str, count: usize, what: &str, at: &Location) -> LoadResult<usize> {
    let index: i64 = token.parse().map_err(|_| {
        LoadError::parse_at(format!("invalid {what} index '{token}'"), at.clone())
    })?;
    let resolved = match index {
        0 => None,
        i if i > 0 => usize::try_from(i - 1).ok(),
        i => usize::try_from(i.unsigned_abs())
            .ok()
            .and_then(|back| count.checked_sub(back)),
    };
    resolved.filter(|&i| i < count).ok_or_else(|| {
        LoadError::parse_at(
            format!("{what} index {index} out of range ({count} defined)"),
            at.clone(),
        )
    })
}

fn parse_vector(rest: &str, at: &Location) -> LoadResult<Vector3<f32>> {
    let mut values = rest.split_whitespace().map(|t| {
        t.parse::<f32>()
            .map_err(|_| LoadError::parse_at(format!("invalid number '{t}'"), at.clone()))
    });
    let mut next = || {
        values
            .next()
            .unwrap_or_else(|| Err(LoadError::parse_at("expected 3 coordinates", at.clone())))
    };
    Ok(Vector3::new(next()?, next()?, next()?))
}
