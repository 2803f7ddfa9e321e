//! MTL companion material files.

use std::collections::BTreeMap;

use mesh_types::{Material, Rgb};
use tracing::{debug, trace};

use crate::error::WarningKind;
use crate::result::Warnings;

/// Directives whose argument is a texture path.
const TEXTURE_DIRECTIVES: &[&str] = &["bump", "disp", "decal", "refl"];

/// Parse MTL text into materials keyed by name.
///
/// Malformed property lines are skipped with an
/// [`WarningKind::InvalidMaterialProperty`] warning; unknown directives are
/// ignored.
pub(crate) fn parse_mtl(
    text: &str,
    source: &str,
    warnings: &mut Warnings,
) -> BTreeMap<String, Material> {
    let mut materials = BTreeMap::new();
    let mut current: Option<Pending> = None;

    for (index, raw) in logical_lines(text) {
        let line_no = index + 1;
        let line = strip_comment(&raw).trim();
        let Some((keyword, rest)) = split_keyword(line) else {
            continue;
        };

        if keyword == "newmtl" {
            if let Some(done) = current.take() {
                materials.insert(done.material.name.clone(), done.finish());
            }
            if rest.is_empty() {
                warnings.push(
                    WarningKind::InvalidMaterialProperty,
                    format!("{source}:{line_no}: newmtl without a name"),
                );
                continue;
            }
            current = Some(Pending::new(rest));
            continue;
        }

        let Some(pending) = current.as_mut() else {
            trace!(keyword, line = line_no, "material property before newmtl");
            continue;
        };
        if let Err(reason) = pending.apply(keyword, rest) {
            warnings.push(
                WarningKind::InvalidMaterialProperty,
                format!("{source}:{line_no}: {keyword}: {reason}"),
            );
        }
    }
    if let Some(done) = current.take() {
        materials.insert(done.material.name.clone(), done.finish());
    }
    debug!(source, materials = materials.len(), "parsed material library");
    materials
}

/// A material being filled in, with the bookkeeping `Tr` needs.
struct Pending {
    material: Material,
    has_dissolve: bool,
    transparency: Option<f32>,
}

impl Pending {
    fn new(name: &str) -> Self {
        Self {
            material: Material::new(name),
            has_dissolve: false,
            transparency: None,
        }
    }

    fn apply(&mut self, keyword: &str, rest: &str) -> Result<(), String> {
        let m = &mut self.material;
        match keyword {
            "Ka" => m.ambient = color(rest)?,
            "Kd" => m.diffuse = color(rest)?,
            "Ks" => m.specular = color(rest)?,
            "Ns" => m.shininess = scalar(rest)?,
            "Ni" => m.optical_density = scalar(rest)?,
            "d" => {
                m.dissolve = scalar(rest)?.clamp(0.0, 1.0);
                self.has_dissolve = true;
            }
            "Tr" => self.transparency = Some(scalar(rest)?.clamp(0.0, 1.0)),
            "illum" => {
                m.illumination = rest
                    .split_whitespace()
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| format!("expected an integer, found '{rest}'"))?;
            }
            k if k.starts_with("map_") || TEXTURE_DIRECTIVES.contains(&k) => {
                // Options like `-bm 0.5` precede the file name.
                let path = rest
                    .split_whitespace()
                    .last()
                    .ok_or_else(|| "missing texture path".to_string())?;
                m.texture_maps.insert(k.to_string(), path.to_string());
            }
            _ => trace!(keyword, "ignored material directive"),
        }
        Ok(())
    }

    fn finish(mut self) -> Material {
        if let (false, Some(tr)) = (self.has_dissolve, self.transparency) {
            self.material.dissolve = 1.0 - tr;
        }
        self.material
    }
}

fn color(rest: &str) -> Result<Rgb, String> {
    let values = rest
        .split_whitespace()
        .map(str::parse::<f32>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("{e} in '{rest}'"))?;
    match values.as_slice() {
        [r] => Ok([*r; 3]),
        [r, g, b, ..] => Ok([*r, *g, *b]),
        _ => Err(format!("expected 1 or 3 components, found '{rest}'")),
    }
}

fn scalar(rest: &str) -> Result<f32, String> {
    rest.split_whitespace()
        .next()
        .ok_or_else(|| "missing value".to_string())?
        .parse()
        .map_err(|e| format!("{e} in '{rest}'"))
}

/// Lines with trailing-backslash continuations joined, paired with the
/// zero-based index of their first physical line.
pub(crate) fn logical_lines(text: &str) -> impl Iterator<Item = (usize, String)> + '_ {
    let mut physical = text.lines().enumerate();
    std::iter::from_fn(move || {
        let (start, first) = physical.next()?;
        let mut line = first.to_string();
        while line.trim_end().ends_with('\\') {
            let cut = line.trim_end().len() - 1;
            line.truncate(cut);
            match physical.next() {
                Some((_, next)) => {
                    line.push(' ');
                    line.push_str(next);
                }
                None => break,
            }
        }
        Some((start, line))
    })
}

/// Drop a `#` comment and everything after it.
pub(crate) fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(before, _)| before)
}

/// Split a trimmed line into its keyword and the trimmed remainder.
pub(crate) fn split_keyword(line: &str) -> Option<(&str, &str)> {
    if line.is_empty() {
        return None;
    }
    Some(match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    })
}
