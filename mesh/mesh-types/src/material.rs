//! Surface materials from OBJ companion (MTL) files.

use std::collections::BTreeMap;
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An RGB color with components nominally in `0.0..=1.0`.
pub type Rgb = [f32; 3];

/// A named surface material.
///
/// Defaults follow the usual MTL conventions: white diffuse, fully
/// opaque, illumination model 2.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    /// Name given by `newmtl`.
    pub name: String,
    /// Ambient color (`Ka`).
    pub ambient: Rgb,
    /// Diffuse color (`Kd`).
    pub diffuse: Rgb,
    /// Specular color (`Ks`).
    pub specular: Rgb,
    /// Specular exponent (`Ns`).
    pub shininess: f32,
    /// Optical density / index of refraction (`Ni`).
    pub optical_density: f32,
    /// Dissolve (`d`, or `1 - Tr`); 1.0 is fully opaque.
    pub dissolve: f32,
    /// Illumination model id (`illum`).
    pub illumination: u8,
    /// Texture maps keyed by directive name (`map_Kd`, `bump`, ...).
    pub texture_maps: BTreeMap<String, String>,
}

impl Material {
    /// Create a material with default properties.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: [0.0; 3],
            diffuse: [1.0; 3],
            specular: [0.0; 3],
            shininess: 0.0,
            optical_density: 1.0,
            dissolve: 1.0,
            illumination: 2,
            texture_maps: BTreeMap::new(),
        }
    }

    /// Transparency, the complement of dissolve.
    #[must_use]
    pub fn transparency(&self) -> f32 {
        1.0 - self.dissolve
    }

    /// Diffuse texture path, if any.
    #[must_use]
    pub fn diffuse_map(&self) -> Option<&str> {
        self.texture_maps.get("map_Kd").map(String::as_str)
    }
}

/// A contiguous run of triangles drawn with one material.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaterialGroup {
    /// Material name, as referenced by `usemtl`.
    pub material: String,
    /// Triangle index range in [`crate::Model::triangles`].
    pub triangles: Range<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_material_is_opaque_white() {
        let m = Material::new("plain");
        assert_eq!(m.name, "plain");
        assert_eq!(m.diffuse, [1.0; 3]);
        assert!(m.transparency().abs() < f32::EPSILON);
        assert!(m.diffuse_map().is_none());
    }

    #[test]
    fn diffuse_map_lookup() {
        let mut m = Material::new("wood");
        m.texture_maps
            .insert("map_Kd".to_string(), "wood.png".to_string());
        assert_eq!(m.diffuse_map(), Some("wood.png"));
    }
}
