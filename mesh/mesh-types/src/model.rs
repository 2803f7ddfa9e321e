//! The model record returned by every loader.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use nalgebra::Vector3;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Aabb, Material, MaterialGroup, MeshFormat, Triangle};

/// How much of a file a [`Model`] reflects.
///
/// States only ever advance: `MetadataOnly → LowResGeometry → FullGeometry`.
/// The progression is driven by the caller; loaders produce one state per
/// invocation and never change it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LoadingState {
    /// Format, size and header fields only; no triangles.
    #[default]
    MetadataOnly,
    /// A reduced subset of the triangles.
    LowResGeometry,
    /// Every triangle in the file.
    FullGeometry,
}

impl LoadingState {
    /// The following state, or `None` once geometry is complete.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::MetadataOnly => Some(Self::LowResGeometry),
            Self::LowResGeometry => Some(Self::FullGeometry),
            Self::FullGeometry => None,
        }
    }
}

impl fmt::Display for LoadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MetadataOnly => "metadata",
            Self::LowResGeometry => "low-res",
            Self::FullGeometry => "full",
        };
        f.write_str(name)
    }
}

/// Attempted to move a model to an earlier (or the same) loading state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move model from {from} to {to}: loading states only advance")]
pub struct StateRegression {
    /// State the model is in.
    pub from: LoadingState,
    /// State that was offered.
    pub to: LoadingState,
}

/// Summary statistics of a loaded model.
///
/// `vertex_count` is always `3 * triangle_count` since triangles do not
/// share vertices. For a [`LoadingState::MetadataOnly`] model the counts
/// come from header fields (zero when the format has none).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelStats {
    /// Number of vertices (three per triangle).
    pub vertex_count: usize,
    /// Number of triangles.
    pub triangle_count: usize,
    /// Minimum bounding corner; the origin for empty models.
    pub min_bounds: Vector3<f32>,
    /// Maximum bounding corner; the origin for empty models.
    pub max_bounds: Vector3<f32>,
    /// Size of the source file in bytes.
    pub file_size: u64,
    /// Detected format of the source file.
    pub format: MeshFormat,
    /// Wall-clock time spent parsing.
    pub parse_time: Duration,
}

impl ModelStats {
    /// Statistics for an empty model of the given format.
    #[must_use]
    pub fn empty(format: MeshFormat) -> Self {
        Self {
            vertex_count: 0,
            triangle_count: 0,
            min_bounds: Vector3::zeros(),
            max_bounds: Vector3::zeros(),
            file_size: 0,
            format,
            parse_time: Duration::ZERO,
        }
    }

    /// Bounding box spanned by the reported corners.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.min_bounds, self.max_bounds)
    }
}

/// A triangle-soup model.
///
/// Triangles are kept in file order. Materials are only populated by the
/// OBJ loader and are tied to triangles through [`MaterialGroup`] ranges.
///
/// # Example
///
/// ```
/// use mesh_types::{Model, MeshFormat, Triangle, Vector3};
///
/// let tri = Triangle::from_vertices([
///     Vector3::new(0.0, 0.0, 0.0),
///     Vector3::new(2.0, 0.0, 0.0),
///     Vector3::new(0.0, 3.0, 1.0),
/// ]);
/// let model = Model::from_triangles(None, vec![tri], MeshFormat::StlBinary, 134);
///
/// assert_eq!(model.stats.triangle_count, 1);
/// assert_eq!(model.stats.vertex_count, 3);
/// assert_eq!(model.stats.max_bounds, Vector3::new(2.0, 3.0, 1.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Model {
    /// Header text or model name, when the format has one.
    pub header: Option<String>,
    /// Triangles in file order.
    pub triangles: Vec<Triangle>,
    /// Counts, bounds and provenance.
    pub stats: ModelStats,
    /// How complete the geometry is.
    pub loading_state: LoadingState,
    /// Materials by name.
    pub materials: BTreeMap<String, Material>,
    /// Triangle ranges drawn with a named material.
    pub material_groups: Vec<MaterialGroup>,
}

impl Model {
    /// Create an empty model of the given format.
    #[must_use]
    pub fn new(format: MeshFormat) -> Self {
        Self {
            header: None,
            triangles: Vec::new(),
            stats: ModelStats::empty(format),
            loading_state: LoadingState::FullGeometry,
            materials: BTreeMap::new(),
            material_groups: Vec::new(),
        }
    }

    /// Build a complete model from triangles and compute its statistics.
    #[must_use]
    pub fn from_triangles(
        header: Option<String>,
        triangles: Vec<Triangle>,
        format: MeshFormat,
        file_size: u64,
    ) -> Self {
        let mut model = Self::new(format);
        model.header = header;
        model.triangles = triangles;
        model.stats.file_size = file_size;
        model.recompute_stats();
        model
    }

    /// Build a metadata-only model: no triangles, counts from the header.
    #[must_use]
    pub fn metadata(
        header: Option<String>,
        format: MeshFormat,
        file_size: u64,
        declared_triangles: usize,
    ) -> Self {
        let mut model = Self::new(format);
        model.header = header;
        model.loading_state = LoadingState::MetadataOnly;
        model.stats.file_size = file_size;
        model.stats.triangle_count = declared_triangles;
        model.stats.vertex_count = declared_triangles * 3;
        model
    }

    /// Recompute counts and bounds from the triangle list.
    pub fn recompute_stats(&mut self) {
        let bounds = self.bounds();
        let (min, max) = bounds.corners_or_origin();
        self.stats.triangle_count = self.triangles.len();
        self.stats.vertex_count = self.triangles.len() * 3;
        self.stats.min_bounds = min;
        self.stats.max_bounds = max;
    }

    /// Bounding box of all triangle vertices.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.triangles.iter().flat_map(|t| t.vertices.iter()))
    }

    /// Number of triangles held.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Number of vertices held (three per triangle).
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.triangles.len() * 3
    }

    /// Whether the model holds no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Material in effect for a triangle, if any.
    #[must_use]
    pub fn material_for(&self, triangle: usize) -> Option<&Material> {
        let group = self
            .material_groups
            .iter()
            .find(|g| g.triangles.contains(&triangle))?;
        self.materials.get(&group.material)
    }

    /// Replace this model with a more complete one.
    ///
    /// # Errors
    ///
    /// Returns [`StateRegression`] if `next` is not strictly further along
    /// than `self`; the model is left untouched in that case.
    pub fn promote(&mut self, next: Self) -> Result<(), StateRegression> {
        if next.loading_state <= self.loading_state {
            return Err(StateRegression {
                from: self.loading_state,
                to: next.loading_state,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} model ({}): {} triangles, {} vertices",
            self.stats.format,
            self.loading_state,
            self.stats.triangle_count,
            self.stats.vertex_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle(offset: f32) -> Triangle {
        Triangle::from_vertices([
            Vector3::new(offset, 0.0, 0.0),
            Vector3::new(offset + 1.0, 0.0, 0.0),
            Vector3::new(offset, 1.0, -1.0),
        ])
    }

    #[test]
    fn stats_follow_triangles() {
        let model = Model::from_triangles(
            Some("part".to_string()),
            vec![unit_triangle(0.0), unit_triangle(5.0)],
            MeshFormat::Obj,
            42,
        );
        assert_eq!(model.stats.triangle_count, 2);
        assert_eq!(model.stats.vertex_count, 6);
        assert_eq!(model.stats.min_bounds, Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(model.stats.max_bounds, Vector3::new(6.0, 1.0, 0.0));
        assert_eq!(model.stats.file_size, 42);
        assert_eq!(model.loading_state, LoadingState::FullGeometry);
    }

    #[test]
    fn empty_model_has_origin_bounds() {
        let model = Model::from_triangles(None, Vec::new(), MeshFormat::Obj, 0);
        assert!(model.is_empty());
        assert_eq!(model.stats.min_bounds, Vector3::zeros());
        assert_eq!(model.stats.max_bounds, Vector3::zeros());
    }

    #[test]
    fn metadata_model_keeps_declared_count() {
        let model = Model::metadata(None, MeshFormat::StlBinary, 684, 12);
        assert_eq!(model.loading_state, LoadingState::MetadataOnly);
        assert_eq!(model.stats.triangle_count, 12);
        assert_eq!(model.stats.vertex_count, 36);
        assert!(model.triangles.is_empty());
    }

    #[test]
    fn states_advance_in_order() {
        assert_eq!(
            LoadingState::MetadataOnly.next(),
            Some(LoadingState::LowResGeometry)
        );
        assert_eq!(
            LoadingState::LowResGeometry.next(),
            Some(LoadingState::FullGeometry)
        );
        assert_eq!(LoadingState::FullGeometry.next(), None);
        assert!(LoadingState::MetadataOnly < LoadingState::FullGeometry);
    }

    #[test]
    fn promote_rejects_regression() {
        let mut model = Model::from_triangles(None, vec![unit_triangle(0.0)], MeshFormat::Obj, 0);
        let earlier = Model::metadata(None, MeshFormat::Obj, 0, 0);
        let err = model.promote(earlier);
        assert!(err.is_err());
        assert_eq!(model.triangle_count(), 1);
    }

    #[test]
    fn promote_accepts_later_state() {
        let mut model = Model::metadata(None, MeshFormat::Obj, 0, 0);
        let full = Model::from_triangles(None, vec![unit_triangle(0.0)], MeshFormat::Obj, 0);
        assert!(model.promote(full).is_ok());
        assert_eq!(model.loading_state, LoadingState::FullGeometry);
        assert_eq!(model.triangle_count(), 1);
    }

    #[test]
    fn material_lookup_by_group() {
        let mut model = Model::from_triangles(
            None,
            vec![unit_triangle(0.0), unit_triangle(1.0)],
            MeshFormat::Obj,
            0,
        );
        model
            .materials
            .insert("red".to_string(), Material::new("red"));
        model.material_groups.push(MaterialGroup {
            material: "red".to_string(),
            triangles: 1..2,
        });
        assert!(model.material_for(0).is_none());
        assert_eq!(model.material_for(1).map(|m| m.name.as_str()), Some("red"));
    }
}
