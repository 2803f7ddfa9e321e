//! Triangle record shared by every loader.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A triangle with its own normal and three concrete vertex positions.
///
/// Triangles never share vertices: a model is a triangle soup, so
/// `vertices` always holds exactly three positions. The `attribute` field
/// carries the 16-bit per-facet attribute of binary STL and is zero for
/// every other format.
///
/// Winding is **counter-clockwise (CCW) when viewed from the front**
/// (normal points toward viewer).
///
/// # Example
///
/// ```
/// use mesh_types::{Triangle, Vector3};
///
/// let tri = Triangle::from_vertices([
///     Vector3::new(0.0, 0.0, 0.0),
///     Vector3::new(1.0, 0.0, 0.0),
///     Vector3::new(0.0, 1.0, 0.0),
/// ]);
///
/// assert!((tri.normal.z - 1.0).abs() < 1e-6);
/// assert!((tri.area() - 0.5).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Triangle {
    /// Facet normal, as stored in the file or computed from the vertices.
    pub normal: Vector3<f32>,
    /// Vertex positions in file order.
    pub vertices: [Vector3<f32>; 3],
    /// Opaque per-facet attribute (binary STL "attribute byte count").
    pub attribute: u16,
}

impl Triangle {
    /// Create a triangle from an explicit normal and vertices.
    #[inline]
    #[must_use]
    pub const fn new(normal: Vector3<f32>, vertices: [Vector3<f32>; 3], attribute: u16) -> Self {
        Self {
            normal,
            vertices,
            attribute,
        }
    }

    /// Create a triangle whose normal is computed from its vertices.
    ///
    /// Degenerate triangles get a zero normal.
    #[must_use]
    pub fn from_vertices(vertices: [Vector3<f32>; 3]) -> Self {
        let normal = face_normal(&vertices).unwrap_or_else(Vector3::zeros);
        Self::new(normal, vertices, 0)
    }

    /// Compute the unit normal of the vertex positions.
    ///
    /// Returns `None` for degenerate triangles (zero area).
    #[must_use]
    pub fn geometric_normal(&self) -> Option<Vector3<f32>> {
        face_normal(&self.vertices)
    }

    /// Area of the triangle.
    #[must_use]
    pub fn area(&self) -> f32 {
        let [a, b, c] = self.vertices;
        (b - a).cross(&(c - a)).norm() * 0.5
    }

    /// Reverse the winding and flip the normal.
    #[must_use]
    pub fn flipped(&self) -> Self {
        let [a, b, c] = self.vertices;
        Self::new(-self.normal, [a, c, b], self.attribute)
    }
}

/// Unit normal of three positions by the right-hand rule.
///
/// Returns `None` when the cross product vanishes.
#[must_use]
pub fn face_normal(vertices: &[Vector3<f32>; 3]) -> Option<Vector3<f32>> {
    let [a, b, c] = vertices;
    let n = (b - a).cross(&(c - a));
    let len_sq = n.norm_squared();
    if len_sq > f32::EPSILON * f32::EPSILON {
        Some(n / len_sq.sqrt())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normal_follows_winding() {
        let tri = Triangle::from_vertices([
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
        ]);
        assert_relative_eq!(tri.normal.z, -1.0);
    }

    #[test]
    fn degenerate_triangle_has_zero_normal() {
        let tri = Triangle::from_vertices([
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
        ]);
        assert_eq!(tri.normal, Vector3::zeros());
        assert!(tri.geometric_normal().is_none());
    }

    #[test]
    fn flipped_reverses_winding() {
        let tri = Triangle::from_vertices([
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ]);
        let flipped = tri.flipped();
        assert_relative_eq!(flipped.normal.z, -1.0);
        let recomputed = flipped.geometric_normal();
        assert!(recomputed.is_some_and(|n| (n.z + 1.0).abs() < 1e-6));
    }

    #[test]
    fn keeps_file_normal_and_attribute() {
        let tri = Triangle::new(
            Vector3::zeros(),
            [Vector3::zeros(), Vector3::x(), Vector3::y()],
            0x7c00,
        );
        assert_eq!(tri.normal, Vector3::zeros());
        assert_eq!(tri.attribute, 0x7c00);
    }
}
