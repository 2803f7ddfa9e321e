//! Axis-aligned bounding box.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box (AABB).
///
/// Represents a 3D box aligned with the coordinate axes, defined by
/// minimum and maximum corners.
///
/// # Example
///
/// ```
/// use mesh_types::{Aabb, Vector3};
///
/// let aabb = Aabb::new(
///     Vector3::new(0.0, 0.0, 0.0),
///     Vector3::new(10.0, 10.0, 10.0),
/// );
///
/// assert!(!aabb.is_empty());
/// assert_eq!(aabb.corners_or_origin().1, Vector3::new(10.0, 10.0, 10.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner (smallest x, y, z values).
    pub min: Vector3<f32>,
    /// Maximum corner (largest x, y, z values).
    pub max: Vector3<f32>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    ///
    /// The corners are automatically corrected if min > max for any axis.
    #[must_use]
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self {
            min: min.inf(&max),
            max: min.sup(&max),
        }
    }

    /// Create an empty (invalid) AABB.
    ///
    /// An empty AABB has min > max, which is useful as a starting point
    /// for expanding to include points.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::{Aabb, Vector3};
    ///
    /// let mut aabb = Aabb::empty();
    /// assert!(aabb.is_empty());
    ///
    /// aabb.expand_to_include(&Vector3::new(1.0, 2.0, 3.0));
    /// assert!(!aabb.is_empty());
    /// ```
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f32::INFINITY),
            max: Vector3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Create an AABB from an iterator of points.
    ///
    /// Returns an empty AABB if the iterator is empty.
    #[must_use]
    pub fn from_points<'a>(points: impl Iterator<Item = &'a Vector3<f32>>) -> Self {
        let mut aabb = Self::empty();
        for point in points {
            aabb.expand_to_include(point);
        }
        aabb
    }

    /// Check if the AABB is empty (has no valid volume).
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow the box so it contains `point`.
    ///
    /// Non-finite coordinates are ignored per axis so that a single NaN in
    /// the input cannot poison the whole box.
    #[inline]
    pub fn expand_to_include(&mut self, point: &Vector3<f32>) {
        for axis in 0..3 {
            let value = point[axis];
            if value.is_finite() {
                self.min[axis] = self.min[axis].min(value);
                self.max[axis] = self.max[axis].max(value);
            }
        }
    }

    /// Corners as reported in model statistics.
    ///
    /// An empty box collapses to the origin so the `min <= max` invariant
    /// holds for every reported pair.
    #[must_use]
    pub fn corners_or_origin(&self) -> (Vector3<f32>, Vector3<f32>) {
        if self.is_empty() {
            (Vector3::zeros(), Vector3::zeros())
        } else {
            (self.min, self.max)
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}
