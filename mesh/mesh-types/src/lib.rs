//! Geometry model types for CortenForge mesh loading.
//!
//! This crate provides the shared output types of every file loader:
//!
//! - [`Triangle`] - A normal, three vertex positions and a per-facet attribute
//! - [`Model`] - An ordered triangle soup with statistics and a [`LoadingState`]
//! - [`ModelStats`] - Counts, bounding corners, file size, format and parse time
//! - [`Material`] - Surface properties referenced by name from OBJ files
//! - [`MeshFormat`] - Tag identifying the source format
//! - [`Aabb`] - Axis-aligned bounding box
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies** and no I/O.
//!
//! # Units
//!
//! Coordinates are `f32`, matching the precision of binary STL. Loaders
//! that compute in `f64` (transform composition, curve sampling) round
//! only when emitting triangles.
//!
//! # Example
//!
//! ```
//! use mesh_types::{MeshFormat, Model, Triangle, Vector3};
//!
//! let tri = Triangle::from_vertices([
//!     Vector3::new(0.0, 0.0, 0.0),
//!     Vector3::new(1.0, 0.0, 0.0),
//!     Vector3::new(0.5, 1.0, 0.0),
//! ]);
//! let model = Model::from_triangles(None, vec![tri], MeshFormat::StlAscii, 0);
//!
//! assert_eq!(model.stats.vertex_count, 3 * model.stats.triangle_count);
//! assert!(!model.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod bounds;
mod format;
mod material;
mod model;
mod triangle;

pub use bounds::Aabb;
pub use format::MeshFormat;
pub use material::{Material, MaterialGroup, Rgb};
pub use model::{LoadingState, Model, ModelStats, StateRegression};
pub use triangle::{face_normal, Triangle};

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point3, Vector3};
