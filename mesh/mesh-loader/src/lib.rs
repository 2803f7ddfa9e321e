//! Mesh file loading for CortenForge.
//!
//! Four unrelated on-disk representations are parsed into one
//! [`Model`]: an ordered list of triangles with statistics.
//!
//! - **STL** - Binary and ASCII triangle soups
//! - **OBJ** (Wavefront) - Vertex/face text with `mtllib` materials
//! - **3MF** - ZIP-packaged XML with component hierarchies and transforms
//! - **STEP** (ISO 10303-21) - Boundary-representation faces, triangulated
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. It does not
//! render, cache or persist anything; callers get a model and warnings, or
//! a typed [`LoadError`].
//!
//! # Example
//!
//! ```no_run
//! use mesh_loader::load_mesh;
//!
//! let outcome = load_mesh("part.3mf").unwrap();
//! println!("{}", outcome);
//! for warning in &outcome.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! ```
//!
//! # Progress, cancellation and stages
//!
//! Long loads go through a [`ParserRegistry`], which takes an optional
//! [`ProgressSink`] and [`CancellationToken`] and can produce each
//! [`LoadingState`] separately:
//!
//! ```no_run
//! use mesh_loader::{CancellationToken, LoadParams, LoadingState, ParserRegistry};
//!
//! let registry = ParserRegistry::new();
//! let cancel = CancellationToken::new();
//! let progress = |percent: u8, message: &str| println!("{percent:3}% {message}");
//!
//! let preview = registry
//!     .load_stage(
//!         "scan.stl",
//!         LoadingState::LowResGeometry,
//!         &LoadParams::interactive(),
//!         Some(&progress),
//!         Some(&cancel),
//!     )
//!     .unwrap();
//! println!("{} preview triangles", preview.model.triangle_count());
//! ```
//!
//! Parsers are stateless and `Send + Sync`; independent files may be loaded
//! on separate threads with a shared registry.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cache;
mod detect;
mod error;
mod file;
mod mtl;
mod obj;
mod params;
mod progress;
mod progressive;
mod registry;
mod result;
mod step;
mod stl;
mod threemf;

use std::path::Path;

pub use cache::{load_cached, ContentKey, ModelCache};
pub use detect::{binary_stl_size, detect, detect_verified, validate};
pub use error::{LoadError, LoadResult, LoadWarning, Location, WarningKind};
pub use file::SNIFF_WINDOW;
pub use obj::{load_obj, ObjParser};
pub use params::LoadParams;
pub use progress::{percent_of, CancellationToken, ParseContext, ProgressSink};
pub use progressive::ProgressiveLoader;
pub use registry::{MeshParser, ParserRegistry};
pub use result::LoadOutcome;
pub use step::{load_step, StepParser};
pub use stl::{load_stl, save_stl, StlParser};
pub use threemf::{load_3mf, save_3mf, ThreeMfParser};

pub use mesh_types::{LoadingState, Material, MaterialGroup, MeshFormat, Model, ModelStats, Triangle};

/// Load a file in any supported format, detected from extension or content.
///
/// Uses a fresh [`ParserRegistry`] with default parameters, no progress
/// reporting and no cancellation.
///
/// # Errors
///
/// Returns an error if the format cannot be determined, the file cannot be
/// read, or its content is invalid.
///
/// # Example
///
/// ```no_run
/// use mesh_loader::load_mesh;
///
/// let outcome = load_mesh("model.stl").unwrap();
/// assert_eq!(outcome.model.stats.vertex_count, 3 * outcome.model.stats.triangle_count);
/// ```
pub fn load_mesh<P: AsRef<Path>>(path: P) -> LoadResult<LoadOutcome> {
    ParserRegistry::new().load(path, &LoadParams::default(), None, None)
}
