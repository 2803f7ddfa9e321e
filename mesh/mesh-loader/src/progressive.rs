//! Progressive loading: metadata, then a low-resolution preview, then the
//! full geometry.
//!
//! Parsers are stateless. [`ProgressiveLoader`] is the caller-side handle
//! that remembers which stage was produced last and asks the registry for
//! the next one as an independent parse.

use std::ops::Range;
use std::path::{Path, PathBuf};

use mesh_types::{LoadingState, MaterialGroup, Model};
use tracing::debug;

use crate::error::{LoadResult, LoadWarning, WarningKind};
use crate::params::LoadParams;
use crate::progress::{CancellationToken, ProgressSink};
use crate::registry::ParserRegistry;
use crate::result::{LoadOutcome, Warnings};

/// Keep an evenly strided subset of at most `max_triangles` triangles.
///
/// Material groups are remapped onto the kept triangles. The result is
/// marked [`LoadingState::LowResGeometry`] and, if anything was dropped,
/// carries a [`WarningKind::Subsampled`] warning.
pub(crate) fn subsample(outcome: LoadOutcome, max_triangles: usize) -> LoadOutcome {
    let LoadOutcome { mut model, warnings } = outcome;
    let mut warnings = Warnings::from(warnings);
    let total = model.triangles.len();
    let stride = total.div_ceil(max_triangles.max(1)).max(1);

    if stride > 1 {
        model.triangles = std::mem::take(&mut model.triangles)
            .into_iter()
            .step_by(stride)
            .collect();
        model.material_groups = model
            .material_groups
            .iter()
            .filter_map(|group| {
                let triangles = kept_range(&group.triangles, stride);
                (!triangles.is_empty()).then(|| MaterialGroup {
                    material: group.material.clone(),
                    triangles,
                })
            })
            .collect();
        model.recompute_stats();
        let message = format!(
            "low-resolution stage kept {} of {total} triangles (every {stride})",
            model.triangles.len()
        );
        warnings.push(WarningKind::Subsampled, message);
    }
    debug!(total, kept = model.triangles.len(), stride, "subsampled model");
    model.loading_state = LoadingState::LowResGeometry;
    LoadOutcome {
        model,
        warnings: warnings.into_vec(),
    }
}

/// Indices `i` in `range` with `i % stride == 0`, renumbered.
fn kept_range(range: &Range<usize>, stride: usize) -> Range<usize> {
    range.start.div_ceil(stride)..range.end.div_ceil(stride)
}

/// Caller-side driver for the `MetadataOnly -> LowResGeometry ->
/// FullGeometry` progression.
///
/// # Example
///
/// ```no_run
/// use mesh_loader::{LoadParams, ParserRegistry, ProgressiveLoader};
///
/// let registry = ParserRegistry::new();
/// let mut loader = ProgressiveLoader::new(&registry, "scan.stl", LoadParams::default());
/// while let Some(state) = loader.advance(None, None).unwrap() {
///     println!("{state}: {} triangles", loader.model().unwrap().triangle_count());
/// }
/// ```
#[derive(Debug)]
pub struct ProgressiveLoader<'r> {
    registry: &'r ParserRegistry,
    path: PathBuf,
    params: LoadParams,
    current: Option<LoadOutcome>,
}

impl<'r> ProgressiveLoader<'r> {
    /// Create a loader that has produced nothing yet.
    pub fn new<P: AsRef<Path>>(registry: &'r ParserRegistry, path: P, params: LoadParams) -> Self {
        Self {
            registry,
            path: path.as_ref().to_path_buf(),
            params,
            current: None,
        }
    }

    /// File being loaded.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last stage produced, if any.
    #[must_use]
    pub fn state(&self) -> Option<LoadingState> {
        self.current.as_ref().map(|o| o.model.loading_state)
    }

    /// Model of the last stage produced.
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        self.current.as_ref().map(|o| &o.model)
    }

    /// Warnings of the last stage produced.
    #[must_use]
    pub fn warnings(&self) -> &[LoadWarning] {
        self.current.as_ref().map_or(&[][..], |o| o.warnings.as_slice())
    }

    /// Whether the full geometry has been produced.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state() == Some(LoadingState::FullGeometry)
    }

    /// Stage that [`advance`](Self::advance) would produce next.
    #[must_use]
    pub fn next_state(&self) -> Option<LoadingState> {
        match self.state() {
            None => Some(LoadingState::MetadataOnly),
            Some(state) => state.next(),
        }
    }

    /// Produce the next stage.
    ///
    /// Returns the new state, or `None` once the full geometry exists.
    /// On error (including cancellation) the previous stage is kept.
    ///
    /// # Errors
    ///
    /// Returns the load failure of the stage.
    pub fn advance(
        &mut self,
        progress: Option<&dyn ProgressSink>,
        cancel: Option<&CancellationToken>,
    ) -> LoadResult<Option<LoadingState>> {
        let Some(next) = self.next_state() else {
            return Ok(None);
        };
        self.advance_to(next, progress, cancel)
    }

    /// Jump directly to `target`, skipping intermediate stages.
    ///
    /// A target that is not later than the current stage does nothing
    /// and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns the load failure of the stage.
    pub fn advance_to(
        &mut self,
        target: LoadingState,
        progress: Option<&dyn ProgressSink>,
        cancel: Option<&CancellationToken>,
    ) -> LoadResult<Option<LoadingState>> {
        if self.state().is_some_and(|current| current >= target) {
            return Ok(None);
        }
        let outcome =
            self.registry
                .load_stage(&self.path, target, &self.params, progress, cancel)?;
        debug!(path = %self.path.display(), state = %target, "progressive stage ready");
        match self.current.as_mut() {
            Some(current) => {
                // Ordering was checked above, so promotion cannot regress.
                if current.model.promote(outcome.model).is_ok() {
                    current.warnings = outcome.warnings;
                }
            }
            None => self.current = Some(outcome),
        }
        Ok(Some(target))
    }

    /// Consume the loader, returning the last stage produced.
    #[must_use]
    pub fn into_outcome(self) -> Option<LoadOutcome> {
        self.current
    }
}
