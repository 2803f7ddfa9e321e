//! Parser trait and the registry that maps formats to parsers.
//!
//! The registry is an ordinary value: build it once at startup and pass it
//! to whoever loads files. Nothing here is global.

use std::collections::BTreeMap;
use std::path::Path;

use mesh_types::{LoadingState, MeshFormat, Model};
use tracing::{debug, info};

use crate::detect;
use crate::error::{LoadError, LoadResult};
use crate::obj::ObjParser;
use crate::params::LoadParams;
use crate::progress::{CancellationToken, ParseContext, ProgressSink};
use crate::result::LoadOutcome;
use crate::step::StepParser;
use crate::stl::StlParser;
use crate::threemf::ThreeMfParser;

/// A parser for one file format family.
///
/// Implementations hold no state between calls: everything a parse needs
/// lives on the stack of that call, so one parser value can serve many
/// concurrent loads.
pub trait MeshParser: Send + Sync {
    /// Format family handled by this parser.
    fn format(&self) -> MeshFormat;

    /// Cheap structural check of the container; no geometry is read.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Structural`] if the container is malformed.
    fn validate(&self, path: &Path) -> LoadResult<()>;

    /// Build a [`LoadingState::MetadataOnly`] model from headers alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    fn read_metadata(&self, path: &Path) -> LoadResult<Model> {
        self.validate(path)?;
        let size = std::fs::metadata(path)
            .map_err(|e| LoadError::file_access(path, e))?
            .len();
        Ok(Model::metadata(None, self.format(), size, 0))
    }

    /// Parse every triangle of the file.
    ///
    /// # Errors
    ///
    /// Returns the first fatal problem, or [`LoadError::Cancelled`].
    fn parse(
        &self,
        path: &Path,
        ctx: &mut ParseContext<'_>,
        params: &LoadParams,
    ) -> LoadResult<LoadOutcome>;

    /// Parse a reduced subset of at most
    /// [`LoadParams::low_res_max_triangles`] triangles.
    ///
    /// The default parses everything and keeps an evenly strided subset.
    ///
    /// # Errors
    ///
    /// As [`parse`](Self::parse).
    fn parse_low_res(
        &self,
        path: &Path,
        ctx: &mut ParseContext<'_>,
        params: &LoadParams,
    ) -> LoadResult<LoadOutcome> {
        let full = self.parse(path, ctx, params)?;
        Ok(crate::progressive::subsample(
            full,
            params.low_res_max_triangles,
        ))
    }
}

/// Maps each format family to the parser that handles it.
///
/// # Example
///
/// ```no_run
/// use mesh_loader::{CancellationToken, LoadParams, ParserRegistry};
///
/// let registry = ParserRegistry::new();
/// let cancel = CancellationToken::new();
/// let progress = |pct: u8, msg: &str| eprintln!("{pct}% {msg}");
///
/// let outcome = registry
///     .load("part.3mf", &LoadParams::default(), Some(&progress), Some(&cancel))
///     .unwrap();
/// println!("{}", outcome);
/// ```
pub struct ParserRegistry {
    parsers: BTreeMap<MeshFormat, Box<dyn MeshParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("formats", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ParserRegistry {
    /// Registry with the built-in STL, OBJ, 3MF and STEP parsers.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(StlParser));
        registry.register(Box::new(ObjParser));
        registry.register(Box::new(ThreeMfParser));
        registry.register(Box::new(StepParser));
        registry
    }

    /// Registry with no parsers.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            parsers: BTreeMap::new(),
        }
    }

    /// Register a parser, replacing any parser for the same family.
    pub fn register(&mut self, parser: Box<dyn MeshParser>) {
        self.parsers.insert(parser.format().family(), parser);
    }

    /// Parser for a format, if registered.
    #[must_use]
    pub fn parser(&self, format: MeshFormat) -> Option<&dyn MeshParser> {
        self.parsers.get(&format.family()).map(AsRef::as_ref)
    }

    /// Formats with a registered parser.
    pub fn formats(&self) -> impl Iterator<Item = MeshFormat> + '_ {
        self.parsers.keys().copied()
    }

    /// Detect the format of a file.
    ///
    /// # Errors
    ///
    /// See [`detect::detect`].
    pub fn detect<P: AsRef<Path>>(&self, path: P) -> LoadResult<MeshFormat> {
        detect::detect(path)
    }

    /// Detect the format and run its structural validation.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnknownFormat`] if no registered parser
    /// handles the file, or the validation failure.
    pub fn validate<P: AsRef<Path>>(&self, path: P) -> LoadResult<()> {
        let path = path.as_ref();
        let format = detect::detect(path)?;
        self.require(path, format)?.validate(path)
    }

    /// Load every triangle of a file.
    ///
    /// # Errors
    ///
    /// Returns the typed failure; [`LoadError::Cancelled`] when `cancel`
    /// was triggered. No partial model is ever returned.
    pub fn load<P: AsRef<Path>>(
        &self,
        path: P,
        params: &LoadParams,
        progress: Option<&dyn ProgressSink>,
        cancel: Option<&CancellationToken>,
    ) -> LoadResult<LoadOutcome> {
        self.load_stage(
            path,
            LoadingState::FullGeometry,
            params,
            progress,
            cancel,
        )
    }

    /// Read only the metadata of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if detection or validation fails.
    pub fn load_metadata<P: AsRef<Path>>(&self, path: P) -> LoadResult<Model> {
        let path = path.as_ref();
        let format = detect::detect(path)?;
        self.require(path, format)?.read_metadata(path)
    }

    /// Produce one loading stage of a file.
    ///
    /// Each call is an independent parse; nothing is remembered between
    /// calls.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub fn load_stage<P: AsRef<Path>>(
        &self,
        path: P,
        state: LoadingState,
        params: &LoadParams,
        progress: Option<&dyn ProgressSink>,
        cancel: Option<&CancellationToken>,
    ) -> LoadResult<LoadOutcome> {
        let path = path.as_ref();
        let format = detect::detect(path)?;
        let parser = self.require(path, format)?;
        if params.validate_content {
            parser.validate(path)?;
        }
        debug!(path = %path.display(), %format, %state, "dispatching load");

        let mut ctx = ParseContext::new(progress, cancel, params.progress_interval);
        ctx.checkpoint()?;
        let outcome = match state {
            LoadingState::MetadataOnly => LoadOutcome::new(parser.read_metadata(path)?),
            LoadingState::LowResGeometry => parser.parse_low_res(path, &mut ctx, params)?,
            LoadingState::FullGeometry => parser.parse(path, &mut ctx, params)?,
        };
        info!(
            path = %path.display(),
            %state,
            triangles = outcome.model.stats.triangle_count,
            warnings = outcome.warnings.len(),
            "load finished"
        );
        Ok(outcome)
    }

    fn require(&self, path: &Path, format: MeshFormat) -> LoadResult<&dyn MeshParser> {
        self.parser(format).ok_or_else(|| LoadError::UnknownFormat {
            path: path.to_path_buf(),
            reason: format!("no parser registered for {format}"),
        })
    }
}
