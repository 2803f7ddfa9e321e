//! Caller-side caching of parsed models.
//!
//! Parsers never see a cache. [`load_cached`] wraps a registry load with a
//! lookup and a store, keyed by file identity and loading stage. Only the
//! model is cached: an outcome served from the cache carries no warnings.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mesh_types::{LoadingState, Model};
use tracing::debug;

use crate::error::{LoadError, LoadResult};
use crate::params::LoadParams;
use crate::progress::{CancellationToken, ProgressSink};
use crate::registry::ParserRegistry;
use crate::result::LoadOutcome;

/// Identity of a file's content as seen by the cache.
///
/// Two keys are equal when the canonical path, size and modification time
/// all match, so an edited file misses the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    /// Canonical path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, if the platform reports one.
    pub modified: Option<SystemTime>,
}

impl ContentKey {
    /// Build the key for a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::FileAccess`] if the file cannot be resolved or
    /// its metadata read.
    pub fn for_file<P: AsRef<Path>>(path: P) -> LoadResult<Self> {
        let path = path.as_ref();
        let canonical = path
            .canonicalize()
            .map_err(|e| LoadError::file_access(path, e))?;
        let metadata =
            std::fs::metadata(&canonical).map_err(|e| LoadError::file_access(path, e))?;
        Ok(Self {
            path: canonical,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Storage for parsed models, supplied by the host.
///
/// Implementations decide eviction and persistence; `get` returning `None`
/// is always allowed.
pub trait ModelCache: Send + Sync {
    /// Look up a model for a file at a given stage.
    fn get(&self, key: &ContentKey, state: LoadingState) -> Option<Model>;

    /// Store a model for a file at a given stage.
    fn put(&self, key: &ContentKey, state: LoadingState, model: &Model);
}

/// Load one stage of a file, consulting `cache` first.
///
/// On a miss the file is parsed through `registry` and the model stored
/// under the same key and stage. Failed loads are never cached.
///
/// # Errors
///
/// Returns whatever the underlying load returns.
pub fn load_cached<P: AsRef<Path>>(
    registry: &ParserRegistry,
    cache: &dyn ModelCache,
    path: P,
    state: LoadingState,
    params: &LoadParams,
    progress: Option<&dyn ProgressSink>,
    cancel: Option<&CancellationToken>,
) -> LoadResult<LoadOutcome> {
    let path = path.as_ref();
    let key = ContentKey::for_file(path)?;
    if let Some(model) = cache.get(&key, state) {
        debug!(path = %path.display(), %state, "cache hit");
        return Ok(LoadOutcome::new(model));
    }

    debug!(path = %path.display(), %state, "cache miss");
    let outcome = registry.load_stage(path, state, params, progress, cancel)?;
    cache.put(&key, state, &outcome.model);
    Ok(outcome)
}
