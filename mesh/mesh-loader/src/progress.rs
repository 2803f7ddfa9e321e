//! Progress reporting and cooperative cancellation.
//!
//! Both are supplied by the caller per load call. Loaders only poll them
//! at a bounded interval (see [`crate::LoadParams::progress_interval`]),
//! never once per triangle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{LoadError, LoadResult};

/// Receives progress updates from a running load.
///
/// The caller decides how to marshal updates to other threads. Closures of
/// the shape `Fn(u8, &str)` implement this trait.
///
/// # Example
///
/// ```
/// use mesh_loader::ProgressSink;
///
/// let sink = |percent: u8, message: &str| println!("{percent:3}% {message}");
/// sink.report(50, "halfway");
/// ```
pub trait ProgressSink {
    /// Report progress in percent (0..=100) with a short status message.
    fn report(&self, percent: u8, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str),
{
    fn report(&self, percent: u8, message: &str) {
        self(percent, message);
    }
}

/// Caller-owned cancellation flag.
///
/// Clones share the same flag, so one clone can be handed to a worker
/// thread while another stays with the UI.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Per-call progress and cancellation state handed to a parser.
pub struct ParseContext<'a> {
    progress: Option<&'a dyn ProgressSink>,
    cancel: Option<&'a CancellationToken>,
    interval: usize,
    next_tick: usize,
    last_percent: u8,
}

impl<'a> ParseContext<'a> {
    /// Create a context polling every `interval` units of work.
    #[must_use]
    pub fn new(
        progress: Option<&'a dyn ProgressSink>,
        cancel: Option<&'a CancellationToken>,
        interval: usize,
    ) -> Self {
        let interval = interval.max(1);
        Self {
            progress,
            cancel,
            interval,
            next_tick: interval,
            last_percent: 0,
        }
    }

    /// A context with no sink and no token.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(None, None, usize::MAX)
    }

    /// Record that `done` of `total` units are finished.
    ///
    /// Reports and polls for cancellation only when `done` crosses the
    /// next interval boundary.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Cancelled`] if cancellation was requested.
    pub fn tick(&mut self, done: usize, total: usize, message: &str) -> LoadResult<()> {
        self.tick_with(done, message, || percent_of(done, total))
    }

    /// Like [`tick`](Self::tick), for work whose percentage is not measured
    /// in the same units as the interval (e.g. triangles counted, bytes
    /// consumed). `percent` is only evaluated at interval boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Cancelled`] if cancellation was requested.
    pub fn tick_with(
        &mut self,
        done: usize,
        message: &str,
        percent: impl FnOnce() -> u8,
    ) -> LoadResult<()> {
        if done < self.next_tick {
            return Ok(());
        }
        self.next_tick = done.saturating_add(self.interval);
        self.checkpoint()?;
        self.report(percent(), message);
        Ok(())
    }

    /// Poll the cancellation token unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Cancelled`] if cancellation was requested.
    pub fn checkpoint(&self) -> LoadResult<()> {
        if self.cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(LoadError::Cancelled);
        }
        Ok(())
    }

    /// Report a percentage directly; values never go backwards.
    pub fn report(&mut self, percent: u8, message: &str) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        if let Some(sink) = self.progress {
            sink.report(percent, message);
        }
    }

    /// Report completion.
    pub fn finish(&mut self, message: &str) {
        self.report(100, message);
    }

    /// Configured polling interval.
    #[must_use]
    pub const fn interval(&self) -> usize {
        self.interval
    }
}

/// Integer percentage of `done` out of `total`, clamped to 0..=100.
#[must_use]
pub fn percent_of(done: usize, total: usize) -> u8 {
    percent_of_u64(done as u64, total as u64)
}

/// [`percent_of`] for byte counts.
#[must_use]
pub fn percent_of_u64(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u128::from(done.min(total)) * 100) / u128::from(total);
    u8::try_from(pct).unwrap_or(100)
}
