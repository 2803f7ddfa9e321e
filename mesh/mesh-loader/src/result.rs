//! Result type of a successful load.

use mesh_types::Model;
use tracing::warn;

use crate::error::{LoadWarning, WarningKind};

/// A loaded model plus the non-fatal anomalies met while loading it.
///
/// Whenever the model lacks triangles the input described, `warnings`
/// says why.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// The loaded model.
    pub model: Model,

    /// Non-fatal anomalies, in the order they were found.
    pub warnings: Vec<LoadWarning>,
}

impl LoadOutcome {
    /// Wrap a model with no warnings.
    #[must_use]
    pub const fn new(model: Model) -> Self {
        Self {
            model,
            warnings: Vec::new(),
        }
    }

    /// Whether any warning was attached.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether a warning of `kind` was attached.
    #[must_use]
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

impl std::fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} in {:.1} ms ({} warnings)",
            self.model,
            self.model.stats.parse_time.as_secs_f64() * 1000.0,
            self.warnings.len()
        )
    }
}

/// Collects warnings during a parse and logs each one as it arrives.
#[derive(Debug, Default)]
pub(crate) struct Warnings {
    items: Vec<LoadWarning>,
}

impl Warnings {
    pub(crate) fn push(&mut self, kind: WarningKind, message: impl Into<String>) {
        let warning = LoadWarning::new(kind, message);
        warn!(kind = ?warning.kind, "{}", warning.message);
        self.items.push(warning);
    }

    pub(crate) fn into_vec(self) -> Vec<LoadWarning> {
        self.items
    }
}

impl From<Vec<LoadWarning>> for Warnings {
    /// Continue collecting after warnings an earlier stage already logged.
    fn from(items: Vec<LoadWarning>) -> Self {
        Self { items }
    }
}
