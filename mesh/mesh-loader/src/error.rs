//! Error and warning types for mesh loading.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for mesh loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Where in the input a problem was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Byte offset into the file.
    ByteOffset(u64),
    /// 1-based line number.
    Line(usize),
    /// STEP entity id (`#id`).
    Entity(u64),
    /// Entry name inside an archive.
    Entry(String),
    /// No finer location available.
    Unknown,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByteOffset(offset) => write!(f, " at byte {offset}"),
            Self::Line(line) => write!(f, " at line {line}"),
            Self::Entity(id) => write!(f, " in entity #{id}"),
            Self::Entry(name) => write!(f, " in archive entry '{name}'"),
            Self::Unknown => Ok(()),
        }
    }
}

/// Errors that can occur while detecting, validating or parsing a file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file is missing or cannot be read.
    #[error("cannot access {path}: {source}")]
    FileAccess {
        /// Path that could not be accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Neither extension nor content match a supported format.
    #[error("unknown file format for {path}: {reason}")]
    UnknownFormat {
        /// Path that was inspected.
        path: PathBuf,
        /// Why detection failed.
        reason: String,
    },

    /// The container is malformed (bad header, size mismatch, missing entry).
    #[error("structural validation failed{location}: {reason}")]
    Structural {
        /// Description of the structural problem.
        reason: String,
        /// Where it was detected.
        location: Location,
    },

    /// Content could not be parsed (bad token, truncated data, bad reference).
    #[error("parse error{location}: {message}")]
    Parse {
        /// Description of what was invalid.
        message: String,
        /// Where it was detected.
        location: Location,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl LoadError {
    /// Create a `Structural` error without a location.
    #[must_use]
    pub fn structural(reason: impl Into<String>) -> Self {
        Self::Structural {
            reason: reason.into(),
            location: Location::Unknown,
        }
    }

    /// Create a `Structural` error at a location.
    #[must_use]
    pub fn structural_at(reason: impl Into<String>, location: Location) -> Self {
        Self::Structural {
            reason: reason.into(),
            location,
        }
    }

    /// Create a `Parse` error without a location.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            location: Location::Unknown,
        }
    }

    /// Create a `Parse` error at a location.
    #[must_use]
    pub fn parse_at(message: impl Into<String>, location: Location) -> Self {
        Self::Parse {
            message: message.into(),
            location,
        }
    }

    /// Wrap an I/O error for `path`.
    #[must_use]
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a cooperative cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this is a structural validation failure.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }
}

/// Category of a non-fatal anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// A `mtllib` file could not be read.
    MissingMaterialLibrary,
    /// `usemtl` named a material that no library defines.
    UnknownMaterial,
    /// A material property line was malformed and skipped.
    InvalidMaterialProperty,
    /// A STEP reference pointed at an undefined entity.
    UnresolvedReference,
    /// A face could not be reconstructed and was dropped.
    SkippedFace,
    /// Inner face bounds could not be bridged and were dropped.
    IgnoredInnerBound,
    /// A 3MF build had no items; all root objects were emitted.
    EmptyBuild,
    /// Only a subset of triangles was kept (low-resolution stage).
    Subsampled,
    /// The input holds no geometry.
    EmptyInput,
    /// The STEP end marker is missing.
    MissingEndMarker,
}

/// A non-fatal anomaly attached to a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    /// Category of the anomaly.
    pub kind: WarningKind,
    /// Human-readable description.
    pub message: String,
}

impl LoadWarning {
    /// Create a warning.
    #[must_use]
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
