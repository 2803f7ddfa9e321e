//! Format tags.

use std::fmt;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Supported geometry file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MeshFormat {
    /// STL (Stereolithography), binary variant.
    StlBinary,
    /// STL (Stereolithography), ASCII variant.
    StlAscii,
    /// OBJ (Wavefront) with optional MTL companion files.
    Obj,
    /// 3MF (3D Manufacturing Format), ZIP-based XML.
    ThreeMf,
    /// STEP (ISO 10303-21) entity exchange.
    Step,
}

impl MeshFormat {
    /// Detect format from file extension.
    ///
    /// STL extensions map to [`MeshFormat::StlBinary`]; telling the two
    /// STL variants apart needs the file content.
    ///
    /// # Returns
    ///
    /// The detected format, or `None` if the extension is not recognized.
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "stl" => Some(Self::StlBinary),
            "obj" => Some(Self::Obj),
            "3mf" => Some(Self::ThreeMf),
            "step" | "stp" | "p21" => Some(Self::Step),
            _ => None,
        }
    }

    /// Get the canonical file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::StlBinary | Self::StlAscii => "stl",
            Self::Obj => "obj",
            Self::ThreeMf => "3mf",
            Self::Step => "step",
        }
    }

    /// Whether this tag is one of the STL variants.
    #[must_use]
    pub const fn is_stl(&self) -> bool {
        matches!(self, Self::StlBinary | Self::StlAscii)
    }

    /// The tag used to pick a parser: both STL variants share one.
    #[must_use]
    pub const fn family(&self) -> Self {
        match self {
            Self::StlAscii => Self::StlBinary,
            other => *other,
        }
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StlBinary => "STL (binary)",
            Self::StlAscii => "STL (ASCII)",
            Self::Obj => "OBJ",
            Self::ThreeMf => "3MF",
            Self::Step => "STEP",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_path_stl() {
        assert_eq!(MeshFormat::from_path("model.stl"), Some(MeshFormat::StlBinary));
        assert_eq!(MeshFormat::from_path("model.STL"), Some(MeshFormat::StlBinary));
        assert_eq!(
            MeshFormat::from_path("/path/to/model.stl"),
            Some(MeshFormat::StlBinary)
        );
    }

    #[test]
    fn format_from_path_others() {
        assert_eq!(MeshFormat::from_path("model.OBJ"), Some(MeshFormat::Obj));
        assert_eq!(MeshFormat::from_path("model.3mf"), Some(MeshFormat::ThreeMf));
        assert_eq!(MeshFormat::from_path("model.STP"), Some(MeshFormat::Step));
        assert_eq!(MeshFormat::from_path("model.step"), Some(MeshFormat::Step));
        assert_eq!(MeshFormat::from_path("model.p21"), Some(MeshFormat::Step));
    }

    #[test]
    fn format_from_path_unknown() {
        assert_eq!(MeshFormat::from_path("model.xyz"), None);
        assert_eq!(MeshFormat::from_path("model"), None);
        assert_eq!(MeshFormat::from_path(""), None);
    }

    #[test]
    fn stl_variants_share_a_family() {
        assert_eq!(MeshFormat::StlAscii.family(), MeshFormat::StlBinary);
        assert_eq!(MeshFormat::Obj.family(), MeshFormat::Obj);
        assert!(MeshFormat::StlAscii.is_stl());
        assert_eq!(MeshFormat::StlAscii.extension(), "stl");
    }
}
