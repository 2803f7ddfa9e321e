//! Parameters for mesh loading.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for mesh loading.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct LoadParams {
    /// Triangles (or entities) processed between progress reports and
    /// cancellation polls. Default: 4096
    pub progress_interval: usize,

    /// Triangles read between scratch-buffer reclamation passes in the STL
    /// loader. Also bounds the size of one binary read chunk.
    /// Default: 1 048 576
    pub reclaim_interval: usize,

    /// Triangle budget of the low-resolution loading stage. Default: 50 000
    pub low_res_max_triangles: usize,

    /// Segments used to linearise a full circle in STEP edges. Default: 24
    pub curve_segments: usize,

    /// Verify file content even when the extension is recognised.
    /// Default: false
    pub validate_content: bool,
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            progress_interval: 4096,
            reclaim_interval: 1 << 20,
            low_res_max_triangles: 50_000,
            curve_segments: 24,
            validate_content: false,
        }
    }
}

impl LoadParams {
    /// Params for interactive use: frequent progress, content verification.
    #[must_use]
    pub fn interactive() -> Self {
        Self {
            progress_interval: 1024,
            validate_content: true,
            ..Default::default()
        }
    }

    /// Params for batch conversion: coarse progress, trust extensions.
    #[must_use]
    pub fn batch() -> Self {
        Self {
            progress_interval: 65_536,
            validate_content: false,
            ..Default::default()
        }
    }

    /// Set the progress/cancellation interval (at least 1).
    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Set the reclamation interval (at least 1).
    #[must_use]
    pub fn with_reclaim_interval(mut self, interval: usize) -> Self {
        self.reclaim_interval = interval.max(1);
        self
    }

    /// Set the low-resolution triangle budget (at least 1).
    #[must_use]
    pub fn with_low_res_max_triangles(mut self, max: usize) -> Self {
        self.low_res_max_triangles = max.max(1);
        self
    }

    /// Set the number of segments per full circle (at least 3).
    #[must_use]
    pub fn with_curve_segments(mut self, segments: usize) -> Self {
        self.curve_segments = segments.max(3);
        self
    }

    /// Set whether content is verified regardless of extension.
    #[must_use]
    pub const fn with_validate_content(mut self, validate: bool) -> Self {
        self.validate_content = validate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = LoadParams::default();
        assert_eq!(params.progress_interval, 4096);
        assert_eq!(params.reclaim_interval, 1_048_576);
        assert_eq!(params.curve_segments, 24);
        assert!(!params.validate_content);
    }

    #[test]
    fn test_presets() {
        assert!(LoadParams::interactive().validate_content);
        assert!(LoadParams::batch().progress_interval > LoadParams::default().progress_interval);
    }

    #[test]
    fn test_builders_clamp() {
        let params = LoadParams::default()
            .with_progress_interval(0)
            .with_reclaim_interval(0)
            .with_low_res_max_triangles(0)
            .with_curve_segments(1);
        assert_eq!(params.progress_interval, 1);
        assert_eq!(params.reclaim_interval, 1);
        assert_eq!(params.low_res_max_triangles, 1);
        assert_eq!(params.curve_segments, 3);
    }
}
