//! Compression parameters shared by all profiles.

use serde::{Deserialize, Serialize};

/// Tunable compression parameters.
///
/// Values are clamped into their valid ranges by [`limit`](Self::limit);
/// compressors always work on a limited copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionParameters {
    /// Number of parse/statistics rounds per block (2..=64).
    pub optimize_iterations: usize,
    /// Initial block split depth: inputs start as `2^(depth-1)` blocks (1..=9).
    pub split_optimization_depth: usize,
    /// Shortest match the parser may use (1..=3).
    pub min_length: usize,
    /// Largest match offset the parser may use (1..=131072).
    pub max_offset: usize,
    /// Fixed block size, or 0 to let the block splitter decide (16..=65536).
    pub block_size: usize,
}

impl CompressionParameters {
    /// Highest supported compression level.
    pub const MAX_LEVEL: u8 = 9;

    /// Parameters for compression level `level` (clamped to 1..=9).
    pub fn with_level(level: u8) -> Self {
        let mut params = Self::default();
        params.set_level(level);
        params
    }

    /// Set the compression level, keeping the other fields.
    pub fn set_level(&mut self, level: u8) {
        let level = level.clamp(1, Self::MAX_LEVEL);
        self.optimize_iterations = 40;
        self.split_optimization_depth = level as usize;
    }

    /// Clamp every field into its valid range.
    pub fn limit(&mut self) {
        self.optimize_iterations = self.optimize_iterations.clamp(2, 64);
        self.split_optimization_depth = self.split_optimization_depth.clamp(1, 9);
        self.min_length = self.min_length.clamp(1, 3);
        self.max_offset = self.max_offset.clamp(1, 131_072);
        if self.block_size > 0 {
            self.block_size = self.block_size.clamp(16, 65_536);
        }
    }

    /// Return a clamped copy.
    pub fn limited(mut self) -> Self {
        self.limit();
        self
    }
}

impl Default for CompressionParameters {
    fn default() -> Self {
        Self {
            optimize_iterations: 40,
            split_optimization_depth: 1,
            min_length: 1,
            max_offset: 65_536,
            block_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = CompressionParameters::default();
        assert_eq!(params.optimize_iterations, 40);
        assert_eq!(params.split_optimization_depth, 1);
        assert_eq!(params.min_length, 1);
        assert_eq!(params.max_offset, 65_536);
        assert_eq!(params.block_size, 0);
    }

    #[test]
    fn test_limit_clamps() {
        let params = CompressionParameters {
            optimize_iterations: 1000,
            split_optimization_depth: 0,
            min_length: 9,
            max_offset: 0,
            block_size: 3,
        }
        .limited();
        assert_eq!(params.optimize_iterations, 64);
        assert_eq!(params.split_optimization_depth, 1);
        assert_eq!(params.min_length, 3);
        assert_eq!(params.max_offset, 1);
        assert_eq!(params.block_size, 16);

        let params = CompressionParameters {
            block_size: 0,
            ..Default::default()
        }
        .limited();
        assert_eq!(params.block_size, 0);
    }

    #[test]
    fn test_level() {
        assert_eq!(CompressionParameters::with_level(0).split_optimization_depth, 1);
        assert_eq!(CompressionParameters::with_level(5).split_optimization_depth, 5);
        assert_eq!(CompressionParameters::with_level(200).split_optimization_depth, 9);
    }

    #[test]
    fn test_json_partial() {
        let params: CompressionParameters =
            serde_json::from_str(r#"{"min_length": 2, "block_size": 65536}"#).unwrap();
        assert_eq!(params.min_length, 2);
        assert_eq!(params.block_size, 65_536);
        assert_eq!(params.optimize_iterations, 40);
    }
}
