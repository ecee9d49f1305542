use serde::{Deserialize, Serialize};

/// Whether the accelerated engine may be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Use the engine when all mandatory files are binary.
    #[default]
    Auto,
    /// Always use the interpreted decoders.
    Disabled,
}

/// Histogram parameters for the reprojection error statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Number of equally sized bins between zero and `error_histogram_max`.
    pub error_histogram_bins: usize,
    /// Upper bound of the last regular bin, larger errors land in the overflow bin.
    pub error_histogram_max: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            error_histogram_bins: 20,
            error_histogram_max: 4.0,
        }
    }
}

/// Configuration of the reconstruction loading.
///
/// Missing fields fall back to their defaults when deserializing.
///
/// # Example
///
/// ```
/// use kornia_scene::{EngineMode, ReconstructionConfig};
///
/// let config: ReconstructionConfig = serde_json::from_str(r#"{"engine": "disabled"}"#).unwrap();
/// assert_eq!(config.engine, EngineMode::Disabled);
/// assert!(config.load_rig_data);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Accelerated engine selection.
    pub engine: EngineMode,
    /// Binary images files of at least this many bytes are decoded without
    /// keypoints by the interpreted decoders.
    pub lazy_points2d_threshold_bytes: u64,
    /// Decode cameras, images and points3D concurrently.
    pub parallel_decode: bool,
    /// Decode rigs and frames when both files are present.
    pub load_rig_data: bool,
    /// Statistics parameters.
    pub stats: StatsConfig,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            engine: EngineMode::Auto,
            lazy_points2d_threshold_bytes: 256 * 1024 * 1024,
            parallel_decode: true,
            load_rig_data: true,
            stats: StatsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() -> Result<(), serde_json::Error> {
        let config: ReconstructionConfig = serde_json::from_str(
            r#"{"lazy_points2d_threshold_bytes": 1024, "stats": {"error_histogram_bins": 8}}"#,
        )?;
        assert_eq!(config.engine, EngineMode::Auto);
        assert_eq!(config.lazy_points2d_threshold_bytes, 1024);
        assert!(config.parallel_decode);
        assert_eq!(config.stats.error_histogram_bins, 8);
        assert_eq!(config.stats.error_histogram_max, 4.0);
        Ok(())
    }
}
