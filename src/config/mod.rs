//! Configuration types for the detection pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for voxel-grid downsampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownsampleConfig {
    /// Voxel edge length
    #[serde(default = "default_voxel_size")]
    pub voxel_size: f32,
}

fn default_voxel_size() -> f32 {
    0.2
}

impl Default for DownsampleConfig {
    fn default() -> Self {
        Self {
            voxel_size: default_voxel_size(),
        }
    }
}

/// Configuration for frame differencing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeConfig {
    /// A current point within this distance of any reference point is
    /// considered unchanged and removed
    #[serde(default = "default_change_threshold")]
    pub threshold: f32,
}

fn default_change_threshold() -> f32 {
    0.2
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            threshold: default_change_threshold(),
        }
    }
}

/// Configuration for statistical outlier removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenoiseConfig {
    /// Number of nearest neighbors used for the per-point mean distance
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,

    /// Points whose mean neighbor distance exceeds mean + std_ratio * stddev
    /// are discarded
    #[serde(default = "default_std_ratio")]
    pub std_ratio: f32,
}

fn default_neighbors() -> usize {
    5
}

fn default_std_ratio() -> f32 {
    1.0
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            neighbors: default_neighbors(),
            std_ratio: default_std_ratio(),
        }
    }
}

/// Configuration for DBSCAN clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Neighborhood radius
    #[serde(default = "default_eps")]
    pub eps: f32,

    /// Minimum neighbors to form a cluster core, counting the point itself
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_eps() -> f32 {
    0.3
}

fn default_min_samples() -> usize {
    7
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_samples: default_min_samples(),
        }
    }
}

/// Configuration for bounding box construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxConfig {
    /// Minimum box height; shorter clusters are discarded
    #[serde(default = "default_min_height")]
    pub min_height: f32,

    /// Base seed for per-frame box colors
    #[serde(default)]
    pub color_seed: u64,
}

fn default_min_height() -> f32 {
    0.08
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            min_height: default_min_height(),
            color_seed: 0,
        }
    }
}

/// Policy for picking a reference frame when `i + stride` runs past the end
/// of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapPolicy {
    /// Use the last frame of the sequence as the reference.
    Clamp,
    /// Skip pairs whose reference would fall outside the sequence.
    Skip,
}

impl Default for WrapPolicy {
    fn default() -> Self {
        WrapPolicy::Clamp
    }
}

/// Configuration for sequence iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Index offset between a frame and its reference frame
    #[serde(default = "default_stride")]
    pub stride: usize,

    /// What to do when the reference index runs past the sequence end
    #[serde(default)]
    pub wrap: WrapPolicy,
}

fn default_stride() -> usize {
    100
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            stride: default_stride(),
            wrap: WrapPolicy::default(),
        }
    }
}

/// One batch job: a folder of PCD frames and the folder that receives the
/// per-frame annotation JSONs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub downsample: DownsampleConfig,

    #[serde(default)]
    pub change: ChangeConfig,

    #[serde(default)]
    pub denoise: DenoiseConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub boxes: BoxConfig,

    #[serde(default)]
    pub sequence: SequenceConfig,

    /// Ordered list of (input, output) folder pairs for batch runs.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.downsample.voxel_size, 0.2);
        assert_eq!(config.change.threshold, 0.2);
        assert_eq!(config.denoise.neighbors, 5);
        assert_eq!(config.clustering.eps, 0.3);
        assert_eq!(config.clustering.min_samples, 7);
        assert_eq!(config.boxes.min_height, 0.08);
        assert_eq!(config.sequence.stride, 100);
        assert_eq!(config.sequence.wrap, WrapPolicy::Clamp);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "clustering:\n  eps: 0.5\nsequence:\n  wrap: skip\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.clustering.eps, 0.5);
        assert_eq!(config.clustering.min_samples, 7);
        assert_eq!(config.sequence.wrap, WrapPolicy::Skip);
        assert_eq!(config.sequence.stride, 100);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = PipelineConfig::default();
        config.jobs.push(JobConfig {
            input_dir: PathBuf::from("/data/01_walk/pcd"),
            output_dir: PathBuf::from("/data/01_walk/json"),
        });

        config.to_yaml(&path).unwrap();
        let loaded = PipelineConfig::from_yaml(&path).unwrap();

        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[0].input_dir, config.jobs[0].input_dir);
        assert_eq!(loaded.clustering.min_samples, 7);
    }
}
